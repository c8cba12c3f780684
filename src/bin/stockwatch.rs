use stockwatch::config::{Config, DEFAULT_CRON_EXPRESSION, DEFAULT_SOURCE_URL};
use stockwatch::models::{Symbol, TickPayload};
use stockwatch::scrapers::{HttpScraper, QuoteScraper};
use stockwatch::services::pipeline::{self, Pipeline};
use stockwatch::services::JobExecutor;
use stockwatch::store::{MemoryStore, RecordStore};
use stockwatch::util::arrow_utils;

use anyhow::{bail, Context};
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let app = App::new("stockwatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Imports stock quotes for every symbol under a watched store path")
        .subcommand(
            SubCommand::with_name("run")
                .about("Watch the store and import quotes on a cron schedule until Ctrl-C")
                .arg(
                    Arg::with_name("symbol")
                        .short('s')
                        .long("symbol")
                        .value_name("SYMBOL")
                        .help("Symbol to add on startup (repeatable)")
                        .takes_value(true)
                        .multiple_occurrences(true),
                )
                .arg(
                    Arg::with_name("cron")
                        .short('c')
                        .long("cron")
                        .value_name("CRON")
                        .help("Cron expression for new symbols")
                        .takes_value(true)
                        .default_value(DEFAULT_CRON_EXPRESSION),
                )
                .arg(url_arg())
                .arg(
                    Arg::with_name("workers")
                        .short('w')
                        .long("workers")
                        .value_name("WORKERS")
                        .help("Maximum number of concurrent fetches")
                        .takes_value(true)
                        .default_value("4"),
                )
                .arg(
                    Arg::with_name("snapshot")
                        .long("snapshot")
                        .value_name("FILE")
                        .help("Arrow file to restore trade records from and save them to")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("fetch")
                .about("Fetch one quote and print the mapped trade record")
                .arg(
                    Arg::with_name("symbol")
                        .short('s')
                        .long("symbol")
                        .value_name("SYMBOL")
                        .help("Symbol to fetch")
                        .required(true)
                        .takes_value(true),
                )
                .arg(url_arg()),
        )
        .subcommand(
            SubCommand::with_name("explore")
                .about("List trade records stored in a snapshot")
                .arg(
                    Arg::with_name("snapshot")
                        .long("snapshot")
                        .value_name("FILE")
                        .help("Arrow file written by `run --snapshot`")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("symbol")
                        .short('s')
                        .long("symbol")
                        .value_name("SYMBOL")
                        .help("Only show symbols containing this text")
                        .takes_value(true),
                ),
        );

    let matches = app.get_matches();

    match matches.subcommand() {
        Some(("run", sub)) => run(sub).await,
        Some(("fetch", sub)) => fetch(sub).await,
        Some(("explore", sub)) => explore(sub),
        _ => {
            info!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}

fn url_arg() -> Arg<'static> {
    Arg::with_name("url")
        .short('u')
        .long("url")
        .value_name("URL")
        .help("Source URL template; the symbol and .json are appended")
        .takes_value(true)
        .default_value(DEFAULT_SOURCE_URL)
}

async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let workers = matches
        .value_of("workers")
        .unwrap_or("4")
        .parse::<usize>()
        .context("--workers must be a positive number")?;

    let mut config = Config::new()
        .with_worker_count(workers)
        .with_default_cron_expression(matches.value_of("cron").unwrap_or(DEFAULT_CRON_EXPRESSION))
        .with_default_source_url(matches.value_of("url").unwrap_or(DEFAULT_SOURCE_URL));
    if let Some(snapshot) = matches.value_of("snapshot") {
        config = config.with_snapshot_path(snapshot);
    }
    pipeline::validate_watched_path(&config.watched_path)?;

    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    if let Some(path) = &config.snapshot_path {
        pipeline::load_snapshot(store.as_ref(), &config.watched_path, path)
            .with_context(|| format!("Failed to restore snapshot {}", path.display()))?;
    }

    let scraper: Arc<dyn QuoteScraper + Send + Sync> =
        Arc::new(HttpScraper::new(config.connect_timeout, config.read_timeout)?);
    let running = Pipeline::start(config, store.clone(), scraper).await?;

    let symbols: Vec<String> = matches
        .values_of("symbol")
        .map(|values| values.map(str::to_string).collect())
        .unwrap_or_default();
    running.add_symbols(&symbols)?;

    info!("Importing quotes; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    let watched_path = running.config().watched_path.clone();
    let snapshot_path = running.config().snapshot_path.clone();
    running.shutdown().await?;

    if let Some(path) = snapshot_path {
        let saved = pipeline::save_snapshot(store.as_ref(), &watched_path, &path)
            .with_context(|| format!("Failed to save snapshot {}", path.display()))?;
        info!("Saved {} trade records to {}", saved, path.display());
    }
    Ok(())
}

async fn fetch(matches: &ArgMatches) -> anyhow::Result<()> {
    let name = matches.value_of("symbol").unwrap_or_default();
    let symbol = Symbol::normalize(name)?;
    let config = Config::new().with_default_source_url(matches.value_of("url").unwrap_or(DEFAULT_SOURCE_URL));

    let scraper: Arc<dyn QuoteScraper + Send + Sync> =
        Arc::new(HttpScraper::new(config.connect_timeout, config.read_timeout)?);
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let executor = JobExecutor::new(scraper, store, &config.watched_path);

    let task = TickPayload {
        symbol: symbol.to_string(),
        source_url_template: config.default_source_url.clone(),
    }
    .fire();
    info!("Fetching {} from {}", task.symbol, task.resolved_url);

    let record = executor
        .try_execute(&task)
        .await
        .with_context(|| format!("Import for {} failed", task.symbol))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn explore(matches: &ArgMatches) -> anyhow::Result<()> {
    let path = Path::new(matches.value_of("snapshot").unwrap_or_default());
    if !path.exists() {
        bail!("Snapshot {} does not exist", path.display());
    }
    let filter = matches.value_of("symbol").map(str::to_uppercase);

    let rows = arrow_utils::read_trade_records(path)?;
    info!("Found {} trade records in {}", rows.len(), path.display());

    let filtered: Vec<_> = rows
        .iter()
        .filter(|(symbol, _)| filter.as_deref().map_or(true, |f| symbol.contains(f)))
        .collect();
    if filtered.is_empty() {
        warn!("No trade records match");
        return Ok(());
    }

    println!(
        "{:<8} {:<28} {:>10} {:>10} {:>10} {:>12} {:>8}  {}",
        "Symbol", "Company", "Last", "High", "Low", "Volume", "Change", "Updated"
    );
    println!("{:-<110}", "");
    for (symbol, record) in filtered {
        println!(
            "{:<8} {:<28} {:>10.2} {:>10.2} {:>10.2} {:>12} {:>8.2}  {} {}",
            symbol,
            record.company_name,
            record.last_trade,
            record.range_high,
            record.range_low,
            record.volume,
            record.up_down,
            record.day_of_last_update,
            record.time_of_update
        );
    }
    Ok(())
}
