use crate::config::Config;
use crate::errors::{Result, StockWatchError};
use crate::models::{TradeRecord, TRADE_NODE};
use crate::registry::JobRegistry;
use crate::scheduler::{CronTimer, Scheduler};
use crate::scrapers::QuoteScraper;
use crate::services::dispatcher::TaskDispatcher;
use crate::services::executor::JobExecutor;
use crate::services::observer::ChangeObserver;
use crate::store::{child_path, RecordStore, Transaction};
use crate::util::arrow_utils;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Wires the observer, registry, scheduler, timer and worker pool together.
pub struct Pipeline {
    config: Config,
    store: Arc<dyn RecordStore>,
    registry: Arc<JobRegistry>,
    scheduler: Arc<Scheduler>,
    timer: Arc<CronTimer>,
    dispatcher: Arc<TaskDispatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub async fn start(
        config: Config,
        store: Arc<dyn RecordStore>,
        scraper: Arc<dyn QuoteScraper + Send + Sync>,
    ) -> Result<Self> {
        info!("Starting stock import pipeline on {}", config.watched_path);

        let registry = Arc::new(JobRegistry::new());
        let registry_events = registry.subscribe();

        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let timer = Arc::new(CronTimer::start(tick_tx).await?);
        let scheduler = Arc::new(Scheduler::new(timer.clone()));

        let executor = Arc::new(JobExecutor::new(scraper, store.clone(), &config.watched_path));
        let dispatcher = Arc::new(TaskDispatcher::new(executor, config.worker_count));

        let observer = Arc::new(ChangeObserver::new(
            store.clone(),
            registry.clone(),
            config.job_defaults(),
        ));
        // Subscribe before replaying so nothing added in between is missed
        let subscription = store.subscribe(&config.watched_path);

        let tasks = vec![
            tokio::spawn(scheduler.clone().run(registry_events)),
            tokio::spawn(dispatcher.clone().run(tick_rx)),
            tokio::spawn(observer.clone().watch(subscription)),
        ];

        observer.replay_existing(&config.watched_path);

        Ok(Self {
            config,
            store,
            registry,
            scheduler,
            timer,
            dispatcher,
            tasks,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Create the node for each symbol; the observer takes it from there.
    pub fn add_symbols(&self, symbols: &[String]) -> Result<()> {
        let mut tx = Transaction::new();
        for symbol in symbols {
            tx.create_if_absent(child_path(&self.config.watched_path, symbol));
        }
        if tx.is_empty() {
            return Ok(());
        }
        self.store.commit(tx)
    }

    pub fn remove_symbol(&self, symbol: &str) -> Result<()> {
        let mut tx = Transaction::new();
        tx.delete(child_path(&self.config.watched_path, symbol));
        self.store.commit(tx)
    }

    /// Stop timers and background loops. In-flight fetches run to completion.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down stock import pipeline");
        self.scheduler.shutdown().await;
        self.dispatcher.close();
        for task in &self.tasks {
            task.abort();
        }
        self.timer.shutdown().await
    }
}

/// Every stored trade record under `root`, by symbol.
pub fn collect_trade_records(store: &dyn RecordStore, root: &str) -> Vec<(String, TradeRecord)> {
    store
        .children(root)
        .into_iter()
        .filter_map(|symbol| {
            let trade_path = child_path(&child_path(root, &symbol), TRADE_NODE);
            let record = store
                .properties(&trade_path)
                .and_then(|props| TradeRecord::from_properties(&props))?;
            Some((symbol, record))
        })
        .collect()
}

/// Write snapshot rows back into the store in a single commit.
pub fn restore_trade_records(
    store: &dyn RecordStore,
    root: &str,
    rows: &[(String, TradeRecord)],
) -> Result<usize> {
    let mut tx = Transaction::new();
    for (symbol, record) in rows {
        let trade_path = child_path(&child_path(root, symbol), TRADE_NODE);
        tx.create_if_absent(trade_path.clone())
            .set_properties(trade_path, record.to_properties());
    }
    if tx.is_empty() {
        return Ok(0);
    }
    store.commit(tx)?;
    Ok(rows.len())
}

pub fn load_snapshot(store: &dyn RecordStore, root: &str, path: &Path) -> Result<usize> {
    if !path.exists() {
        info!("No snapshot at {}, starting empty", path.display());
        return Ok(0);
    }
    let rows = arrow_utils::read_trade_records(path)?;
    let restored = restore_trade_records(store, root, &rows)?;
    info!("Restored {} trade records from {}", restored, path.display());
    Ok(restored)
}

pub fn save_snapshot(store: &dyn RecordStore, root: &str, path: &Path) -> Result<usize> {
    let rows = collect_trade_records(store, root);
    if rows.is_empty() {
        warn!("No trade records under {} to save", root);
    }
    arrow_utils::save_trade_records(&rows, path)?;
    Ok(rows.len())
}

/// Fail fast on a watched path the store would reject.
pub fn validate_watched_path(path: &str) -> Result<()> {
    if !path.starts_with('/') || path.len() < 2 {
        return Err(StockWatchError::ValidationError(format!(
            "Watched path '{}' must be an absolute, non-root path",
            path
        )));
    }
    Ok(())
}
