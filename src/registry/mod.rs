//! Keyed store of [`ScheduledJobConfig`] records.
//!
//! The registry is the authoritative answer to "what should be scheduled".
//! Every mutation is published as a [`RegistryEvent`] so the scheduler can
//! follow along without polling.

use crate::errors::{Result, StockWatchError};
use crate::models::ScheduledJobConfig;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

const ID_PREFIX: &str = "stockimport";

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Created(ScheduledJobConfig),
    Updated {
        previous: ScheduledJobConfig,
        current: ScheduledJobConfig,
    },
    Deleted(ScheduledJobConfig),
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobConfigUpdate {
    pub symbol: Option<String>,
    pub cron_expression: Option<String>,
    pub source_url_template: Option<String>,
}

pub struct JobRegistry {
    configs: Mutex<BTreeMap<String, ScheduledJobConfig>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<RegistryEvent>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            configs: Mutex::new(BTreeMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Receive every subsequent registry mutation, in order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RegistryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }

    pub fn create(
        &self,
        symbol: &str,
        cron_expression: &str,
        source_url_template: &str,
    ) -> Result<ScheduledJobConfig> {
        let config = ScheduledJobConfig {
            id: format!("{}.{}", ID_PREFIX, Uuid::new_v4()),
            symbol: symbol.to_string(),
            cron_expression: cron_expression.to_string(),
            source_url_template: source_url_template.to_string(),
        };
        Self::validate(&config)?;

        let mut configs = self.lock()?;
        if let Some(existing) = configs.values().find(|c| c.symbol == config.symbol) {
            return Err(StockWatchError::ConfigError(format!(
                "Symbol {} already has config {}",
                config.symbol, existing.id
            )));
        }
        configs.insert(config.id.clone(), config.clone());

        info!("Created job config {} for {}", config.id, config.symbol);
        self.publish(RegistryEvent::Created(config.clone()));
        Ok(config)
    }

    pub fn update(&self, id: &str, update: JobConfigUpdate) -> Result<ScheduledJobConfig> {
        let mut configs = self.lock()?;
        let previous = configs
            .get(id)
            .cloned()
            .ok_or_else(|| StockWatchError::ConfigError(format!("No job config {}", id)))?;

        let mut current = previous.clone();
        if let Some(symbol) = update.symbol {
            current.symbol = symbol;
        }
        if let Some(cron) = update.cron_expression {
            current.cron_expression = cron;
        }
        if let Some(url) = update.source_url_template {
            current.source_url_template = url;
        }
        Self::validate(&current)?;

        if current.symbol != previous.symbol
            && configs.values().any(|c| c.id != id && c.symbol == current.symbol)
        {
            return Err(StockWatchError::ConfigError(format!(
                "Symbol {} already has a job config",
                current.symbol
            )));
        }

        if current == previous {
            debug!("Job config {} unchanged", id);
            return Ok(current);
        }
        configs.insert(id.to_string(), current.clone());

        info!(
            "Updated job config {} for {} ({})",
            current.id, current.symbol, current.cron_expression
        );
        self.publish(RegistryEvent::Updated {
            previous,
            current: current.clone(),
        });
        Ok(current)
    }

    pub fn delete(&self, id: &str) -> Result<ScheduledJobConfig> {
        let mut configs = self.lock()?;
        let removed = configs
            .remove(id)
            .ok_or_else(|| StockWatchError::ConfigError(format!("No job config {}", id)))?;

        info!("Deleted job config {} for {}", removed.id, removed.symbol);
        self.publish(RegistryEvent::Deleted(removed.clone()));
        Ok(removed)
    }

    /// Delete the config for `symbol`, if there is one.
    pub fn delete_by_symbol(&self, symbol: &str) -> Result<Option<ScheduledJobConfig>> {
        let mut configs = self.lock()?;
        let id = match configs.values().find(|c| c.symbol == symbol) {
            Some(config) => config.id.clone(),
            None => return Ok(None),
        };
        let removed = configs.remove(&id);
        if let Some(config) = &removed {
            info!("Deleted job config {} for {}", config.id, config.symbol);
            self.publish(RegistryEvent::Deleted(config.clone()));
        }
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<ScheduledJobConfig> {
        self.configs.lock().ok()?.get(id).cloned()
    }

    pub fn find_by_symbol(&self, symbol: &str) -> Option<ScheduledJobConfig> {
        self.configs
            .lock()
            .ok()?
            .values()
            .find(|c| c.symbol == symbol)
            .cloned()
    }

    pub fn list(&self) -> Vec<ScheduledJobConfig> {
        self.configs
            .lock()
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.configs.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(config: &ScheduledJobConfig) -> Result<()> {
        let blank = [
            ("symbol", &config.symbol),
            ("cronExpression", &config.cron_expression),
            ("stock_url", &config.source_url_template),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());

        match blank {
            Some((name, _)) => Err(StockWatchError::ConfigError(format!(
                "Job config field '{}' must not be empty",
                name
            ))),
            None => Ok(()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, ScheduledJobConfig>>> {
        self.configs
            .lock()
            .map_err(|_| StockWatchError::ConfigError("Registry lock poisoned".to_string()))
    }

    // Callers hold the config lock so listeners see mutations in order
    fn publish(&self, event: RegistryEvent) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
