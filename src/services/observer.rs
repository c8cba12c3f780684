use crate::config::JobDefaults;
use crate::errors::{Result, StockWatchError};
use crate::models::{Symbol, SymbolCandidate};
use crate::registry::JobRegistry;
use crate::store::{child_path, parent_path, ChangeEvent, ChangeType, RecordStore, Subscription, Transaction};
use log::{debug, error, info};
use std::sync::Arc;

/// What the observer did with one change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverAction {
    Ignored,
    /// Node re-created under its upper-case name.
    Renamed { from: String, to: String },
    /// Job config created, carries the config id.
    Scheduled(String),
    /// Job config deleted, carries the config id.
    Unscheduled(String),
    /// Removal of a symbol that had no config.
    NoConfig,
}

/// Turns additions and removals under the watched path into job configs.
pub struct ChangeObserver {
    store: Arc<dyn RecordStore>,
    registry: Arc<JobRegistry>,
    defaults: JobDefaults,
}

impl ChangeObserver {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<JobRegistry>, defaults: JobDefaults) -> Self {
        Self {
            store,
            registry,
            defaults,
        }
    }

    /// Process a batch in delivery order. A failing event is logged and
    /// does not stop the rest of the batch.
    pub fn on_change(&self, events: &[ChangeEvent]) -> Vec<ObserverAction> {
        events
            .iter()
            .map(|event| {
                debug!("Resource change detected: {:?}", event);
                match self.handle(event) {
                    Ok(action) => action,
                    Err(e) => {
                        error!("Change {:?} for '{}' failed: {}", event.change_type, event.name(), e);
                        ObserverAction::Ignored
                    }
                }
            })
            .collect()
    }

    pub fn handle(&self, event: &ChangeEvent) -> Result<ObserverAction> {
        let name = event.name();
        let symbol = match Symbol::classify(name) {
            SymbolCandidate::Rejected(reason) => {
                debug!("Ignoring '{}': {}", event.path, reason);
                return Ok(ObserverAction::Ignored);
            }
            SymbolCandidate::NeedsNormalization(symbol) if event.change_type == ChangeType::Added => {
                return self.rename_to_canonical(&event.path, &symbol);
            }
            SymbolCandidate::Canonical(symbol) | SymbolCandidate::NeedsNormalization(symbol) => symbol,
        };

        match event.change_type {
            ChangeType::Added => {
                let config = self.registry.create(
                    symbol.as_str(),
                    &self.defaults.cron_expression,
                    &self.defaults.source_url_template,
                )?;
                info!("Added {} config with id {}", symbol, config.id);
                Ok(ObserverAction::Scheduled(config.id))
            }
            // Removal matches configs by the literal node name
            ChangeType::Removed => match self.registry.delete_by_symbol(name)? {
                Some(config) => {
                    info!("Removed {} config with id {}", name, config.id);
                    Ok(ObserverAction::Unscheduled(config.id))
                }
                None => {
                    debug!("No config to remove for '{}'", name);
                    Ok(ObserverAction::NoConfig)
                }
            },
        }
    }

    /// Replace a lower or mixed case node with its upper-case twin. The
    /// resulting ADDED event schedules the symbol.
    fn rename_to_canonical(&self, path: &str, symbol: &Symbol) -> Result<ObserverAction> {
        let parent = parent_path(path)
            .ok_or_else(|| StockWatchError::ValidationError(format!("'{}' has no parent", path)))?;
        let canonical = child_path(parent, symbol.as_str());
        info!("Folder added is not uppercase. Recreating {} as {}", path, canonical);

        let mut tx = Transaction::new();
        if self.store.exists(path) {
            tx.delete(path);
        }
        tx.create_if_absent(canonical.clone());
        self.store.commit(tx)?;

        Ok(ObserverAction::Renamed {
            from: path.to_string(),
            to: canonical,
        })
    }

    /// Treat every current child of `root` as freshly added. Used at startup
    /// so symbols already in the store get a schedule.
    pub fn replay_existing(&self, root: &str) -> Vec<ObserverAction> {
        let events: Vec<ChangeEvent> = self
            .store
            .children(root)
            .into_iter()
            .map(|name| ChangeEvent::added(child_path(root, &name)))
            .collect();
        if !events.is_empty() {
            info!("Replaying {} existing entries under {}", events.len(), root);
        }
        self.on_change(&events)
    }

    /// Handle batches until the subscription ends.
    pub async fn watch(self: Arc<Self>, mut subscription: Subscription) {
        info!("Watching {} for symbol changes", subscription.prefix());
        while let Some(batch) = subscription.recv().await {
            self.on_change(&batch);
        }
        info!("Change feed for {} closed", subscription.prefix());
    }
}
