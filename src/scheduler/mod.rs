//! Keeps one live recurring timer per registered job config.
//!
//! Each config moves `Unscheduled -> Scheduled -> Unscheduled`. A modify is
//! always a tear-down followed by a fresh install, so no timer ever outlives
//! the configuration it was built from.

pub mod timer;

use crate::errors::Result;
use crate::models::ScheduledJobConfig;
use crate::registry::RegistryEvent;
use log::{error, info, warn};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

pub use timer::{CronTimer, Timer, TimerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Unscheduled,
    Scheduled,
}

/// Live timer installed for one config.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSlot {
    pub schedule_id: u64,
    pub symbol: String,
    pub cron_expression: String,
    pub handle: TimerHandle,
}

pub struct Scheduler {
    timer: Arc<dyn Timer>,
    slots: Mutex<HashMap<String, ScheduleSlot>>,
}

impl Scheduler {
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        Self {
            timer,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Install the timer for `config`. Any timer already installed for the
    /// same config id is removed first.
    pub async fn activate(&self, config: &ScheduledJobConfig) -> Result<u64> {
        let mut slots = self.slots.lock().await;
        if let Some(existing) = slots.remove(&config.id) {
            self.unschedule(&mut slots, &config.id, existing).await?;
        }
        let schedule_id = schedule_id_for(&config.symbol);
        info!(
            "Activating import for {} (config {}, schedule {})",
            config.symbol, config.id, schedule_id
        );
        self.install(&mut slots, config, schedule_id).await
    }

    /// Tear down the current timer and install a new one under a new schedule id.
    pub async fn modify(&self, config: &ScheduledJobConfig) -> Result<u64> {
        let mut slots = self.slots.lock().await;
        let schedule_id = match slots.remove(&config.id) {
            Some(previous) => {
                let next = if previous.symbol == config.symbol {
                    previous.schedule_id.wrapping_add(1)
                } else {
                    schedule_id_for(&config.symbol).wrapping_add(1)
                };
                self.unschedule(&mut slots, &config.id, previous).await?;
                next
            }
            None => schedule_id_for(&config.symbol).wrapping_add(1),
        };
        info!(
            "Modifying import for {} (config {}, schedule {})",
            config.symbol, config.id, schedule_id
        );
        self.install(&mut slots, config, schedule_id).await
    }

    /// Remove the timer for `config` if one is installed. Returns whether a
    /// timer was removed.
    pub async fn deactivate(&self, config: &ScheduledJobConfig) -> Result<bool> {
        let mut slots = self.slots.lock().await;
        match slots.remove(&config.id) {
            Some(slot) => {
                self.unschedule(&mut slots, &config.id, slot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn state(&self, config_id: &str) -> ScheduleState {
        if self.slots.lock().await.contains_key(config_id) {
            ScheduleState::Scheduled
        } else {
            ScheduleState::Unscheduled
        }
    }

    pub async fn slot(&self, config_id: &str) -> Option<ScheduleSlot> {
        self.slots.lock().await.get(config_id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Symbols with a live timer, sorted.
    pub async fn scheduled_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .slots
            .lock()
            .await
            .values()
            .map(|s| s.symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// Follow registry mutations until the registry feed closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<RegistryEvent>) {
        while let Some(event) = events.recv().await {
            let (symbol, result) = match &event {
                RegistryEvent::Created(config) => {
                    (config.symbol.clone(), self.activate(config).await.map(|_| ()))
                }
                RegistryEvent::Updated { current, .. } => {
                    (current.symbol.clone(), self.modify(current).await.map(|_| ()))
                }
                RegistryEvent::Deleted(config) => {
                    (config.symbol.clone(), self.deactivate(config).await.map(|_| ()))
                }
            };
            if let Err(e) = result {
                error!("Scheduling change for {} failed: {}", symbol, e);
            }
        }
        info!("Registry feed closed, scheduler loop finished");
    }

    /// Cancel every installed timer.
    pub async fn shutdown(&self) {
        let mut slots = self.slots.lock().await;
        for (config_id, slot) in slots.drain() {
            if let Err(e) = self.timer.cancel(&slot.handle).await {
                warn!("Could not cancel timer for {} ({}): {}", slot.symbol, config_id, e);
            }
        }
    }

    async fn install(
        &self,
        slots: &mut HashMap<String, ScheduleSlot>,
        config: &ScheduledJobConfig,
        schedule_id: u64,
    ) -> Result<u64> {
        let handle = match self
            .timer
            .schedule(&config.cron_expression, config.tick_payload())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    "Could not schedule import for {} with '{}': {}",
                    config.symbol, config.cron_expression, e
                );
                return Err(e);
            }
        };

        info!(
            "Scheduled import for {} with '{}' (schedule {})",
            config.symbol, config.cron_expression, schedule_id
        );
        slots.insert(
            config.id.clone(),
            ScheduleSlot {
                schedule_id,
                symbol: config.symbol.clone(),
                cron_expression: config.cron_expression.clone(),
                handle,
            },
        );
        Ok(schedule_id)
    }

    // On failure the slot is put back: the timer may still be live.
    async fn unschedule(
        &self,
        slots: &mut HashMap<String, ScheduleSlot>,
        config_id: &str,
        slot: ScheduleSlot,
    ) -> Result<()> {
        info!(
            "Removing import for {} (config {}, schedule {})",
            slot.symbol, config_id, slot.schedule_id
        );
        if let Err(e) = self.timer.cancel(&slot.handle).await {
            error!("Could not unschedule import for {}: {}", slot.symbol, e);
            slots.insert(config_id.to_string(), slot);
            return Err(e);
        }
        Ok(())
    }
}

fn schedule_id_for(symbol: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    hasher.finish()
}
