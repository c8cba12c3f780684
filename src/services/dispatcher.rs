use crate::models::FetchTask;
use crate::services::executor::{JobExecutor, Outcome};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

/// Bounded worker pool for fetch tasks.
///
/// Different symbols run in parallel up to the pool size. A tick for a
/// symbol whose previous task is still waiting or running is skipped.
pub struct TaskDispatcher {
    executor: Arc<JobExecutor>,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Clears the in-flight mark for a symbol when dropped, even if the task panics.
struct InFlightGuard {
    symbol: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.symbol);
        }
    }
}

impl TaskDispatcher {
    pub fn new(executor: Arc<JobExecutor>, workers: usize) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Hand `task` to the pool. Returns `None` when the tick was skipped.
    pub fn submit(&self, task: FetchTask) -> Option<JoinHandle<Outcome>> {
        let guard = {
            let mut set = match self.in_flight.lock() {
                Ok(set) => set,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !set.insert(task.symbol.clone()) {
                warn!(
                    "Skipping tick for {}: previous import still pending",
                    task.symbol
                );
                return None;
            }
            InFlightGuard {
                symbol: task.symbol.clone(),
                in_flight: self.in_flight.clone(),
            }
        };

        let executor = self.executor.clone();
        let permits = self.permits.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Worker pool closed, dropping task for {}", task.symbol);
                    return Outcome::Failed;
                }
            };
            debug!("Executing import for {}", task.symbol);
            executor.execute(&task).await
        }))
    }

    pub fn is_in_flight(&self, symbol: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(symbol))
            .unwrap_or(false)
    }

    /// Drain the tick queue until every sender is gone.
    pub async fn run(self: Arc<Self>, mut tasks: mpsc::UnboundedReceiver<FetchTask>) {
        while let Some(task) = tasks.recv().await {
            self.submit(task);
        }
        info!("Task queue closed, dispatcher finished");
    }

    /// Stop accepting work; running tasks finish on their own.
    pub fn close(&self) {
        self.permits.close();
    }
}
