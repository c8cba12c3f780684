use crate::errors::Result;
use crate::models::{FetchTask, TickPayload};
use crate::util;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Handle on one installed recurring timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(Uuid);

impl TimerHandle {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// Recurring cron timers. Each fire turns the payload into a [`FetchTask`]
/// (see [`TickPayload::fire`]) and enqueues it.
#[async_trait]
pub trait Timer: Send + Sync {
    async fn schedule(&self, cron_expression: &str, payload: TickPayload) -> Result<TimerHandle>;

    /// Prevent any future fire. Work already enqueued is not affected.
    async fn cancel(&self, handle: &TimerHandle) -> Result<()>;
}

/// [`Timer`] backed by `tokio-cron-scheduler`.
pub struct CronTimer {
    scheduler: JobScheduler,
    ticks: mpsc::UnboundedSender<FetchTask>,
}

impl CronTimer {
    /// Start the cron driver; every fire is sent to `ticks`.
    pub async fn start(ticks: mpsc::UnboundedSender<FetchTask>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        scheduler.start().await?;
        info!("Cron timer started");
        Ok(Self { scheduler, ticks })
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await?;
        info!("Cron timer stopped");
        Ok(())
    }
}

#[async_trait]
impl Timer for CronTimer {
    async fn schedule(&self, cron_expression: &str, payload: TickPayload) -> Result<TimerHandle> {
        let expression = util::normalize_cron(cron_expression);
        let ticks = self.ticks.clone();

        let job = Job::new_async(expression.as_str(), move |uuid, _scheduler| {
            let task = payload.fire();
            let ticks = ticks.clone();
            Box::pin(async move {
                debug!("Timer {} fired for {}", uuid, task.symbol);
                if let Err(e) = ticks.send(task) {
                    warn!("Dropping tick for {}: task queue closed", e.0.symbol);
                }
            })
        })?;

        let id = self.scheduler.add(job).await?;
        Ok(TimerHandle(id))
    }

    async fn cancel(&self, handle: &TimerHandle) -> Result<()> {
        self.scheduler.remove(&handle.0).await?;
        Ok(())
    }
}
