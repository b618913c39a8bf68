//! Cron-triggered resync of every enabled calendar.
//!
//! Each tick lists the calendars whose integration still has sync enabled and
//! hands them to a [`CalendarSyncPool`]. Ticks never overlap: a tick that
//! fires while the previous batch is still running is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use calsync_core::sync::ports::IntegrationRepository;
use calsync_domain::SyncConfig;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};
use super::sync_pool::CalendarSyncPool;

#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    /// Upper bound for one whole batch.
    pub job_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 */15 * * * *".into(),
            job_timeout: Duration::from_secs(900),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl SyncSchedulerConfig {
    /// `None` when the configuration has no cron expression.
    pub fn from_config(config: &SyncConfig) -> Option<Self> {
        let cron_expression =
            config.cron_expression.as_deref().map(str::trim).filter(|expr| !expr.is_empty())?;
        let defaults = Self::default();
        Some(Self {
            cron_expression: cron_expression.to_string(),
            job_timeout: if config.job_timeout_secs > 0 {
                Duration::from_secs(config.job_timeout_secs)
            } else {
                defaults.job_timeout
            },
            ..defaults
        })
    }
}

pub struct SyncScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    config: SyncSchedulerConfig,
    job_id: Uuid,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    integrations: Arc<dyn IntegrationRepository>,
    pool: Arc<CalendarSyncPool>,
}

impl SyncScheduler {
    pub async fn new(
        config: SyncSchedulerConfig,
        integrations: Arc<dyn IntegrationRepository>,
        pool: Arc<CalendarSyncPool>,
    ) -> SchedulerResult<Self> {
        let raw_scheduler = JobScheduler::new()
            .await
            .map_err(|source| SchedulerError::Lifecycle { operation: "create", source })?;

        let mut scheduler = Self {
            scheduler: Arc::new(RwLock::new(raw_scheduler)),
            config,
            job_id: Uuid::nil(),
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            integrations,
            pool,
        };
        scheduler.job_id = scheduler.register_sync_job().await?;
        Ok(scheduler)
    }

    #[instrument(skip(self), fields(cron = %self.config.cron_expression))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.cancellation = CancellationToken::new();

        let scheduler = Arc::clone(&self.scheduler);
        let start_timeout = self.config.start_timeout;
        tokio::time::timeout(start_timeout, async move { scheduler.write().await.start().await })
            .await
            .map_err(|_| SchedulerError::Timeout {
                operation: "start",
                seconds: start_timeout.as_secs(),
            })?
            .map_err(|source| SchedulerError::Lifecycle { operation: "start", source })?;

        let cancel = self.cancellation.clone();
        self.monitor_handle = Some(tokio::spawn(async move {
            cancel.cancelled().await;
            debug!("sync scheduler monitor cancelled");
        }));
        info!("sync scheduler started");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }
        self.cancellation.cancel();

        let scheduler = Arc::clone(&self.scheduler);
        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.write().await.shutdown().await })
            .await
            .map_err(|_| SchedulerError::Timeout {
                operation: "stop",
                seconds: stop_timeout.as_secs(),
            })?
            .map_err(|source| SchedulerError::Lifecycle { operation: "stop", source })?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle).await.map_err(|_| {
                SchedulerError::Timeout { operation: "join", seconds: join_timeout.as_secs() }
            })??;
        }

        info!("sync scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.monitor_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn register_sync_job(&mut self) -> SchedulerResult<Uuid> {
        if self.job_id != Uuid::nil() {
            return Ok(self.job_id);
        }

        let cron_expr = self.config.cron_expression.clone();
        let job_timeout = self.config.job_timeout;
        let integrations = Arc::clone(&self.integrations);
        let pool = Arc::clone(&self.pool);
        let in_flight = Arc::new(AtomicBool::new(false));

        let job = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let integrations = Arc::clone(&integrations);
            let pool = Arc::clone(&pool);
            let in_flight = Arc::clone(&in_flight);

            Box::pin(async move {
                if in_flight.swap(true, Ordering::SeqCst) {
                    warn!("previous sync batch still running; tick skipped");
                    return;
                }
                let started = Instant::now();
                let batch = async {
                    let jobs = integrations.list_sync_jobs().await?;
                    Ok::<_, calsync_domain::CalSyncError>(pool.run_all(jobs).await)
                };
                match tokio::time::timeout(job_timeout, batch).await {
                    Ok(Ok(report)) => info!(
                        calendars = report.total(),
                        failed = report.failed,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "scheduled sync finished"
                    ),
                    Ok(Err(err)) => error!(error = %err, "listing sync jobs failed"),
                    Err(_) => {
                        warn!(timeout_secs = job_timeout.as_secs(), "scheduled sync timed out")
                    }
                }
                in_flight.store(false, Ordering::SeqCst);
            })
        })
        .map_err(|source| SchedulerError::InvalidSchedule {
            expression: self.config.cron_expression.clone(),
            source,
        })?;

        let job_id = job.guid();
        self.scheduler
            .write()
            .await
            .add(job)
            .await
            .map_err(SchedulerError::JobRegistrationFailed)?;

        debug!(cron = %self.config.cron_expression, %job_id, "registered calendar sync job");
        Ok(job_id)
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
