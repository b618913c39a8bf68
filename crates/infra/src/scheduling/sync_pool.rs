//! Bounded-concurrency runner for calendar sync jobs.
//!
//! Jobs for different calendars run in parallel up to the configured limit.
//! Jobs for the same calendar wait on a calendar-scoped lock, so at most one
//! run reads and rotates a calendar's cursor and webhook channel at a time.
//! A run past the job timeout is counted as timed out and left to finish in
//! the background; it is never cancelled mid-write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calsync_core::{SyncOrchestrator, SyncOutcome};
use calsync_domain::{Result, SyncJob};
use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, instrument, warn};

/// Anything that can run one calendar sync.
#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run_sync(&self, job: &SyncJob) -> Result<SyncOutcome>;
}

#[async_trait]
impl SyncRunner for SyncOrchestrator {
    async fn run_sync(&self, job: &SyncJob) -> Result<SyncOutcome> {
        SyncOrchestrator::run_sync(self, job).await
    }
}

/// Tally of one `run_all` batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub completed: usize,
    pub disabled: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl PoolReport {
    pub fn total(&self) -> usize {
        self.completed + self.disabled + self.failed + self.timed_out
    }
}

enum JobResult {
    Completed,
    Disabled,
    Failed,
    TimedOut,
}

pub struct CalendarSyncPool {
    runner: Arc<dyn SyncRunner>,
    permits: Arc<Semaphore>,
    calendar_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    job_timeout: Duration,
}

impl CalendarSyncPool {
    pub fn new(runner: Arc<dyn SyncRunner>, max_concurrent: usize, job_timeout: Duration) -> Self {
        Self {
            runner,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            calendar_locks: Mutex::new(HashMap::new()),
            job_timeout,
        }
    }

    /// Run every job and wait for all of them. Individual failures are logged
    /// and counted, never propagated.
    #[instrument(skip(self, jobs), fields(jobs = jobs.len()))]
    pub async fn run_all(&self, jobs: Vec<SyncJob>) -> PoolReport {
        let results = join_all(jobs.iter().map(|job| self.run_one(job))).await;

        let mut report = PoolReport::default();
        for result in results {
            match result {
                JobResult::Completed => report.completed += 1,
                JobResult::Disabled => report.disabled += 1,
                JobResult::Failed => report.failed += 1,
                JobResult::TimedOut => report.timed_out += 1,
            }
        }
        self.prune_locks().await;
        info!(
            completed = report.completed,
            disabled = report.disabled,
            failed = report.failed,
            timed_out = report.timed_out,
            "sync batch finished"
        );
        report
    }

    async fn run_one(&self, job: &SyncJob) -> JobResult {
        let calendar_guard = self.calendar_lock(&job.calendar_id).await.lock_owned().await;
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            error!(calendar_id = %job.calendar_id, "sync pool closed");
            return JobResult::Failed;
        };

        // The run owns its calendar guard and permit, so a run that outlives
        // the timeout still excludes its calendar until it finishes.
        let runner = Arc::clone(&self.runner);
        let task_job = job.clone();
        let handle = tokio::spawn(async move {
            let _calendar_guard = calendar_guard;
            let _permit = permit;
            runner.run_sync(&task_job).await
        });

        match tokio::time::timeout(self.job_timeout, handle).await {
            Ok(Ok(Ok(SyncOutcome::Completed(_)))) => JobResult::Completed,
            Ok(Ok(Ok(SyncOutcome::Disabled { reason }))) => {
                info!(calendar_id = %job.calendar_id, reason = %reason, "calendar sync disabled");
                JobResult::Disabled
            }
            Ok(Ok(Err(err))) => {
                error!(
                    calendar_id = %job.calendar_id,
                    user_id = %job.user_id,
                    error = %err,
                    kind = err.label(),
                    "calendar sync failed"
                );
                JobResult::Failed
            }
            Ok(Err(join_err)) => {
                error!(
                    calendar_id = %job.calendar_id,
                    error = %join_err,
                    "calendar sync task aborted"
                );
                JobResult::Failed
            }
            Err(_) => {
                warn!(
                    calendar_id = %job.calendar_id,
                    timeout_secs = self.job_timeout.as_secs(),
                    "calendar sync timed out, run continues in the background"
                );
                JobResult::TimedOut
            }
        }
    }

    async fn calendar_lock(&self, calendar_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.calendar_locks.lock().await;
        Arc::clone(locks.entry(calendar_id.to_string()).or_default())
    }

    /// Drop locks nobody is holding or waiting on.
    async fn prune_locks(&self) {
        let mut locks = self.calendar_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
