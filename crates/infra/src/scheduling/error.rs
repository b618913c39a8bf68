//! Scheduler error types

use calsync_domain::CalSyncError;
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// The cron expression could not be parsed
    #[error("Invalid cron expression {expression:?}: {source}")]
    InvalidSchedule {
        expression: String,
        #[source]
        source: JobSchedulerError,
    },

    /// Failed to create, start, or stop the underlying scheduler
    #[error("Scheduler {operation} failed: {source}")]
    Lifecycle {
        operation: &'static str,
        #[source]
        source: JobSchedulerError,
    },

    /// Failed to register job
    #[error("Failed to register job: {0}")]
    JobRegistrationFailed(#[source] JobSchedulerError),

    /// Operation timed out
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    /// Task join failed
    #[error("Task join failed: {0}")]
    TaskJoinFailed(#[from] tokio::task::JoinError),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let calsync_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                CalSyncError::InvalidInput(err.to_string())
            }
            SchedulerError::InvalidSchedule { .. } => CalSyncError::Config(err.to_string()),
            _ => CalSyncError::Internal(err.to_string()),
        };
        InfraError(calsync_err)
    }
}

impl From<SchedulerError> for CalSyncError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
