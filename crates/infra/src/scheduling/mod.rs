//! Calendar sync scheduling
//!
//! - [`CalendarSyncPool`] runs a batch of sync jobs with bounded concurrency,
//!   never running two jobs for the same calendar at once.
//! - [`SyncScheduler`] triggers the pool on a cron schedule for every
//!   calendar whose integration is enabled.
//!
//! Both follow the same runtime rules: explicit start/stop, tracked join
//! handles, cancellation tokens, and timeouts around every job.

pub mod error;
pub mod sync_pool;
pub mod sync_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sync_pool::{CalendarSyncPool, PoolReport, SyncRunner};
pub use sync_scheduler::{SyncScheduler, SyncSchedulerConfig};
