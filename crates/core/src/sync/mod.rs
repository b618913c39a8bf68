//! Calendar synchronization: orchestration, pagination, and fan-out

pub mod classify;
pub mod fanout;
pub mod fetch_loop;
pub mod handler;
pub mod mapping;
pub mod orchestrator;
pub mod ports;

pub use classify::{classify_page, ClassifiedPage};
pub use fanout::{FanoutCoordinator, FanoutFailure, FanoutReport};
pub use fetch_loop::{ChangeFetchLoop, FetchOutcome};
pub use handler::{perform_calendar_sync, SyncRequest, SyncResponse};
pub use orchestrator::{OrchestratorSettings, SyncOrchestrator, SyncOutcome, SyncReport};
pub use ports::*;
