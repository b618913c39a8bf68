//! # calsync Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite record store and transactional topic broker
//! - Filesystem blob store for staged batches
//! - HTTP adapters (Google Calendar, OpenAI embeddings, OpenSearch, Zoom)
//! - Configuration loading and tracing initialisation
//! - The vector-index consumer worker, calendar sync pool, and cron scheduler
//!
//! ## Architecture
//! - Implements traits defined in `calsync-core`
//! - Contains all "impure" code (I/O, network, filesystem)

pub mod broker;
pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod observability;
pub mod scheduling;
pub mod search;
pub mod storage;
pub mod workers;

// Re-export commonly used items
pub use broker::{SqliteBroker, SqliteTopicConsumer};
pub use database::{sqlite_record_store, DbManager};
pub use errors::InfraError;
pub use http::HttpClient;
pub use integrations::google::{GoogleCalendarGateway, GoogleTokenSource};
pub use integrations::openai::OpenAIEmbeddings;
pub use integrations::zoom::ZoomDeprovisioner;
pub use observability::init_tracing;
pub use scheduling::{CalendarSyncPool, SyncScheduler};
pub use search::OpenSearchIndex;
pub use storage::FileBlobStore;
pub use workers::{VectorIndexWorker, VectorIndexWorkerConfig};
