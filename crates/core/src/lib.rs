//! # calsync Core
//!
//! Sync and propagation logic with no infrastructure dependencies.
//!
//! This crate contains:
//! - The sync orchestrator, change-fetch loop, and fan-out coordinator
//! - The vector-index enqueue protocol and consumer
//! - Port interfaces (traits) for every external collaborator
//!
//! ## Architecture Principles
//! - Only depends on `calsync-domain`
//! - No database, HTTP, or broker code
//! - All external dependencies via traits

pub mod calendar_ports;
pub mod index;
pub mod sync;

pub use calendar_ports::{AccessTokenSource, ConferenceDeprovisioner, ProviderGateway};
pub use index::{
    BlobStore, BrokerTransaction, ConsumeReport, Delivery, EmbeddingService, EnqueueSettings,
    MessageBroker, MessageConsumer, PartitionOffset, VectorChangePublisher, VectorIndex,
    VectorIndexConsumer, VectorIndexEnqueuer,
};
pub use sync::{
    perform_calendar_sync, ChangeFetchLoop, FanoutCoordinator, FanoutReport, FetchOutcome,
    OrchestratorSettings, RecordStore, SyncOrchestrator, SyncOutcome, SyncReport, SyncRequest,
    SyncResponse,
};
