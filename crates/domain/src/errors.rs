//! Error types used throughout the pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for calsync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalSyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The provider rejected the stored sync token; a full resync is required.
    #[error("Sync cursor invalidated: {0}")]
    CursorInvalidated(String),

    /// The integration can no longer be synced (revoked consent, disabled
    /// calendar).
    #[error("Sync disabled: {0}")]
    SyncDisabled(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Blob store error: {0}")]
    Blob(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification that decides how a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Provider, store, broker, or index unreachable. Surfaced, never retried
    /// inside the pipeline.
    TransientNetwork,
    /// Triggers the single automatic full resync.
    CursorInvalidated,
    /// Surfaced as a successful "disabled" outcome.
    PolicyDisabled,
    /// Missing required fields; filtered at the item level.
    MalformedResource,
    /// Everything else.
    Fatal,
}

impl CalSyncError {
    /// Map the error onto the propagation taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_)
            | Self::Database(_)
            | Self::Broker(_)
            | Self::Blob(_)
            | Self::Embedding(_)
            | Self::Index(_) => ErrorKind::TransientNetwork,
            Self::CursorInvalidated(_) => ErrorKind::CursorInvalidated,
            Self::SyncDisabled(_) => ErrorKind::PolicyDisabled,
            Self::InvalidInput(_) | Self::Serialization(_) => ErrorKind::MalformedResource,
            Self::Config(_)
            | Self::Auth(_)
            | Self::NotFound(_)
            | Self::Provider(_)
            | Self::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// Stable label for structured log fields.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::Auth(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Serialization(_) => "serialization",
            Self::CursorInvalidated(_) => "cursor_invalidated",
            Self::SyncDisabled(_) => "sync_disabled",
            Self::Provider(_) => "provider",
            Self::Broker(_) => "broker",
            Self::Blob(_) => "blob",
            Self::Embedding(_) => "embedding",
            Self::Index(_) => "index",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns true when the failure is worth retrying by an outer caller.
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientNetwork)
    }
}

impl From<serde_json::Error> for CalSyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for calsync operations
pub type Result<T> = std::result::Result<T, CalSyncError>;
