//! Configuration management

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONSUMER_GROUP, DEFAULT_EVENT_INDEX, DEFAULT_VECTOR_TOPIC, WEBHOOK_CHANNEL_TTL_SECS,
};
use crate::types::ClientType;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub google: GoogleConfig,
    pub broker: BrokerConfig,
    pub blob: BlobConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub zoom: ZoomConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
    pub worker: WorkerConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "calsync.db".to_string(), pool_size: 8 }
    }
}

/// OAuth client credentials for one client type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    /// Empty for mobile clients, which refresh without a secret.
    #[serde(default, skip_serializing)]
    pub client_secret: String,
}

/// Google Calendar provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub api_base: String,
    pub token_url: String,
    /// Public URL the provider posts push notifications to.
    pub webhook_address: String,
    pub channel_ttl_secs: i64,
    /// RFC 3339 lower bound applied to initial syncs only.
    pub initial_time_min: Option<String>,
    pub clients: HashMap<ClientType, OAuthClientConfig>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/calendar/v3".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            webhook_address: String::new(),
            channel_ttl_secs: WEBHOOK_CHANNEL_TTL_SECS,
            initial_time_min: None,
            clients: HashMap::new(),
        }
    }
}

/// Message broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub topic: String,
    pub group_id: String,
    pub partitions: u32,
    pub poll_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_VECTOR_TOPIC.to_string(),
            group_id: DEFAULT_CONSUMER_GROUP.to_string(),
            partitions: 1,
            poll_interval_ms: 1_000,
        }
    }
}

/// Blob staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub root_dir: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self { root_dir: "staged-batches".to_string() }
    }
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub endpoint: String,
    pub index_name: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index_name: DEFAULT_EVENT_INDEX.to_string(),
            username: None,
            password: None,
        }
    }
}

/// Zoom API configuration used for conference deprovisioning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub api_base: String,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self { api_base: "https://api.zoom.us/v2".to_string() }
    }
}

/// Sync pool and scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_concurrent_calendars: usize,
    /// Cron expression for periodic resyncs; `None` disables the scheduler.
    pub cron_expression: Option<String>,
    pub job_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { max_concurrent_calendars: 4, cron_expression: None, job_timeout_secs: 600 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Consumer worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub processing_timeout_secs: u64,
    pub join_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { processing_timeout_secs: 300, join_timeout_secs: 5 }
    }
}
