//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `CALSYNC_DB_PATH` is missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Only `CALSYNC_DB_PATH` is required; every other variable overrides the
//! section default when set.
//! - `CALSYNC_DB_PATH`, `CALSYNC_DB_POOL_SIZE`
//! - `CALSYNC_GOOGLE_API_BASE`, `CALSYNC_GOOGLE_TOKEN_URL`,
//!   `CALSYNC_GOOGLE_WEBHOOK_ADDRESS`, `CALSYNC_GOOGLE_CHANNEL_TTL_SECS`
//! - `CALSYNC_GOOGLE_<CLIENT>_CLIENT_ID` / `_CLIENT_SECRET` with `<CLIENT>` one
//!   of `IOS`, `ANDROID`, `WEB`, `ATOMIC_WEB`
//! - `CALSYNC_BROKER_TOPIC`, `CALSYNC_BROKER_GROUP_ID`,
//!   `CALSYNC_BROKER_PARTITIONS`, `CALSYNC_BROKER_POLL_INTERVAL_MS`
//! - `CALSYNC_BLOB_ROOT_DIR`
//! - `CALSYNC_EMBEDDING_API_URL`, `CALSYNC_EMBEDDING_API_KEY`,
//!   `CALSYNC_EMBEDDING_MODEL`
//! - `CALSYNC_INDEX_ENDPOINT`, `CALSYNC_INDEX_NAME`, `CALSYNC_INDEX_USERNAME`,
//!   `CALSYNC_INDEX_PASSWORD`
//! - `CALSYNC_ZOOM_API_BASE`
//! - `CALSYNC_SYNC_MAX_CONCURRENT_CALENDARS`, `CALSYNC_SYNC_CRON`,
//!   `CALSYNC_SYNC_JOB_TIMEOUT_SECS`
//! - `CALSYNC_LOG_LEVEL`, `CALSYNC_LOG_JSON`
//! - `CALSYNC_WORKER_PROCESSING_TIMEOUT_SECS`, `CALSYNC_WORKER_JOIN_TIMEOUT_SECS`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./calsync.json` or `./calsync.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use calsync_domain::{CalSyncError, ClientType, Config, OAuthClientConfig, Result};

const CLIENT_TYPES: [(ClientType, &str); 4] = [
    (ClientType::Ios, "IOS"),
    (ClientType::Android, "ANDROID"),
    (ClientType::Web, "WEB"),
    (ClientType::AtomicWeb, "ATOMIC_WEB"),
];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variable is missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `CalSyncError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `CalSyncError::Config` if `CALSYNC_DB_PATH` is missing or any set
/// variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = env_var("CALSYNC_DB_PATH")?;
    override_parsed("CALSYNC_DB_POOL_SIZE", &mut config.database.pool_size)?;

    override_string("CALSYNC_GOOGLE_API_BASE", &mut config.google.api_base);
    override_string("CALSYNC_GOOGLE_TOKEN_URL", &mut config.google.token_url);
    override_string("CALSYNC_GOOGLE_WEBHOOK_ADDRESS", &mut config.google.webhook_address);
    override_parsed("CALSYNC_GOOGLE_CHANNEL_TTL_SECS", &mut config.google.channel_ttl_secs)?;
    if let Some(time_min) = optional_var("CALSYNC_GOOGLE_INITIAL_TIME_MIN") {
        config.google.initial_time_min = Some(time_min);
    }
    for (client_type, name) in CLIENT_TYPES {
        let client_id = optional_var(&format!("CALSYNC_GOOGLE_{name}_CLIENT_ID"));
        if let Some(client_id) = client_id {
            let client_secret =
                optional_var(&format!("CALSYNC_GOOGLE_{name}_CLIENT_SECRET")).unwrap_or_default();
            config
                .google
                .clients
                .insert(client_type, OAuthClientConfig { client_id, client_secret });
        }
    }

    override_string("CALSYNC_BROKER_TOPIC", &mut config.broker.topic);
    override_string("CALSYNC_BROKER_GROUP_ID", &mut config.broker.group_id);
    override_parsed("CALSYNC_BROKER_PARTITIONS", &mut config.broker.partitions)?;
    override_parsed("CALSYNC_BROKER_POLL_INTERVAL_MS", &mut config.broker.poll_interval_ms)?;

    override_string("CALSYNC_BLOB_ROOT_DIR", &mut config.blob.root_dir);

    override_string("CALSYNC_EMBEDDING_API_URL", &mut config.embedding.api_url);
    override_string("CALSYNC_EMBEDDING_API_KEY", &mut config.embedding.api_key);
    override_string("CALSYNC_EMBEDDING_MODEL", &mut config.embedding.model);

    override_string("CALSYNC_INDEX_ENDPOINT", &mut config.index.endpoint);
    override_string("CALSYNC_INDEX_NAME", &mut config.index.index_name);
    if let Some(username) = optional_var("CALSYNC_INDEX_USERNAME") {
        config.index.username = Some(username);
    }
    if let Some(password) = optional_var("CALSYNC_INDEX_PASSWORD") {
        config.index.password = Some(password);
    }

    override_string("CALSYNC_ZOOM_API_BASE", &mut config.zoom.api_base);

    override_parsed(
        "CALSYNC_SYNC_MAX_CONCURRENT_CALENDARS",
        &mut config.sync.max_concurrent_calendars,
    )?;
    if let Some(cron) = optional_var("CALSYNC_SYNC_CRON") {
        config.sync.cron_expression = Some(cron);
    }
    override_parsed("CALSYNC_SYNC_JOB_TIMEOUT_SECS", &mut config.sync.job_timeout_secs)?;

    override_string("CALSYNC_LOG_LEVEL", &mut config.logging.level);
    config.logging.json = env_bool("CALSYNC_LOG_JSON", config.logging.json);

    override_parsed(
        "CALSYNC_WORKER_PROCESSING_TIMEOUT_SECS",
        &mut config.worker.processing_timeout_secs,
    )?;
    override_parsed("CALSYNC_WORKER_JOIN_TIMEOUT_SECS", &mut config.worker.join_timeout_secs)?;

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `CalSyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CalSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CalSyncError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CalSyncError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration, detecting the format from the extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CalSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CalSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CalSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidate_files(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidate_files(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidate_files(dir: &Path) -> Vec<PathBuf> {
    vec![
        dir.join("config.json"),
        dir.join("config.toml"),
        dir.join("calsync.json"),
        dir.join("calsync.toml"),
        dir.join("../config.json"),
        dir.join("../config.toml"),
        dir.join("../../config.json"),
        dir.join("../../config.toml"),
    ]
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    optional_var(key).ok_or_else(|| {
        CalSyncError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Set, non-blank environment variable.
fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn override_string(key: &str, target: &mut String) {
    if let Some(value) = optional_var(key) {
        *target = value;
    }
}

fn override_parsed<T>(key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = optional_var(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|e| CalSyncError::Config(format!("Invalid value for {key}: {e}")))?;
    }
    Ok(())
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use calsync_domain::constants::DEFAULT_VECTOR_TOPIC;
    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ENV_KEYS: &[&str] = &[
        "CALSYNC_DB_PATH",
        "CALSYNC_DB_POOL_SIZE",
        "CALSYNC_GOOGLE_WEBHOOK_ADDRESS",
        "CALSYNC_GOOGLE_INITIAL_TIME_MIN",
        "CALSYNC_GOOGLE_WEB_CLIENT_ID",
        "CALSYNC_GOOGLE_WEB_CLIENT_SECRET",
        "CALSYNC_GOOGLE_IOS_CLIENT_ID",
        "CALSYNC_BROKER_PARTITIONS",
        "CALSYNC_SYNC_CRON",
        "CALSYNC_LOG_JSON",
        "CALSYNC_INDEX_USERNAME",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("CALSYNC_TEST_BOOL_YES", "YES");
        std::env::set_var("CALSYNC_TEST_BOOL_OFF", "off");

        assert!(env_bool("CALSYNC_TEST_BOOL_YES", false));
        assert!(!env_bool("CALSYNC_TEST_BOOL_OFF", true));
        std::env::remove_var("CALSYNC_TEST_BOOL_MISSING");
        assert!(env_bool("CALSYNC_TEST_BOOL_MISSING", true));

        std::env::remove_var("CALSYNC_TEST_BOOL_YES");
        std::env::remove_var("CALSYNC_TEST_BOOL_OFF");
    }

    #[test]
    fn test_load_from_env_overrides_defaults() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CALSYNC_DB_PATH", "/tmp/calsync.db");
        std::env::set_var("CALSYNC_DB_POOL_SIZE", "3");
        std::env::set_var("CALSYNC_GOOGLE_WEBHOOK_ADDRESS", "https://hooks.example.com");
        std::env::set_var("CALSYNC_GOOGLE_WEB_CLIENT_ID", "web-id");
        std::env::set_var("CALSYNC_GOOGLE_WEB_CLIENT_SECRET", "web-secret");
        std::env::set_var("CALSYNC_GOOGLE_IOS_CLIENT_ID", "ios-id");
        std::env::set_var("CALSYNC_BROKER_PARTITIONS", "4");
        std::env::set_var("CALSYNC_SYNC_CRON", "0 */15 * * * *");
        std::env::set_var("CALSYNC_LOG_JSON", "true");

        let result = load_from_env();
        clear_env();
        let config = result.expect("config from env");

        assert_eq!(config.database.path, "/tmp/calsync.db");
        assert_eq!(config.database.pool_size, 3);
        assert_eq!(config.google.webhook_address, "https://hooks.example.com");
        assert_eq!(config.google.clients[&ClientType::Web].client_secret, "web-secret");
        assert_eq!(config.google.clients[&ClientType::Ios].client_secret, "");
        assert!(!config.google.clients.contains_key(&ClientType::Android));
        assert_eq!(config.broker.partitions, 4);
        assert_eq!(config.broker.topic, DEFAULT_VECTOR_TOPIC);
        assert_eq!(config.sync.cron_expression.as_deref(), Some("0 */15 * * * *"));
        assert!(config.logging.json);
        assert_eq!(config.index.username, None);
    }

    #[test]
    fn test_load_from_env_missing_db_path() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let err = load_from_env().unwrap_err();

        assert!(matches!(err, CalSyncError::Config(_)), "Should be a Config error");
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CALSYNC_DB_PATH", "/tmp/calsync.db");
        std::env::set_var("CALSYNC_BROKER_PARTITIONS", "many");

        let result = load_from_env();
        clear_env();

        match result {
            Err(CalSyncError::Config(message)) => {
                assert!(message.contains("CALSYNC_BROKER_PARTITIONS"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file_json() {
        let json_content = r#"{
            "database": {"path": "sync.db", "pool_size": 2},
            "google": {
                "webhook_address": "https://hooks.example.com",
                "clients": {"web": {"client_id": "id", "client_secret": "secret"}}
            },
            "sync": {"max_concurrent_calendars": 8}
        }"#;

        let mut file = NamedTempFile::with_suffix(".json").expect("temp file");
        file.write_all(json_content.as_bytes()).expect("write");

        let config = load_from_file(Some(file.path().to_path_buf())).expect("config loads");

        assert_eq!(config.database.path, "sync.db");
        assert_eq!(config.sync.max_concurrent_calendars, 8);
        assert_eq!(config.google.clients[&ClientType::Web].client_id, "id");
        assert_eq!(config.worker.join_timeout_secs, 5);
    }

    #[test]
    fn test_load_from_file_toml() {
        let toml_content = r#"
[database]
path = "sync.db"

[broker]
topic = "vectors"
partitions = 2

[logging]
level = "debug"
json = true
"#;

        let mut file = NamedTempFile::with_suffix(".toml").expect("temp file");
        file.write_all(toml_content.as_bytes()).expect("write");

        let config = load_from_file(Some(file.path().to_path_buf())).expect("config loads");

        assert_eq!(config.broker.topic, "vectors");
        assert_eq!(config.broker.partitions, 2);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_from_file_rejects_missing_and_unknown_formats() {
        let missing = load_from_file(Some(PathBuf::from("/nonexistent/calsync.json")));
        assert!(matches!(missing, Err(CalSyncError::Config(_))));

        let mut file = NamedTempFile::with_suffix(".yaml").expect("temp file");
        file.write_all(b"database: {}").expect("write");
        let unsupported = load_from_file(Some(file.path().to_path_buf()));
        assert!(matches!(unsupported, Err(CalSyncError::Config(_))));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let mut file = NamedTempFile::with_suffix(".json").expect("temp file");
        file.write_all(b"{ not json").expect("write");

        let result = load_from_file(Some(file.path().to_path_buf()));

        assert!(matches!(result, Err(CalSyncError::Config(_))));
    }
}
