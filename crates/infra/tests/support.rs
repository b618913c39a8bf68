#![allow(dead_code)]

use std::sync::Arc;

use calsync_core::RecordStore;
use calsync_domain::constants::GOOGLE_CALENDAR_RESOURCE;
use calsync_domain::{CalendarIntegration, CalendarRecord, ClientType, SyncJob};
use calsync_infra::database::{sqlite_record_store, DbManager, SqliteIntegrationRepository};
use chrono::{Duration, Utc};
use tempfile::TempDir;

pub const USER_ID: &str = "user-1";
pub const CALENDAR_ID: &str = "primary";
pub const INTEGRATION_ID: &str = "int-1";

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    pub temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with migrations applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("calsync-test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("migrations should apply");

        Self { manager: Arc::new(manager), temp_dir }
    }

    pub fn record_store(&self) -> RecordStore {
        sqlite_record_store(Arc::clone(&self.manager))
    }

    /// Execute a batch of SQL statements against the database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = self.manager.get_connection().expect("connection");
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count query")
    }

    /// Seed an enabled web integration with a fresh access token and its
    /// primary calendar.
    pub async fn seed_google_calendar(&self) -> SyncJob {
        let integrations = SqliteIntegrationRepository::new(Arc::clone(&self.manager));
        integrations
            .save_integration(&CalendarIntegration {
                id: INTEGRATION_ID.into(),
                user_id: USER_ID.into(),
                resource: GOOGLE_CALENDAR_RESOURCE.into(),
                client_type: Some(ClientType::Web),
                sync_enabled: true,
                access_token: Some("google-token".into()),
                refresh_token: Some("refresh-token".into()),
                expires_at: Some(Utc::now() + Duration::hours(1)),
            })
            .await
            .expect("integration saved");
        integrations
            .save_calendar(&CalendarRecord {
                id: CALENDAR_ID.into(),
                user_id: USER_ID.into(),
                title: Some("Work".into()),
                resource: GOOGLE_CALENDAR_RESOURCE.into(),
            })
            .await
            .expect("calendar saved");

        SyncJob {
            calendar_integration_id: INTEGRATION_ID.into(),
            calendar_id: CALENDAR_ID.into(),
            user_id: USER_ID.into(),
            client_type: ClientType::Web,
        }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}
