//! SQLite implementation of the integration repository port.
//!
//! Integrations hold the OAuth tokens the gateway authenticates with; the
//! calendars table owns the rows the sync cursor hangs off.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::sync::ports::IntegrationRepository;
use calsync_domain::constants::GOOGLE_CALENDAR_RESOURCE;
use calsync_domain::{CalendarIntegration, CalendarRecord, ClientType, Result, SyncJob};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;
use tracing::{instrument, warn};

use super::manager::DbManager;
use super::sql::{map_sql_error, now_timestamp, parse_timestamp, to_timestamp};
use crate::errors::map_join_error;

pub struct SqliteIntegrationRepository {
    db: Arc<DbManager>,
}

impl SqliteIntegrationRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert or replace an integration row.
    pub async fn save_integration(&self, integration: &CalendarIntegration) -> Result<()> {
        let db = Arc::clone(&self.db);
        let integration = integration.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT OR REPLACE INTO calendar_integrations (
                    id, user_id, resource, client_type, sync_enabled, access_token,
                    refresh_token, expires_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    integration.id,
                    integration.user_id,
                    integration.resource,
                    integration.client_type.map(ClientType::as_str),
                    integration.sync_enabled,
                    integration.access_token,
                    integration.refresh_token,
                    integration.expires_at.as_ref().map(to_timestamp),
                    now_timestamp(),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    /// Insert or replace a calendar row.
    pub async fn save_calendar(&self, calendar: &CalendarRecord) -> Result<()> {
        let db = Arc::clone(&self.db);
        let calendar = calendar.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT OR REPLACE INTO calendars (id, user_id, title, resource)
                 VALUES (?1, ?2, ?3, ?4)",
                params![calendar.id, calendar.user_id, calendar.title, calendar.resource],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl IntegrationRepository for SqliteIntegrationRepository {
    async fn find_integration(&self, id: &str) -> Result<Option<CalendarIntegration>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<Option<CalendarIntegration>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!("{INTEGRATION_SELECT_SQL} WHERE id = ?1"),
                params![id],
                map_integration_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_integration_for_user(
        &self,
        user_id: &str,
        resource: &str,
    ) -> Result<Option<CalendarIntegration>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let resource = resource.to_string();

        task::spawn_blocking(move || -> Result<Option<CalendarIntegration>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!(
                    "{INTEGRATION_SELECT_SQL} WHERE user_id = ?1 AND resource = ?2
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![user_id, resource],
                map_integration_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_calendar(&self, calendar_id: &str) -> Result<Option<CalendarRecord>> {
        let db = Arc::clone(&self.db);
        let calendar_id = calendar_id.to_string();

        task::spawn_blocking(move || -> Result<Option<CalendarRecord>> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT id, user_id, title, resource FROM calendars WHERE id = ?1",
                params![calendar_id],
                |row| {
                    Ok(CalendarRecord {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        title: row.get(2)?,
                        resource: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn set_sync_enabled(&self, integration_id: &str, enabled: bool) -> Result<()> {
        let db = Arc::clone(&self.db);
        let integration_id = integration_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE calendar_integrations SET sync_enabled = ?2, updated_at = ?3 WHERE id = ?1",
                params![integration_id, enabled, now_timestamp()],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, access_token))]
    async fn update_access_token(
        &self,
        integration_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let integration_id = integration_id.to_string();
        let access_token = access_token.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE calendar_integrations
                 SET access_token = ?2, expires_at = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![integration_id, access_token, to_timestamp(&expires_at), now_timestamp()],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_sync_jobs(&self) -> Result<Vec<SyncJob>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<SyncJob>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT i.id, c.id, c.user_id, i.client_type
                     FROM calendars c
                     JOIN calendar_integrations i
                       ON i.user_id = c.user_id AND i.resource = c.resource
                     WHERE i.sync_enabled = 1 AND i.client_type IS NOT NULL AND c.resource = ?1
                     ORDER BY c.user_id, c.id",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![GOOGLE_CALENDAR_RESOURCE], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(map_sql_error)?;

            let mut jobs = Vec::new();
            for row in rows {
                let (integration_id, calendar_id, user_id, client_type) =
                    row.map_err(map_sql_error)?;
                match client_type.parse::<ClientType>() {
                    Ok(client_type) => jobs.push(SyncJob {
                        calendar_integration_id: integration_id,
                        calendar_id,
                        user_id,
                        client_type,
                    }),
                    Err(error) => warn!(calendar_id, error = %error, "skipping calendar"),
                }
            }
            Ok(jobs)
        })
        .await
        .map_err(map_join_error)?
    }
}

const INTEGRATION_SELECT_SQL: &str = "SELECT
        id, user_id, resource, client_type, sync_enabled, access_token, refresh_token, expires_at
    FROM calendar_integrations";

fn map_integration_row(row: &Row<'_>) -> rusqlite::Result<CalendarIntegration> {
    let client_type: Option<String> = row.get(3)?;
    let expires_at: Option<String> = row.get(7)?;
    Ok(CalendarIntegration {
        id: row.get(0)?,
        user_id: row.get(1)?,
        resource: row.get(2)?,
        client_type: client_type.and_then(|value| value.parse().ok()),
        sync_enabled: row.get(4)?,
        access_token: row.get(5)?,
        refresh_token: row.get(6)?,
        expires_at: expires_at.map(|value| parse_timestamp(7, &value)).transpose()?,
    })
}
