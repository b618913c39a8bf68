//! SQLite storage for per-calendar sync cursors and webhook channels.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::sync::ports::{CursorRepository, WebhookRepository};
use calsync_domain::{Result, SyncCursor, WebhookChannel};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;
use tracing::{debug, instrument};

use super::manager::DbManager;
use super::sql::{map_sql_error, now_timestamp, parse_timestamp, to_timestamp};
use crate::errors::map_join_error;

pub struct SqliteCursorRepository {
    db: Arc<DbManager>,
}

impl SqliteCursorRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CursorRepository for SqliteCursorRepository {
    async fn load_cursor(&self, calendar_id: &str) -> Result<Option<SyncCursor>> {
        let db = Arc::clone(&self.db);
        let calendar_id = calendar_id.to_string();

        task::spawn_blocking(move || -> Result<Option<SyncCursor>> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT calendar_id, user_id, page_token, sync_token
                 FROM calendar_sync_cursors WHERE calendar_id = ?1",
                params![calendar_id],
                |row| {
                    Ok(SyncCursor {
                        calendar_id: row.get(0)?,
                        user_id: row.get(1)?,
                        page_token: row.get(2)?,
                        sync_token: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, cursor), fields(calendar_id = %cursor.calendar_id))]
    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        let db = Arc::clone(&self.db);
        let cursor = cursor.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO calendar_sync_cursors
                    (calendar_id, user_id, page_token, sync_token, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(calendar_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    page_token = excluded.page_token,
                    sync_token = excluded.sync_token,
                    updated_at = excluded.updated_at",
                params![
                    cursor.calendar_id,
                    cursor.user_id,
                    cursor.page_token,
                    cursor.sync_token,
                    now_timestamp(),
                ],
            )
            .map_err(map_sql_error)?;
            debug!(
                has_page_token = cursor.page_token.is_some(),
                has_sync_token = cursor.sync_token.is_some(),
                "sync cursor saved"
            );
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn reset_cursor(&self, calendar_id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let calendar_id = calendar_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE calendar_sync_cursors
                 SET page_token = NULL, sync_token = NULL, updated_at = ?2
                 WHERE calendar_id = ?1",
                params![calendar_id, now_timestamp()],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

/// At most one channel per calendar, enforced by a unique index.
pub struct SqliteWebhookRepository {
    db: Arc<DbManager>,
}

impl SqliteWebhookRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WebhookRepository for SqliteWebhookRepository {
    async fn find_channel(&self, calendar_id: &str) -> Result<Option<WebhookChannel>> {
        let db = Arc::clone(&self.db);
        let calendar_id = calendar_id.to_string();

        task::spawn_blocking(move || -> Result<Option<WebhookChannel>> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT channel_id, calendar_id, calendar_integration_id, user_id, resource_id,
                        resource_uri, token, expiration, created_at, updated_at
                 FROM calendar_webhooks WHERE calendar_id = ?1",
                params![calendar_id],
                map_channel_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(
        skip(self, channel),
        fields(channel_id = %channel.channel_id, calendar_id = %channel.calendar_id)
    )]
    async fn insert_channel(&self, channel: &WebhookChannel) -> Result<()> {
        let db = Arc::clone(&self.db);
        let channel = channel.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO calendar_webhooks (
                    channel_id, calendar_id, calendar_integration_id, user_id, resource_id,
                    resource_uri, token, expiration, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    channel.channel_id,
                    channel.calendar_id,
                    channel.calendar_integration_id,
                    channel.user_id,
                    channel.resource_id,
                    channel.resource_uri,
                    channel.token,
                    to_timestamp(&channel.expiration),
                    to_timestamp(&channel.created_at),
                    to_timestamp(&channel.updated_at),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let channel_id = channel_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM calendar_webhooks WHERE channel_id = ?1", params![channel_id])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_channel_row(row: &Row<'_>) -> rusqlite::Result<WebhookChannel> {
    let expiration: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(WebhookChannel {
        channel_id: row.get(0)?,
        calendar_id: row.get(1)?,
        calendar_integration_id: row.get(2)?,
        user_id: row.get(3)?,
        resource_id: row.get(4)?,
        resource_uri: row.get(5)?,
        token: row.get(6)?,
        expiration: parse_timestamp(7, &expiration)?,
        created_at: parse_timestamp(8, &created_at)?,
        updated_at: parse_timestamp(9, &updated_at)?,
    })
}
