//! SQLite implementation of the reminder repository port.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::sync::ports::ReminderRepository;
use calsync_domain::{ReminderRow, Result};
use rusqlite::{params, ToSql};
use tokio::task;
use tracing::instrument;

use super::manager::DbManager;
use super::sql::{execute_chunked, map_sql_error};
use crate::errors::map_join_error;

/// Reminder rows; replaced wholesale per event on every upsert.
pub struct SqliteReminderRepository {
    db: Arc<DbManager>,
}

impl SqliteReminderRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReminderRepository for SqliteReminderRepository {
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert_reminders(&self, rows: &[ReminderRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let db = Arc::clone(&self.db);
        let rows = rows.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            for row in &rows {
                tx.execute(
                    "INSERT OR REPLACE INTO reminders
                        (id, event_id, user_id, use_default, method, minutes, timezone)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        row.id,
                        row.event_id,
                        row.user_id,
                        row.use_default,
                        row.method,
                        row.minutes,
                        row.timezone,
                    ],
                )
                .map_err(map_sql_error)?;
            }
            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, event_ids), fields(count = event_ids.len()))]
    async fn delete_reminders_for_events(
        &self,
        user_id: &str,
        event_ids: &[String],
    ) -> Result<usize> {
        if event_ids.is_empty() {
            return Ok(0);
        }
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let event_ids = event_ids.to_vec();

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let prefix: [&dyn ToSql; 1] = [&user_id];
            execute_chunked(
                &conn,
                "DELETE FROM reminders WHERE user_id = ? AND event_id IN ({ids})",
                &prefix,
                &event_ids,
            )
        })
        .await
        .map_err(map_join_error)?
    }
}
