//! SQLite implementation of the attendee repository port.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::sync::ports::AttendeeRepository;
use calsync_domain::{AttendeeRow, Result};
use rusqlite::params;
use tokio::task;
use tracing::instrument;

use super::manager::DbManager;
use super::sql::{execute_chunked, map_sql_error};
use crate::errors::map_join_error;

pub struct SqliteAttendeeRepository {
    db: Arc<DbManager>,
}

impl SqliteAttendeeRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AttendeeRepository for SqliteAttendeeRepository {
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn upsert_attendees(&self, rows: &[AttendeeRow]) -> Result<()> {
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
                    ATTENDEE_UPSERT_SQL,
                    params![
                        row.id,
                        row.event_id,
                        row.user_id,
                        row.name,
                        row.email,
                        row.response_status,
                        row.optional,
                        row.resource,
                        row.organizer,
                        row.comment,
                        row.additional_guests,
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
    async fn delete_attendees_for_events(&self, event_ids: &[String]) -> Result<usize> {
        if event_ids.is_empty() {
            return Ok(0);
        }
        let db = Arc::clone(&self.db);
        let event_ids = event_ids.to_vec();

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            execute_chunked(
                &conn,
                "DELETE FROM attendees WHERE event_id IN ({ids})",
                &[],
                &event_ids,
            )
        })
        .await
        .map_err(map_join_error)?
    }
}

const ATTENDEE_UPSERT_SQL: &str = "INSERT INTO attendees (
        id, event_id, user_id, name, email, response_status, optional, resource, organizer,
        comment, additional_guests
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(id) DO UPDATE SET
        event_id = excluded.event_id,
        user_id = excluded.user_id,
        name = excluded.name,
        email = excluded.email,
        response_status = excluded.response_status,
        optional = excluded.optional,
        resource = excluded.resource,
        organizer = excluded.organizer,
        comment = excluded.comment,
        additional_guests = excluded.additional_guests";
