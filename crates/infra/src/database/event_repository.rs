//! SQLite implementation of the event repository port.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::sync::ports::EventRepository;
use calsync_domain::{DeletedEventRef, EventRow, Result};
use rusqlite::{params, Connection, Row};
use tokio::task;
use tracing::{debug, instrument};

use super::manager::DbManager;
use super::sql::{map_sql_error, query_chunked};
use crate::errors::map_join_error;

/// Event rows keyed by `"<eventId>#<calendarId>"`.
pub struct SqliteEventRepository {
    db: Arc<DbManager>,
}

impl SqliteEventRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn upsert_row(conn: &Connection, row: &EventRow) -> Result<()> {
        conn.execute(
            EVENT_UPSERT_SQL,
            params![
                row.id,
                row.event_id,
                row.user_id,
                row.calendar_id,
                row.summary,
                row.notes,
                row.location,
                row.status,
                row.start_date,
                row.end_date,
                row.all_day,
                row.timezone,
                row.recurring_event_id,
                row.html_link,
                row.conference_id,
                row.color_id,
                row.background_color,
                row.foreground_color,
                row.created_at,
                row.updated_at,
            ],
        )
        .map_err(map_sql_error)?;
        Ok(())
    }

    /// Read one row back; used by tests and diagnostics.
    pub async fn find_event(&self, id: &str) -> Result<Option<EventRow>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<Option<EventRow>> {
            let conn = db.get_connection()?;
            let mut rows = query_chunked(&conn, EVENT_SELECT_SQL, &[id], map_event_row)?;
            Ok(rows.pop())
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn upsert_events(&self, rows: &[EventRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let db = Arc::clone(&self.db);
        let rows = rows.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            for row in &rows {
                Self::upsert_row(&tx, row)?;
            }
            tx.commit().map_err(map_sql_error)?;
            debug!(count = rows.len(), "event rows upserted");
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_events(&self, ids: &[String]) -> Result<Vec<DeletedEventRef>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let db = Arc::clone(&self.db);
        let ids = ids.to_vec();

        task::spawn_blocking(move || -> Result<Vec<DeletedEventRef>> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            let deleted = query_chunked(&tx, EVENT_DELETE_SQL, &ids, |row| {
                Ok(DeletedEventRef {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    calendar_id: row.get(2)?,
                    conference_id: row.get(3)?,
                    meeting_id: row.get(4)?,
                })
            })?;
            tx.commit().map_err(map_sql_error)?;
            Ok(deleted)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        user_id: row.get(2)?,
        calendar_id: row.get(3)?,
        summary: row.get(4)?,
        notes: row.get(5)?,
        location: row.get(6)?,
        status: row.get(7)?,
        start_date: row.get(8)?,
        end_date: row.get(9)?,
        all_day: row.get(10)?,
        timezone: row.get(11)?,
        recurring_event_id: row.get(12)?,
        html_link: row.get(13)?,
        conference_id: row.get(14)?,
        color_id: row.get(15)?,
        background_color: row.get(16)?,
        foreground_color: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

// `meeting_id` is owned by scheduling assists and survives re-syncs.
const EVENT_UPSERT_SQL: &str = "INSERT INTO events (
        id, event_id, user_id, calendar_id, summary, notes, location, status, start_date,
        end_date, all_day, timezone, recurring_event_id, html_link, conference_id, color_id,
        background_color, foreground_color, deleted, created_at, updated_at
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, 0, ?19, ?20
    )
    ON CONFLICT(id) DO UPDATE SET
        event_id = excluded.event_id,
        user_id = excluded.user_id,
        calendar_id = excluded.calendar_id,
        summary = excluded.summary,
        notes = excluded.notes,
        location = excluded.location,
        status = excluded.status,
        start_date = excluded.start_date,
        end_date = excluded.end_date,
        all_day = excluded.all_day,
        timezone = excluded.timezone,
        recurring_event_id = excluded.recurring_event_id,
        html_link = excluded.html_link,
        conference_id = excluded.conference_id,
        color_id = excluded.color_id,
        background_color = excluded.background_color,
        foreground_color = excluded.foreground_color,
        deleted = 0,
        updated_at = excluded.updated_at";

const EVENT_SELECT_SQL: &str = "SELECT
        id, event_id, user_id, calendar_id, summary, notes, location, status, start_date,
        end_date, all_day, timezone, recurring_event_id, html_link, conference_id, color_id,
        background_color, foreground_color, created_at, updated_at
    FROM events WHERE id IN ({ids})";

const EVENT_DELETE_SQL: &str = "DELETE FROM events WHERE id IN ({ids})
    RETURNING id, event_id, calendar_id, conference_id, meeting_id";
