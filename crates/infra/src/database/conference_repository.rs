//! SQLite implementations of the conference and meeting-assist ports.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::sync::ports::{ConferenceRepository, MeetingAssistRepository};
use calsync_domain::{ConferenceRow, Result};
use rusqlite::params;
use tokio::task;
use tracing::instrument;

use super::manager::DbManager;
use super::sql::{execute_chunked, map_sql_error, query_chunked};
use crate::errors::map_join_error;

/// Conference rows keyed by the provider's bare conference id.
pub struct SqliteConferenceRepository {
    db: Arc<DbManager>,
}

impl SqliteConferenceRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConferenceRepository for SqliteConferenceRepository {
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn upsert_conferences(&self, rows: &[ConferenceRow]) -> Result<()> {
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
                    CONFERENCE_UPSERT_SQL,
                    params![
                        row.id,
                        row.user_id,
                        row.calendar_id,
                        row.event_id,
                        row.conference_type,
                        row.name,
                        row.icon_uri,
                        row.entry_points,
                        row.notes,
                        row.app,
                        row.is_host,
                    ],
                )
                .map_err(map_sql_error)?;
            }
            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_conferences(&self, ids: &[String]) -> Result<Vec<ConferenceRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let db = Arc::clone(&self.db);
        let ids = ids.to_vec();

        task::spawn_blocking(move || -> Result<Vec<ConferenceRow>> {
            let conn = db.get_connection()?;
            query_chunked(&conn, CONFERENCE_SELECT_SQL, &ids, |row| {
                Ok(ConferenceRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    calendar_id: row.get(2)?,
                    event_id: row.get(3)?,
                    conference_type: row.get(4)?,
                    name: row.get(5)?,
                    icon_uri: row.get(6)?,
                    entry_points: row.get(7)?,
                    notes: row.get(8)?,
                    app: row.get(9)?,
                    is_host: row.get(10)?,
                })
            })
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_conferences(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let db = Arc::clone(&self.db);
        let ids = ids.to_vec();

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            execute_chunked(&conn, "DELETE FROM conferences WHERE id IN ({ids})", &[], &ids)
        })
        .await
        .map_err(map_join_error)?
    }
}

pub struct SqliteMeetingAssistRepository {
    db: Arc<DbManager>,
}

impl SqliteMeetingAssistRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MeetingAssistRepository for SqliteMeetingAssistRepository {
    #[instrument(skip(self, meeting_ids), fields(count = meeting_ids.len()))]
    async fn delete_meeting_assists(&self, meeting_ids: &[String]) -> Result<usize> {
        if meeting_ids.is_empty() {
            return Ok(0);
        }
        let db = Arc::clone(&self.db);
        let meeting_ids = meeting_ids.to_vec();

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            execute_chunked(
                &conn,
                "DELETE FROM meeting_assists WHERE meeting_id IN ({ids})",
                &[],
                &meeting_ids,
            )
        })
        .await
        .map_err(map_join_error)?
    }
}

// `is_host` is set by whoever provisioned the conference; sync never clears it.
const CONFERENCE_UPSERT_SQL: &str = "INSERT INTO conferences (
        id, user_id, calendar_id, event_id, type, name, icon_uri, entry_points, notes, app, is_host
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(id) DO UPDATE SET
        user_id = excluded.user_id,
        calendar_id = excluded.calendar_id,
        event_id = excluded.event_id,
        type = excluded.type,
        name = excluded.name,
        icon_uri = excluded.icon_uri,
        entry_points = excluded.entry_points,
        notes = excluded.notes,
        app = excluded.app";

const CONFERENCE_SELECT_SQL: &str = "SELECT
        id, user_id, calendar_id, event_id, type, name, icon_uri, entry_points, notes, app, is_host
    FROM conferences WHERE id IN ({ids})";
