//! Small helpers shared by the SQLite repositories

use calsync_domain::{CalSyncError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ToSql};

use crate::errors::InfraError;

/// Upper bound on host parameters per statement for `IN (...)` batches.
pub(crate) const MAX_BATCH: usize = 500;

pub(crate) fn map_sql_error(err: rusqlite::Error) -> CalSyncError {
    CalSyncError::from(InfraError::from(err))
}

/// `"?, ?, ?"` with `count` placeholders.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn to_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now_timestamp() -> String {
    to_timestamp(&Utc::now())
}

/// Parse a stored RFC 3339 column back into UTC.
pub(crate) fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

/// Run `sql` once per chunk of `ids`, binding `prefix` params before the ids.
/// `sql` must contain a single `{ids}` marker where the placeholders go.
/// Returns the summed affected-row count.
pub(crate) fn execute_chunked(
    conn: &Connection,
    sql: &str,
    prefix: &[&dyn ToSql],
    ids: &[String],
) -> Result<usize> {
    let mut affected = 0;
    for chunk in ids.chunks(MAX_BATCH) {
        let statement = sql.replace("{ids}", &placeholders(chunk.len()));
        let mut params: Vec<&dyn ToSql> = prefix.to_vec();
        params.extend(chunk.iter().map(|id| id as &dyn ToSql));
        affected += conn.execute(&statement, params.as_slice()).map_err(map_sql_error)?;
    }
    Ok(affected)
}

/// Collect `map`ped rows of `sql` over chunks of `ids`.
pub(crate) fn query_chunked<T, F>(
    conn: &Connection,
    sql: &str,
    ids: &[String],
    mut map: F,
) -> Result<Vec<T>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let mut rows = Vec::new();
    for chunk in ids.chunks(MAX_BATCH) {
        let statement = sql.replace("{ids}", &placeholders(chunk.len()));
        let mut stmt = conn.prepare(&statement).map_err(map_sql_error)?;
        let params: Vec<&dyn ToSql> = chunk.iter().map(|id| id as &dyn ToSql).collect();
        let mapped = stmt.query_map(params.as_slice(), &mut map).map_err(map_sql_error)?;
        for row in mapped {
            rows.push(row.map_err(map_sql_error)?);
        }
    }
    Ok(rows)
}
