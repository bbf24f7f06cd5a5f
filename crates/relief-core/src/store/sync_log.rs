//! Operational sync log: append, capped read, prune by age.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use super::{StoreError, from_us, to_us};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLogRow {
    pub id: i64,
    pub log_at: DateTime<Utc>,
    pub log_type: String,
    pub message: String,
    pub details: String,
    pub worksite_id: Option<i64>,
}

/// # Errors
///
/// Returns a database error.
pub fn append(
    conn: &Connection,
    log_at: DateTime<Utc>,
    log_type: &str,
    message: &str,
    details: &str,
    worksite_id: Option<i64>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO sync_log (log_at_us, log_type, message, details, worksite_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![to_us(log_at), log_type, message, details, worksite_id],
    )?;
    Ok(())
}

/// Most recent rows first, capped at `limit`.
///
/// # Errors
///
/// Returns a database error.
pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<SyncLogRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, log_at_us, log_type, message, details, worksite_id
         FROM sync_log ORDER BY log_at_us DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(SyncLogRow {
            id: row.get(0)?,
            log_at: from_us(row.get(1)?),
            log_type: row.get(2)?,
            message: row.get(3)?,
            details: row.get(4)?,
            worksite_id: row.get(5)?,
        })
    })?;
    rows.collect::<rusqlite::Result<_>>().map_err(StoreError::Db)
}

/// Deletes rows strictly older than `cutoff`; returns how many went.
///
/// # Errors
///
/// Returns a database error.
pub fn prune_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
    let count = conn.execute(
        "DELETE FROM sync_log WHERE log_at_us < ?1",
        params![to_us(cutoff)],
    )?;
    Ok(count)
}
