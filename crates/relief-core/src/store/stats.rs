//! Per-incident sync-stats bookkeeping.
//!
//! One row per incident records where the last pull got to. The row decides
//! whether the next pull is a full pull, a resumed partial pull, or a delta
//! pull against the previous successful sync's start time.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::{StoreError, from_us, from_us_opt, to_us, to_us_opt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentDataSyncStats {
    pub incident_id: i64,
    /// Start of the pass these counters belong to; doubles as the delta
    /// watermark once the pass succeeds.
    pub sync_start: DateTime<Utc>,
    pub target_count: i64,
    pub paged_count: i64,
    /// The `updated_after` watermark the in-progress pass was counted
    /// against; `None` for a full pull. A resumed pass must re-fetch with
    /// the same watermark or its target count means nothing.
    pub delta_after: Option<DateTime<Utc>>,
    pub successful_sync: Option<DateTime<Utc>>,
    pub attempted_sync: DateTime<Utc>,
    pub attempted_counter: i64,
    pub app_build_version_code: i64,
}

impl IncidentDataSyncStats {
    /// A partial pass worth resuming rather than restarting.
    #[must_use]
    pub const fn is_resumable(&self) -> bool {
        self.target_count > 0 && self.paged_count < self.target_count
    }

    /// The `updated_after` watermark for a delta pull, present only after a
    /// fully successful pass.
    #[must_use]
    pub const fn delta_watermark(&self) -> Option<DateTime<Utc>> {
        if self.successful_sync.is_some() {
            Some(self.sync_start)
        } else {
            None
        }
    }
}

/// # Errors
///
/// Returns a database error.
pub fn get_sync_stats(
    conn: &Connection,
    incident_id: i64,
) -> Result<Option<IncidentDataSyncStats>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT incident_id, sync_start_us, target_count, paged_count,
                    delta_after_us, successful_sync_us, attempted_sync_us,
                    attempted_counter, app_build_version_code
             FROM incident_sync_stats WHERE incident_id = ?1",
            params![incident_id],
            |row| {
                Ok(IncidentDataSyncStats {
                    incident_id: row.get(0)?,
                    sync_start: from_us(row.get(1)?),
                    target_count: row.get(2)?,
                    paged_count: row.get(3)?,
                    delta_after: from_us_opt(row.get(4)?),
                    successful_sync: from_us_opt(row.get(5)?),
                    attempted_sync: from_us(row.get(6)?),
                    attempted_counter: row.get(7)?,
                    app_build_version_code: row.get(8)?,
                })
            },
        )
        .optional()?)
}

/// Starts (or restarts) a pass: resets counters, bumps the attempt counter,
/// and clears any previous success so the row reads "paged" until the
/// commit loop finishes.
///
/// # Errors
///
/// Returns a database error.
pub fn begin_sync(
    conn: &Connection,
    incident_id: i64,
    sync_start: DateTime<Utc>,
    target_count: i64,
    delta_after: Option<DateTime<Utc>>,
    app_build_version_code: i64,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO incident_sync_stats (
            incident_id, sync_start_us, target_count, paged_count,
            delta_after_us, successful_sync_us, attempted_sync_us,
            attempted_counter, app_build_version_code
        ) VALUES (?1, ?2, ?3, 0, ?4, NULL, ?2, 1, ?5)
        ON CONFLICT (incident_id) DO UPDATE SET
            sync_start_us = excluded.sync_start_us,
            target_count = excluded.target_count,
            paged_count = 0,
            delta_after_us = excluded.delta_after_us,
            successful_sync_us = NULL,
            attempted_sync_us = excluded.attempted_sync_us,
            attempted_counter = attempted_counter + 1,
            app_build_version_code = excluded.app_build_version_code",
        params![
            incident_id,
            to_us(sync_start),
            target_count,
            to_us_opt(delta_after),
            app_build_version_code
        ],
    )?;
    Ok(())
}

/// Resumes a partial pass without resetting its counters.
///
/// # Errors
///
/// Returns a database error.
pub fn record_attempt(
    conn: &Connection,
    incident_id: i64,
    attempted_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE incident_sync_stats SET
            attempted_sync_us = ?2,
            attempted_counter = attempted_counter + 1
         WHERE incident_id = ?1",
        params![incident_id, to_us(attempted_at)],
    )?;
    Ok(())
}

/// Advances the contiguous committed-prefix counter after a page commit.
///
/// # Errors
///
/// Returns a database error.
pub fn update_paged_count(
    conn: &Connection,
    incident_id: i64,
    paged_count: i64,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE incident_sync_stats SET paged_count = ?2 WHERE incident_id = ?1",
        params![incident_id, paged_count],
    )?;
    Ok(())
}

/// Marks the pass fully successful; its start time becomes the next delta
/// watermark.
///
/// # Errors
///
/// Returns a database error.
pub fn mark_successful(
    conn: &Connection,
    incident_id: i64,
    completed_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE incident_sync_stats SET successful_sync_us = ?2 WHERE incident_id = ?1",
        params![incident_id, to_us(completed_at)],
    )?;
    Ok(())
}
