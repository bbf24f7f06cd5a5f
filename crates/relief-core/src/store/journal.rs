//! Change-journal rows: append, read, push bookkeeping, archival.
//!
//! Rows are append-only. The only mutations are the pusher's attempt
//! counters and the terminal archive action; payloads never change after
//! the edit that wrote them.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::journal::{ARCHIVE_SUPERSEDED, ChangeData, WorksiteChange};

use super::{StoreError, from_us, from_us_opt, to_us};

/// Appends one journal row; returns its id.
///
/// # Errors
///
/// Returns a database or serialization error.
pub fn append_change(
    conn: &Connection,
    worksite_id: i64,
    sync_uuid: &str,
    organization_id: i64,
    app_version: i64,
    data: &ChangeData,
    created_at: DateTime<Utc>,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO worksite_change (
            worksite_id, sync_uuid, organization_id, app_version,
            created_at_us, change_data
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            worksite_id,
            sync_uuid,
            organization_id,
            app_version,
            to_us(created_at),
            data.to_json()?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Unarchived rows, oldest first per worksite, the pusher's work queue.
///
/// # Errors
///
/// Returns a database or deserialization error.
pub fn pending_changes(conn: &Connection) -> Result<Vec<WorksiteChange>, StoreError> {
    query_changes(
        conn,
        "SELECT id, worksite_id, sync_uuid, organization_id, app_version,
                created_at_us, change_data, save_attempt, save_attempt_at_us,
                archive_action
         FROM worksite_change
         WHERE archive_action IS NULL
         ORDER BY worksite_id, created_at_us, id",
        params![],
    )
}

/// Every row recorded by an organization, for claim/close analytics.
///
/// # Errors
///
/// Returns a database or deserialization error.
pub fn get_org_changes(
    conn: &Connection,
    organization_id: i64,
) -> Result<Vec<WorksiteChange>, StoreError> {
    query_changes(
        conn,
        "SELECT id, worksite_id, sync_uuid, organization_id, app_version,
                created_at_us, change_data, save_attempt, save_attempt_at_us,
                archive_action
         FROM worksite_change
         WHERE organization_id = ?1
         ORDER BY created_at_us, id",
        params![organization_id],
    )
}

/// Bumps a row's push-attempt bookkeeping after a failed upload.
///
/// # Errors
///
/// Returns a database error.
pub fn record_save_attempt(
    conn: &Connection,
    change_id: i64,
    attempted_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE worksite_change SET
            save_attempt = save_attempt + 1,
            save_attempt_at_us = ?2
         WHERE id = ?1",
        params![change_id, to_us(attempted_at)],
    )?;
    Ok(())
}

/// Retires a row with a terminal action ([`crate::journal::ARCHIVE_SYNCED`]
/// or [`ARCHIVE_SUPERSEDED`]).
///
/// # Errors
///
/// Returns a database error.
pub fn archive_change(conn: &Connection, change_id: i64, action: &str) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE worksite_change SET archive_action = ?2 WHERE id = ?1",
        params![change_id, action],
    )?;
    Ok(())
}

/// Marks all pending rows for a worksite older than `newest_id` superseded.
///
/// The edit path never calls this: by default every journaled change
/// replays in order, since each snapshot pair only carries its own delta.
/// Embedders whose changes are full-state writes can call it after a save
/// to collapse a worksite's backlog to the newest row.
///
/// # Errors
///
/// Returns a database error.
pub fn supersede_older_changes(
    conn: &Connection,
    worksite_id: i64,
    newest_id: i64,
) -> Result<usize, StoreError> {
    let count = conn.execute(
        "UPDATE worksite_change SET archive_action = ?3
         WHERE worksite_id = ?1 AND id < ?2 AND archive_action IS NULL",
        params![worksite_id, newest_id, ARCHIVE_SUPERSEDED],
    )?;
    Ok(count)
}

fn query_changes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<WorksiteChange>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, i64>(7)?,
            row.get::<_, Option<i64>>(8)?,
            row.get::<_, Option<String>>(9)?,
        ))
    })?;

    let mut changes = Vec::new();
    for row in rows {
        let (
            id,
            worksite_id,
            sync_uuid,
            organization_id,
            app_version,
            created_at_us,
            change_data,
            save_attempt,
            save_attempt_at_us,
            archive_action,
        ) = row?;
        changes.push(WorksiteChange {
            id,
            worksite_id,
            sync_uuid,
            organization_id,
            app_version,
            created_at: from_us(created_at_us),
            data: ChangeData::from_json(&change_data)?,
            save_attempt,
            save_attempt_at: from_us_opt(save_attempt_at_us),
            archive_action,
        });
    }
    Ok(changes)
}
