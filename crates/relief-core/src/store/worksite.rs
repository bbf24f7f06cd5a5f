//! Worksite persistence: paged network upserts, local-edit saves, queries.
//!
//! Two write paths share these tables and must not trample each other:
//!
//! - [`upsert_worksites_page`] is the pull syncer's bulk path. It writes in
//!   bounded `BEGIN IMMEDIATE` batches and skips any row whose
//!   `is_local_modified` flag is set, so an unsynced local edit survives a
//!   concurrent page commit.
//! - [`save_local_worksite`] is the repository's edit path. It marks the row
//!   locally modified, which shields it from the bulk path until the pusher
//!   clears the flag via [`mark_synced`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::cancel::CancellationToken;
use crate::geo::{LatLngBounds, haversine_radians};
use crate::model::{
    FormValue, NetworkFile, UNSYNCED_NETWORK_ID, WorkType, Worksite, WorksiteFlag, WorksiteNote,
};

use super::{StoreError, from_us, from_us_opt, to_us, to_us_opt};

/// Counters returned by a page upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageUpsertStats {
    /// Rows written (inserted or updated).
    pub saved: usize,
    /// Rows left untouched because a local edit is pending.
    pub skipped_locally_modified: usize,
}

/// Bulk-writes one fetched page in batches of `batch_size` worksites.
///
/// Each batch is one transaction; a failure rolls back only that batch and
/// propagates, leaving earlier batches committed. The cancellation token is
/// checked between batches. `sync_timestamp` is recorded as each row's
/// `synced_at`.
///
/// # Errors
///
/// Returns [`StoreError::Cancelled`] when cancelled between batches, or a
/// database error from the failing batch.
pub fn upsert_worksites_page(
    conn: &Connection,
    worksites: &[Worksite],
    sync_timestamp: DateTime<Utc>,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<PageUpsertStats, StoreError> {
    let mut stats = PageUpsertStats::default();
    for batch in worksites.chunks(batch_size.max(1)) {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = upsert_batch(conn, batch, sync_timestamp, &mut stats);
        match result {
            Ok(()) => conn.execute_batch("COMMIT")?,
            Err(err) => {
                // Roll back this batch only; prior batches stay committed.
                let _ = conn.execute_batch("ROLLBACK");
                return Err(err);
            }
        }
    }
    Ok(stats)
}

fn upsert_batch(
    conn: &Connection,
    batch: &[Worksite],
    sync_timestamp: DateTime<Utc>,
    stats: &mut PageUpsertStats,
) -> Result<(), StoreError> {
    for worksite in batch {
        let existing: Option<(i64, bool)> = conn
            .query_row(
                "SELECT id, is_local_modified FROM worksite
                 WHERE network_id = ?1 AND local_global_uuid = ''",
                params![worksite.network_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((_, true)) = existing {
            stats.skipped_locally_modified += 1;
            continue;
        }

        let id = upsert_root(conn, worksite, sync_timestamp)?;
        replace_sub_entities(conn, id, worksite, true)?;
        stats.saved += 1;
    }
    Ok(())
}

fn upsert_root(
    conn: &Connection,
    w: &Worksite,
    synced_at: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let id = conn.query_row(
        "INSERT INTO worksite (
            network_id, local_global_uuid, incident_id, address, case_number,
            city, county, state, postal_code, latitude, longitude, name,
            phone1, phone2, email, key_work_type, reported_by, svi,
            created_at_us, updated_at_us, is_local_favorite,
            is_local_modified, synced_at_us
        ) VALUES (
            ?1, '', ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
            ?15, ?16, ?17, ?18, ?19, ?20, 0, ?21
        )
        ON CONFLICT (network_id, local_global_uuid) DO UPDATE SET
            incident_id = excluded.incident_id,
            address = excluded.address,
            case_number = excluded.case_number,
            city = excluded.city,
            county = excluded.county,
            state = excluded.state,
            postal_code = excluded.postal_code,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            name = excluded.name,
            phone1 = excluded.phone1,
            phone2 = excluded.phone2,
            email = excluded.email,
            key_work_type = excluded.key_work_type,
            reported_by = excluded.reported_by,
            svi = excluded.svi,
            created_at_us = excluded.created_at_us,
            updated_at_us = excluded.updated_at_us,
            is_local_favorite = excluded.is_local_favorite,
            is_local_modified = 0,
            synced_at_us = excluded.synced_at_us
        RETURNING id",
        params![
            w.network_id,
            w.incident_id,
            w.address,
            w.case_number,
            w.city,
            w.county,
            w.state,
            w.postal_code,
            w.latitude,
            w.longitude,
            w.name,
            w.phone1,
            w.phone2,
            w.email,
            w.key_work_type.as_ref().map(|wt| wt.work_type.clone()),
            w.reported_by,
            w.svi,
            to_us_opt(w.created_at),
            to_us_opt(w.updated_at),
            w.is_local_favorite,
            to_us(synced_at),
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Saves a local edit, stamping the row locally modified so paged network
/// writes leave it alone until it is pushed.
///
/// A brand-new worksite gets `local_global_uuid = sync_uuid`, keeping the
/// `(network_id, local_global_uuid)` pair unique while `network_id` is still
/// the unsynced sentinel. Returns the local id.
///
/// # Errors
///
/// Returns a database error; the transaction rolls back as a unit.
pub fn save_local_worksite(
    conn: &Connection,
    worksite: &Worksite,
    sync_uuid: &str,
    modified_at: DateTime<Utc>,
) -> Result<i64, StoreError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = save_local_inner(conn, worksite, sync_uuid, modified_at);
    match result {
        Ok(id) => {
            conn.execute_batch("COMMIT")?;
            Ok(id)
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(err)
        }
    }
}

fn save_local_inner(
    conn: &Connection,
    w: &Worksite,
    sync_uuid: &str,
    modified_at: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let id = if w.id > 0 {
        conn.execute(
            "UPDATE worksite SET
                incident_id = ?2, address = ?3, case_number = ?4, city = ?5,
                county = ?6, state = ?7, postal_code = ?8, latitude = ?9,
                longitude = ?10, name = ?11, phone1 = ?12, phone2 = ?13,
                email = ?14, key_work_type = ?15, is_local_favorite = ?16,
                updated_at_us = ?17, sync_uuid = ?18,
                is_local_modified = 1, local_modified_at_us = ?19
             WHERE id = ?1",
            params![
                w.id,
                w.incident_id,
                w.address,
                w.case_number,
                w.city,
                w.county,
                w.state,
                w.postal_code,
                w.latitude,
                w.longitude,
                w.name,
                w.phone1,
                w.phone2,
                w.email,
                w.key_work_type.as_ref().map(|wt| wt.work_type.clone()),
                w.is_local_favorite,
                to_us(modified_at),
                sync_uuid,
                to_us(modified_at),
            ],
        )?;
        w.id
    } else {
        conn.query_row(
            "INSERT INTO worksite (
                network_id, local_global_uuid, incident_id, address,
                case_number, city, county, state, postal_code, latitude,
                longitude, name, phone1, phone2, email, key_work_type,
                is_local_favorite, created_at_us, updated_at_us, sync_uuid,
                is_local_modified, local_modified_at_us
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, 1, ?21
            )
            RETURNING id",
            params![
                UNSYNCED_NETWORK_ID,
                sync_uuid,
                w.incident_id,
                w.address,
                w.case_number,
                w.city,
                w.county,
                w.state,
                w.postal_code,
                w.latitude,
                w.longitude,
                w.name,
                w.phone1,
                w.phone2,
                w.email,
                w.key_work_type.as_ref().map(|wt| wt.work_type.clone()),
                w.is_local_favorite,
                to_us(modified_at),
                to_us(modified_at),
                sync_uuid,
                to_us(modified_at),
            ],
            |row| row.get(0),
        )?
    };

    replace_sub_entities(conn, id, w, false)?;
    Ok(id)
}

/// Reconciles the sub-entity tables against the incoming worksite.
///
/// Work types and flags upsert on their unique keys and drop rows absent
/// from the incoming set. Notes append; rows mirrored from the network are
/// replaced wholesale on network writes, and file metadata follows the
/// backend's attachment set the same way. Form data is replaced.
fn replace_sub_entities(
    conn: &Connection,
    worksite_id: i64,
    w: &Worksite,
    from_network: bool,
) -> Result<(), StoreError> {
    for wt in &w.work_types {
        conn.execute(
            "INSERT INTO work_type (
                network_id, worksite_id, work_type, status, org_claim,
                created_at_us, next_recur_at_us, phase, recur
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (worksite_id, work_type) DO UPDATE SET
                network_id = excluded.network_id,
                status = excluded.status,
                org_claim = excluded.org_claim,
                next_recur_at_us = excluded.next_recur_at_us,
                phase = excluded.phase,
                recur = excluded.recur",
            params![
                wt.network_id,
                worksite_id,
                wt.work_type,
                wt.status,
                wt.org_claim,
                to_us_opt(wt.created_at),
                to_us_opt(wt.next_recur_at),
                wt.phase,
                wt.recur,
            ],
        )?;
    }
    delete_missing(
        conn,
        "work_type",
        "work_type",
        worksite_id,
        w.work_types.iter().map(|wt| wt.work_type.as_str()),
    )?;

    for flag in &w.flags {
        conn.execute(
            "INSERT INTO worksite_flag (
                network_id, worksite_id, reason_t, is_high_priority, notes,
                requested_action, created_at_us
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (worksite_id, reason_t) DO UPDATE SET
                network_id = excluded.network_id,
                is_high_priority = excluded.is_high_priority,
                notes = excluded.notes,
                requested_action = excluded.requested_action",
            params![
                flag.network_id,
                worksite_id,
                flag.reason_t,
                flag.is_high_priority,
                flag.notes,
                flag.requested_action,
                to_us(flag.created_at),
            ],
        )?;
    }
    delete_missing(
        conn,
        "worksite_flag",
        "reason_t",
        worksite_id,
        w.flags.iter().map(|f| f.reason_t.as_str()),
    )?;

    if from_network {
        // Mirrored notes are replaced; locally written ones (unsynced
        // network id) stay until the pusher reports them.
        conn.execute(
            "DELETE FROM worksite_note WHERE worksite_id = ?1 AND network_id != ?2",
            params![worksite_id, UNSYNCED_NETWORK_ID],
        )?;
        for note in &w.notes {
            insert_note(conn, worksite_id, note)?;
        }
    } else {
        for note in w.notes.iter().filter(|n| n.id == 0) {
            insert_note(conn, worksite_id, note)?;
        }
    }

    if from_network {
        // Files mirror the backend's attachment set; local saves never
        // change it, so pruning only applies to network writes.
        delete_missing(
            conn,
            "network_file",
            "file_id",
            worksite_id,
            w.files.iter().map(|f| f.file_id),
        )?;
    }
    for file in &w.files {
        conn.execute(
            "INSERT INTO network_file (
                worksite_id, file_id, url, full_url, mime_content_type, tag,
                title, created_at_us
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (worksite_id, file_id) DO UPDATE SET
                url = excluded.url,
                full_url = excluded.full_url,
                mime_content_type = excluded.mime_content_type,
                tag = excluded.tag,
                title = excluded.title",
            params![
                worksite_id,
                file.file_id,
                file.url,
                file.full_url,
                file.mime_content_type,
                file.tag,
                file.title,
                to_us_opt(file.created_at),
            ],
        )?;
    }

    conn.execute(
        "DELETE FROM worksite_form_data WHERE worksite_id = ?1",
        params![worksite_id],
    )?;
    for (key, value) in &w.form_data {
        conn.execute(
            "INSERT INTO worksite_form_data
                (worksite_id, field_key, value_string, is_bool, value_bool)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![worksite_id, key, value.value_string, value.is_bool, value.value_bool],
        )?;
    }

    Ok(())
}

fn insert_note(conn: &Connection, worksite_id: i64, note: &WorksiteNote) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO worksite_note (network_id, worksite_id, created_at_us, is_survivor, note)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            note.network_id,
            worksite_id,
            to_us(note.created_at),
            note.is_survivor,
            note.note,
        ],
    )?;
    Ok(())
}

fn delete_missing<T: rusqlite::types::ToSql>(
    conn: &Connection,
    table: &str,
    key_column: &str,
    worksite_id: i64,
    keep: impl Iterator<Item = T>,
) -> Result<(), StoreError> {
    let keep: Vec<T> = keep.collect();
    if keep.is_empty() {
        conn.execute(
            &format!("DELETE FROM {table} WHERE worksite_id = ?1"),
            params![worksite_id],
        )?;
        return Ok(());
    }
    let placeholders: Vec<String> = (0..keep.len()).map(|i| format!("?{}", i + 2)).collect();
    let sql = format!(
        "DELETE FROM {table} WHERE worksite_id = ?1 AND {key_column} NOT IN ({})",
        placeholders.join(", ")
    );
    let mut params_vec: Vec<&dyn rusqlite::types::ToSql> = vec![&worksite_id];
    for value in &keep {
        params_vec.push(value);
    }
    conn.execute(&sql, params_from_iter(params_vec))?;
    Ok(())
}

/// Loads a worksite with all sub-entities, or `None`.
///
/// # Errors
///
/// Returns a database error.
pub fn get_worksite(conn: &Connection, id: i64) -> Result<Option<Worksite>, StoreError> {
    let root = conn
        .query_row(
            "SELECT id, network_id, incident_id, address, case_number, city,
                    county, state, postal_code, latitude, longitude, name,
                    phone1, phone2, email, key_work_type, reported_by, svi,
                    created_at_us, updated_at_us, is_local_favorite
             FROM worksite WHERE id = ?1",
            params![id],
            row_to_worksite,
        )
        .optional()?;
    let Some((mut worksite, key_literal)) = root else {
        return Ok(None);
    };

    worksite.work_types = load_work_types(conn, id)?;
    worksite.key_work_type = key_literal
        .and_then(|k| worksite.work_types.iter().find(|wt| wt.work_type == k).cloned());
    worksite.flags = load_flags(conn, id)?;
    worksite.notes = load_notes(conn, id)?;
    worksite.files = load_files(conn, id)?;
    worksite.form_data = load_form_data(conn, id)?;
    Ok(Some(worksite))
}

/// Resolves a local id from a backend id, for synced rows.
///
/// # Errors
///
/// Returns a database error.
pub fn local_id_for_network_id(
    conn: &Connection,
    network_id: i64,
) -> Result<Option<i64>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id FROM worksite WHERE network_id = ?1 AND local_global_uuid = ''",
            params![network_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Records a successful push: the row takes its backend id, sheds the
/// local-modified shield, and rejoins the paged-write path.
///
/// # Errors
///
/// Returns a database error.
pub fn mark_synced(
    conn: &Connection,
    id: i64,
    network_id: i64,
    synced_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE worksite SET
            network_id = ?2, local_global_uuid = '', is_local_modified = 0,
            synced_at_us = ?3, sync_attempt = 0
         WHERE id = ?1",
        params![id, network_id, to_us(synced_at)],
    )?;
    Ok(())
}

/// Bumps the push-attempt counter after a failed push.
///
/// # Errors
///
/// Returns a database error.
pub fn increment_sync_attempt(conn: &Connection, id: i64) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE worksite SET sync_attempt = sync_attempt + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// # Errors
///
/// Returns a database error.
pub fn count_worksites(conn: &Connection, incident_id: i64) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM worksite WHERE incident_id = ?1",
        params![incident_id],
        |row| row.get(0),
    )?)
}

/// A worksite reduced to what the map dot renderer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMark {
    pub id: i64,
    pub network_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub key_work_type: Option<String>,
    pub is_high_priority: bool,
    pub is_local_modified: bool,
}

/// Bounding-box map query, filtered and ordered by distance from `center`.
///
/// The box comparison happens in SQL against the coordinate index; the
/// distance sort happens here because SQLite has no haversine.
///
/// # Errors
///
/// Returns a database error.
pub fn query_map_marks(
    conn: &Connection,
    incident_id: i64,
    bounds: &LatLngBounds,
    center: crate::geo::LatLng,
    filter: &super::WorksiteFilter,
    limit: usize,
) -> Result<Vec<MapMark>, StoreError> {
    let mut conditions = vec![
        "w.incident_id = ?1".to_string(),
        "w.latitude BETWEEN ?2 AND ?3".to_string(),
        "w.longitude BETWEEN ?4 AND ?5".to_string(),
    ];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
        Box::new(incident_id),
        Box::new(bounds.south),
        Box::new(bounds.north),
        Box::new(bounds.west),
        Box::new(bounds.east),
    ];
    filter.apply(&mut conditions, &mut params_vec);

    let sql = format!(
        "SELECT w.id, w.network_id, w.latitude, w.longitude, w.key_work_type,
                w.is_local_modified,
                EXISTS (SELECT 1 FROM worksite_flag wf
                        WHERE wf.worksite_id = w.id AND wf.is_high_priority = 1)
         FROM worksite w
         WHERE {}",
        conditions.join(" AND ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(AsRef::as_ref).collect();
    let rows = stmt.query_map(params_from_iter(params_ref), |row| {
        Ok(MapMark {
            id: row.get(0)?,
            network_id: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            key_work_type: row.get(4)?,
            is_local_modified: row.get(5)?,
            is_high_priority: row.get(6)?,
        })
    })?;

    let mut marks = Vec::new();
    for row in rows {
        marks.push(row?);
    }
    marks.sort_by(|a, b| {
        let da = haversine_radians(center, crate::geo::LatLng::new(a.latitude, a.longitude));
        let db = haversine_radians(center, crate::geo::LatLng::new(b.latitude, b.longitude));
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    marks.truncate(limit);
    Ok(marks)
}

type RootRow = (Worksite, Option<String>);

#[allow(clippy::many_single_char_names)]
fn row_to_worksite(row: &rusqlite::Row<'_>) -> rusqlite::Result<RootRow> {
    let mut w = Worksite::new(row.get(2)?);
    w.id = row.get(0)?;
    w.network_id = row.get(1)?;
    w.address = row.get(3)?;
    w.case_number = row.get(4)?;
    w.city = row.get(5)?;
    w.county = row.get(6)?;
    w.state = row.get(7)?;
    w.postal_code = row.get(8)?;
    w.latitude = row.get(9)?;
    w.longitude = row.get(10)?;
    w.name = row.get(11)?;
    w.phone1 = row.get(12)?;
    w.phone2 = row.get(13)?;
    w.email = row.get(14)?;
    let key_literal: Option<String> = row.get(15)?;
    w.reported_by = row.get(16)?;
    w.svi = row.get(17)?;
    w.created_at = from_us_opt(row.get(18)?);
    w.updated_at = from_us_opt(row.get(19)?);
    w.is_local_favorite = row.get(20)?;
    Ok((w, key_literal))
}

/// Ordered by id ascending, which is insertion order. The reconciler relies
/// on that ordering.
fn load_work_types(conn: &Connection, worksite_id: i64) -> Result<Vec<WorkType>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, network_id, work_type, status, org_claim, created_at_us,
                next_recur_at_us, phase, recur
         FROM work_type WHERE worksite_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![worksite_id], |row| {
        Ok(WorkType {
            id: row.get(0)?,
            network_id: row.get(1)?,
            work_type: row.get(2)?,
            status: row.get(3)?,
            org_claim: row.get(4)?,
            created_at: from_us_opt(row.get(5)?),
            next_recur_at: from_us_opt(row.get(6)?),
            phase: row.get(7)?,
            recur: row.get(8)?,
        })
    })?;
    rows.collect::<rusqlite::Result<_>>().map_err(StoreError::Db)
}

fn load_flags(conn: &Connection, worksite_id: i64) -> Result<Vec<WorksiteFlag>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, network_id, reason_t, is_high_priority, notes,
                requested_action, created_at_us
         FROM worksite_flag WHERE worksite_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![worksite_id], |row| {
        Ok(WorksiteFlag {
            id: row.get(0)?,
            network_id: row.get(1)?,
            reason_t: row.get(2)?,
            is_high_priority: row.get(3)?,
            notes: row.get(4)?,
            requested_action: row.get(5)?,
            created_at: from_us(row.get(6)?),
        })
    })?;
    rows.collect::<rusqlite::Result<_>>().map_err(StoreError::Db)
}

fn load_notes(conn: &Connection, worksite_id: i64) -> Result<Vec<WorksiteNote>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, network_id, created_at_us, is_survivor, note
         FROM worksite_note WHERE worksite_id = ?1 ORDER BY created_at_us DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![worksite_id], |row| {
        Ok(WorksiteNote {
            id: row.get(0)?,
            network_id: row.get(1)?,
            created_at: from_us(row.get(2)?),
            is_survivor: row.get(3)?,
            note: row.get(4)?,
        })
    })?;
    rows.collect::<rusqlite::Result<_>>().map_err(StoreError::Db)
}

fn load_files(conn: &Connection, worksite_id: i64) -> Result<Vec<NetworkFile>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, file_id, url, full_url, mime_content_type, tag, title, created_at_us
         FROM network_file WHERE worksite_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![worksite_id], |row| {
        Ok(NetworkFile {
            id: row.get(0)?,
            file_id: row.get(1)?,
            url: row.get(2)?,
            full_url: row.get(3)?,
            mime_content_type: row.get(4)?,
            tag: row.get(5)?,
            title: row.get(6)?,
            created_at: from_us_opt(row.get(7)?),
        })
    })?;
    rows.collect::<rusqlite::Result<_>>().map_err(StoreError::Db)
}

fn load_form_data(
    conn: &Connection,
    worksite_id: i64,
) -> Result<std::collections::BTreeMap<String, FormValue>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT field_key, value_string, is_bool, value_bool
         FROM worksite_form_data WHERE worksite_id = ?1",
    )?;
    let rows = stmt.query_map(params![worksite_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            FormValue {
                value_string: row.get(1)?,
                is_bool: row.get(2)?,
                value_bool: row.get(3)?,
            },
        ))
    })?;
    rows.collect::<rusqlite::Result<_>>().map_err(StoreError::Db)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::store;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 9, 10, 8, 0, 0).single().unwrap()
    }

    fn seeded_conn() -> Connection {
        let conn = store::open_in_memory().expect("open");
        conn.execute("INSERT INTO incident (id, name) VALUES (1, 'storm')", [])
            .expect("incident");
        conn
    }

    fn network_worksite(network_id: i64) -> Worksite {
        let mut w = Worksite::new(1);
        w.network_id = network_id;
        w.address = format!("{network_id} Main St");
        w.latitude = 30.0 + network_id as f64 * 0.01;
        w.longitude = -99.0;
        let mut wt = WorkType::new("debris", now());
        wt.network_id = network_id * 10;
        w.work_types = vec![wt];
        w.flags = vec![WorksiteFlag::high_priority(now())];
        w
    }

    #[test]
    fn page_upsert_is_idempotent() {
        let conn = seeded_conn();
        let page: Vec<Worksite> = (1..=3).map(network_worksite).collect();
        let cancel = CancellationToken::new();

        let first = upsert_worksites_page(&conn, &page, now(), 500, &cancel).expect("first");
        let second = upsert_worksites_page(&conn, &page, now(), 500, &cancel).expect("second");
        assert_eq!(first.saved, 3);
        assert_eq!(second.saved, 3);

        let worksites: i64 = conn
            .query_row("SELECT COUNT(*) FROM worksite", [], |r| r.get(0))
            .expect("count");
        let work_types: i64 = conn
            .query_row("SELECT COUNT(*) FROM work_type", [], |r| r.get(0))
            .expect("count");
        let flags: i64 = conn
            .query_row("SELECT COUNT(*) FROM worksite_flag", [], |r| r.get(0))
            .expect("count");
        assert_eq!(worksites, 3);
        assert_eq!(work_types, 3, "no duplicate work types");
        assert_eq!(flags, 3, "no duplicate flags");
    }

    fn attachment(file_id: i64) -> NetworkFile {
        NetworkFile {
            id: 0,
            file_id,
            url: format!("https://files.example/{file_id}"),
            full_url: None,
            mime_content_type: "image/jpeg".to_string(),
            tag: None,
            title: None,
            created_at: Some(now()),
        }
    }

    #[test]
    fn network_write_prunes_files_dropped_by_the_backend() {
        let conn = seeded_conn();
        let cancel = CancellationToken::new();
        let mut w = network_worksite(7);
        w.files = vec![attachment(501), attachment(502)];
        upsert_worksites_page(&conn, &[w.clone()], now(), 500, &cancel).expect("seed");

        // The backend deleted one attachment.
        w.files = vec![attachment(501)];
        upsert_worksites_page(&conn, &[w], now(), 500, &cancel).expect("page");

        let id = local_id_for_network_id(&conn, 7).expect("lookup").expect("row");
        let loaded = get_worksite(&conn, id).expect("get").expect("row");
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files[0].file_id, 501);
    }

    #[test]
    fn local_save_leaves_mirrored_files_alone() {
        let conn = seeded_conn();
        let cancel = CancellationToken::new();
        let mut w = network_worksite(7);
        w.files = vec![attachment(501), attachment(502)];
        upsert_worksites_page(&conn, &[w], now(), 500, &cancel).expect("seed");

        let id = local_id_for_network_id(&conn, 7).expect("lookup").expect("row");
        let mut edited = get_worksite(&conn, id).expect("get").expect("row");
        edited.address = "edited locally".to_string();
        edited.files.clear();
        save_local_worksite(&conn, &edited, "uuid-1", now()).expect("save");

        let kept = get_worksite(&conn, id).expect("get").expect("row");
        assert_eq!(kept.files.len(), 2, "edit path never touches attachments");
    }

    #[test]
    fn locally_modified_row_survives_page_write() {
        let conn = seeded_conn();
        let cancel = CancellationToken::new();
        upsert_worksites_page(&conn, &[network_worksite(7)], now(), 500, &cancel)
            .expect("seed");

        // Local edit changes the address and shields the row.
        let id = local_id_for_network_id(&conn, 7).expect("lookup").expect("row");
        let mut edited = get_worksite(&conn, id).expect("get").expect("row");
        edited.address = "edited locally".to_string();
        save_local_worksite(&conn, &edited, "uuid-1", now()).expect("save");

        // A later page carries the stale server address.
        let stats = upsert_worksites_page(&conn, &[network_worksite(7)], now(), 500, &cancel)
            .expect("page");
        assert_eq!(stats.skipped_locally_modified, 1);
        assert_eq!(stats.saved, 0);

        let kept = get_worksite(&conn, id).expect("get").expect("row");
        assert_eq!(kept.address, "edited locally");
    }

    #[test]
    fn page_write_resumes_after_push_clears_the_shield() {
        let conn = seeded_conn();
        let cancel = CancellationToken::new();
        upsert_worksites_page(&conn, &[network_worksite(7)], now(), 500, &cancel)
            .expect("seed");
        let id = local_id_for_network_id(&conn, 7).expect("lookup").expect("row");

        let mut edited = get_worksite(&conn, id).expect("get").expect("row");
        edited.address = "edited locally".to_string();
        save_local_worksite(&conn, &edited, "uuid-1", now()).expect("save");
        mark_synced(&conn, id, 7, now()).expect("mark synced");

        upsert_worksites_page(&conn, &[network_worksite(7)], now(), 500, &cancel)
            .expect("page");
        let after = get_worksite(&conn, id).expect("get").expect("row");
        assert_eq!(after.address, "7 Main St", "network wins once synced");
    }

    #[test]
    fn new_local_worksite_round_trips() {
        let conn = seeded_conn();
        let mut w = Worksite::new(1);
        w.address = "12 Elm".to_string();
        w.form_data
            .insert("debris".to_string(), FormValue::flag(true));
        w.work_types = vec![WorkType::new("debris", now())];
        w.notes = vec![WorksiteNote::new("roof gone", now())];

        let id = save_local_worksite(&conn, &w, "uuid-9", now()).expect("save");
        assert!(id > 0);

        let loaded = get_worksite(&conn, id).expect("get").expect("row");
        assert_eq!(loaded.address, "12 Elm");
        assert_eq!(loaded.network_id, UNSYNCED_NETWORK_ID);
        assert!(loaded.is_local_only());
        assert_eq!(loaded.work_types.len(), 1);
        assert_eq!(loaded.notes.len(), 1);
        assert!(loaded.form_data["debris"].is_true());
    }

    #[test]
    fn two_local_worksites_do_not_collide_on_unique_index() {
        let conn = seeded_conn();
        let a = save_local_worksite(&conn, &Worksite::new(1), "uuid-a", now()).expect("a");
        let b = save_local_worksite(&conn, &Worksite::new(1), "uuid-b", now()).expect("b");
        assert_ne!(a, b);
    }

    #[test]
    fn dropped_work_type_is_deleted_on_save() {
        let conn = seeded_conn();
        let mut w = Worksite::new(1);
        w.work_types = vec![WorkType::new("debris", now()), WorkType::new("tarp", now())];
        let id = save_local_worksite(&conn, &w, "uuid-1", now()).expect("save");

        let mut loaded = get_worksite(&conn, id).expect("get").expect("row");
        loaded.work_types.retain(|wt| wt.work_type == "tarp");
        save_local_worksite(&conn, &loaded, "uuid-2", now()).expect("save");

        let after = get_worksite(&conn, id).expect("get").expect("row");
        assert_eq!(after.work_types.len(), 1);
        assert_eq!(after.work_types[0].work_type, "tarp");
    }

    #[test]
    fn key_work_type_resolves_from_literal() {
        let conn = seeded_conn();
        let mut w = network_worksite(3);
        w.key_work_type = Some(w.work_types[0].clone());
        let cancel = CancellationToken::new();
        upsert_worksites_page(&conn, &[w], now(), 500, &cancel).expect("page");

        let id = local_id_for_network_id(&conn, 3).expect("lookup").expect("row");
        let loaded = get_worksite(&conn, id).expect("get").expect("row");
        assert_eq!(
            loaded.key_work_type.map(|wt| wt.work_type),
            Some("debris".to_string())
        );
    }

    #[test]
    fn map_query_orders_by_distance_and_honors_filter() {
        let conn = seeded_conn();
        let cancel = CancellationToken::new();
        let page: Vec<Worksite> = (1..=5).map(network_worksite).collect();
        upsert_worksites_page(&conn, &page, now(), 500, &cancel).expect("page");

        let bounds = LatLngBounds::new(29.0, -100.0, 32.0, -98.0);
        let center = crate::geo::LatLng::new(30.05, -99.0);
        let marks = query_map_marks(
            &conn,
            1,
            &bounds,
            center,
            &store::WorksiteFilter::default(),
            10,
        )
        .expect("query");
        assert_eq!(marks.len(), 5);
        // network id 5 sits at latitude 30.05, nearest to the center.
        assert_eq!(marks[0].network_id, 5);
        assert!(marks[0].is_high_priority);

        let filtered = query_map_marks(
            &conn,
            1,
            &bounds,
            center,
            &store::WorksiteFilter {
                statuses: vec!["closed_completed".to_string()],
                ..store::WorksiteFilter::default()
            },
            10,
        )
        .expect("query");
        assert!(filtered.is_empty(), "no worksite has a closed work type");
    }

    #[test]
    fn cancellation_between_batches_stops_the_upsert() {
        let conn = seeded_conn();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = upsert_worksites_page(&conn, &[network_worksite(1)], now(), 500, &cancel)
            .expect_err("cancelled");
        assert!(matches!(err, StoreError::Cancelled));
    }
}
