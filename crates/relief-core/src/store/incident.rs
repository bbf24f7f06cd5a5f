//! Incident, form-field, and organization persistence.

use rusqlite::{Connection, OptionalExtension, params};

use crate::model::{Incident, IncidentFormField};
use crate::net::NetworkOrganization;

use super::{StoreError, from_us_opt, to_us_opt};

/// # Errors
///
/// Returns a database error.
pub fn upsert_incident(conn: &Connection, incident: &Incident) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO incident (
            id, name, short_name, incident_type, start_at_us,
            active_phone_number, is_archived
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (id) DO UPDATE SET
            name = excluded.name,
            short_name = excluded.short_name,
            incident_type = excluded.incident_type,
            start_at_us = excluded.start_at_us,
            active_phone_number = excluded.active_phone_number,
            is_archived = excluded.is_archived",
        params![
            incident.id,
            incident.name,
            incident.short_name,
            incident.incident_type,
            to_us_opt(incident.start_at),
            incident.active_phone_number,
            incident.is_archived,
        ],
    )?;
    Ok(())
}

/// # Errors
///
/// Returns a database error.
pub fn get_incident(conn: &Connection, id: i64) -> Result<Option<Incident>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, name, short_name, incident_type, start_at_us,
                    active_phone_number, is_archived
             FROM incident WHERE id = ?1",
            params![id],
            |row| {
                Ok(Incident {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    short_name: row.get(2)?,
                    incident_type: row.get(3)?,
                    start_at: from_us_opt(row.get(4)?),
                    active_phone_number: row.get(5)?,
                    is_archived: row.get(6)?,
                })
            },
        )
        .optional()?)
}

/// Replaces an incident's form schema in one transaction. The schema is
/// fetched whole, so a partial update is never meaningful.
///
/// # Errors
///
/// Returns a database or serialization error; the transaction rolls back.
pub fn replace_form_fields(
    conn: &Connection,
    incident_id: i64,
    fields: &[IncidentFormField],
) -> Result<(), StoreError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> Result<(), StoreError> {
        conn.execute(
            "DELETE FROM incident_form_field WHERE incident_id = ?1",
            params![incident_id],
        )?;
        for field in fields {
            conn.execute(
                "INSERT INTO incident_form_field (
                    incident_id, parent_key, field_key, label, html_type,
                    data_group, help_t, list_order, is_required, is_read_only,
                    is_read_only_break_glass, is_frequency, options_json,
                    value_default
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    incident_id,
                    field.parent_key,
                    field.field_key,
                    field.label,
                    field.html_type,
                    field.data_group,
                    field.help_t,
                    field.list_order,
                    field.is_required,
                    field.is_read_only,
                    field.is_read_only_break_glass,
                    field.is_frequency,
                    serde_json::to_string(&field.options)?,
                    field.value_default,
                ],
            )?;
        }
        Ok(())
    })();
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(err)
        }
    }
}

/// Form fields ordered by list order, then key for a stable tie-break.
///
/// # Errors
///
/// Returns a database or deserialization error.
pub fn get_form_fields(
    conn: &Connection,
    incident_id: i64,
) -> Result<Vec<IncidentFormField>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT parent_key, field_key, label, html_type, data_group, help_t,
                list_order, is_required, is_read_only, is_read_only_break_glass,
                is_frequency, options_json, value_default
         FROM incident_form_field
         WHERE incident_id = ?1
         ORDER BY list_order, field_key",
    )?;
    let rows = stmt.query_map(params![incident_id], |row| {
        Ok((
            IncidentFormField {
                parent_key: row.get(0)?,
                field_key: row.get(1)?,
                label: row.get(2)?,
                html_type: row.get(3)?,
                data_group: row.get(4)?,
                help_t: row.get(5)?,
                list_order: row.get(6)?,
                is_required: row.get(7)?,
                is_read_only: row.get(8)?,
                is_read_only_break_glass: row.get(9)?,
                is_frequency: row.get(10)?,
                options: std::collections::BTreeMap::new(),
                value_default: row.get(12)?,
            },
            row.get::<_, String>(11)?,
        ))
    })?;

    let mut fields = Vec::new();
    for row in rows {
        let (mut field, options_json) = row?;
        field.options = serde_json::from_str(&options_json)?;
        fields.push(field);
    }
    Ok(fields)
}

/// Organization pages commit directly, no disk cache in between.
///
/// # Errors
///
/// Returns a database error; the transaction rolls back.
pub fn upsert_organizations(
    conn: &Connection,
    organizations: &[NetworkOrganization],
) -> Result<(), StoreError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> Result<(), StoreError> {
        for org in organizations {
            conn.execute(
                "INSERT INTO organization (id, name, is_active)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name,
                    is_active = excluded.is_active",
                params![org.id, org.name, org.is_active],
            )?;
        }
        Ok(())
    })();
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(err)
        }
    }
}

/// # Errors
///
/// Returns a database error.
pub fn count_organizations(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM organization", [], |row| row.get(0))?)
}
