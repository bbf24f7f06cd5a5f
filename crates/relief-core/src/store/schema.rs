//! Canonical SQLite schema for the offline worksite store.
//!
//! Normalized for queryability and cascade hygiene:
//! - `worksite` keeps root fields plus sync bookkeeping for each case
//! - sub-entity tables (`work_type`, `worksite_flag`, `worksite_note`,
//!   `worksite_form_data`, `network_file`) hang off it with cascade deletes
//! - `worksite_change` is the append-only journal consumed by the pusher
//! - `incident_sync_stats` drives full-versus-delta pull decisions
//!
//! Timestamps are i64 microseconds since epoch (`*_us` columns), converted
//! to `chrono` values at the row boundary.

/// Migration v1: core tables.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS incident (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    short_name TEXT NOT NULL DEFAULT '',
    incident_type TEXT NOT NULL DEFAULT '',
    start_at_us INTEGER,
    active_phone_number TEXT,
    is_archived INTEGER NOT NULL DEFAULT 0 CHECK (is_archived IN (0, 1))
);

CREATE TABLE IF NOT EXISTS incident_form_field (
    incident_id INTEGER NOT NULL REFERENCES incident(id) ON DELETE CASCADE,
    parent_key TEXT NOT NULL DEFAULT '',
    field_key TEXT NOT NULL CHECK (length(field_key) > 0),
    label TEXT NOT NULL DEFAULT '',
    html_type TEXT NOT NULL DEFAULT '',
    data_group TEXT NOT NULL DEFAULT '',
    help_t TEXT,
    list_order INTEGER NOT NULL DEFAULT 0,
    is_required INTEGER NOT NULL DEFAULT 0,
    is_read_only INTEGER NOT NULL DEFAULT 0,
    is_read_only_break_glass INTEGER NOT NULL DEFAULT 0,
    is_frequency INTEGER NOT NULL DEFAULT 0,
    options_json TEXT NOT NULL DEFAULT '{}',
    value_default TEXT,
    PRIMARY KEY (incident_id, parent_key, field_key)
);

CREATE TABLE IF NOT EXISTS organization (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS worksite (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network_id INTEGER NOT NULL DEFAULT -1,
    local_global_uuid TEXT NOT NULL DEFAULT '',
    incident_id INTEGER NOT NULL REFERENCES incident(id) ON DELETE CASCADE,
    address TEXT NOT NULL DEFAULT '',
    case_number TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT '',
    county TEXT NOT NULL DEFAULT '',
    state TEXT NOT NULL DEFAULT '',
    postal_code TEXT NOT NULL DEFAULT '',
    latitude REAL NOT NULL DEFAULT 0,
    longitude REAL NOT NULL DEFAULT 0,
    name TEXT NOT NULL DEFAULT '',
    phone1 TEXT NOT NULL DEFAULT '',
    phone2 TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    key_work_type TEXT,
    reported_by INTEGER,
    svi REAL,
    created_at_us INTEGER,
    updated_at_us INTEGER,
    is_local_favorite INTEGER NOT NULL DEFAULT 0,
    sync_uuid TEXT NOT NULL DEFAULT '',
    is_local_modified INTEGER NOT NULL DEFAULT 0 CHECK (is_local_modified IN (0, 1)),
    local_modified_at_us INTEGER NOT NULL DEFAULT 0,
    synced_at_us INTEGER NOT NULL DEFAULT 0,
    sync_attempt INTEGER NOT NULL DEFAULT 0,
    UNIQUE (network_id, local_global_uuid)
);

CREATE TABLE IF NOT EXISTS work_type (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network_id INTEGER NOT NULL DEFAULT -1,
    worksite_id INTEGER NOT NULL REFERENCES worksite(id) ON DELETE CASCADE,
    work_type TEXT NOT NULL CHECK (length(work_type) > 0),
    status TEXT NOT NULL DEFAULT '',
    org_claim INTEGER,
    created_at_us INTEGER,
    next_recur_at_us INTEGER,
    phase INTEGER,
    recur TEXT,
    UNIQUE (worksite_id, work_type)
);

CREATE TABLE IF NOT EXISTS worksite_flag (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network_id INTEGER NOT NULL DEFAULT -1,
    worksite_id INTEGER NOT NULL REFERENCES worksite(id) ON DELETE CASCADE,
    reason_t TEXT NOT NULL CHECK (length(reason_t) > 0),
    is_high_priority INTEGER NOT NULL DEFAULT 0,
    notes TEXT,
    requested_action TEXT,
    created_at_us INTEGER NOT NULL,
    UNIQUE (worksite_id, reason_t)
);

CREATE TABLE IF NOT EXISTS worksite_note (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network_id INTEGER NOT NULL DEFAULT -1,
    worksite_id INTEGER NOT NULL REFERENCES worksite(id) ON DELETE CASCADE,
    created_at_us INTEGER NOT NULL,
    is_survivor INTEGER NOT NULL DEFAULT 0,
    note TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS worksite_form_data (
    worksite_id INTEGER NOT NULL REFERENCES worksite(id) ON DELETE CASCADE,
    field_key TEXT NOT NULL CHECK (length(field_key) > 0),
    value_string TEXT NOT NULL DEFAULT '',
    is_bool INTEGER NOT NULL DEFAULT 0,
    value_bool INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (worksite_id, field_key)
);

CREATE TABLE IF NOT EXISTS network_file (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    worksite_id INTEGER NOT NULL REFERENCES worksite(id) ON DELETE CASCADE,
    file_id INTEGER NOT NULL,
    url TEXT NOT NULL DEFAULT '',
    full_url TEXT,
    mime_content_type TEXT NOT NULL DEFAULT '',
    tag TEXT,
    title TEXT,
    created_at_us INTEGER,
    UNIQUE (worksite_id, file_id)
);

CREATE TABLE IF NOT EXISTS worksite_change (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    worksite_id INTEGER NOT NULL REFERENCES worksite(id) ON DELETE CASCADE,
    sync_uuid TEXT NOT NULL,
    organization_id INTEGER NOT NULL,
    app_version INTEGER NOT NULL DEFAULT 0,
    created_at_us INTEGER NOT NULL,
    change_data TEXT NOT NULL,
    save_attempt INTEGER NOT NULL DEFAULT 0,
    save_attempt_at_us INTEGER,
    archive_action TEXT
);

CREATE TABLE IF NOT EXISTS incident_sync_stats (
    incident_id INTEGER PRIMARY KEY REFERENCES incident(id) ON DELETE CASCADE,
    sync_start_us INTEGER NOT NULL,
    target_count INTEGER NOT NULL DEFAULT 0,
    paged_count INTEGER NOT NULL DEFAULT 0,
    successful_sync_us INTEGER,
    attempted_sync_us INTEGER NOT NULL DEFAULT 0,
    attempted_counter INTEGER NOT NULL DEFAULT 0,
    app_build_version_code INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_at_us INTEGER NOT NULL,
    log_type TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT '',
    details TEXT NOT NULL DEFAULT '',
    worksite_id INTEGER
);
";

/// Migration v2: read-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_worksite_incident_coords
    ON worksite(incident_id, latitude, longitude);

CREATE INDEX IF NOT EXISTS idx_worksite_incident_network
    ON worksite(incident_id, network_id);

CREATE INDEX IF NOT EXISTS idx_worksite_local_modified
    ON worksite(is_local_modified, incident_id);

CREATE INDEX IF NOT EXISTS idx_worksite_incident_updated
    ON worksite(incident_id, updated_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_work_type_worksite
    ON work_type(worksite_id, id);

CREATE INDEX IF NOT EXISTS idx_worksite_flag_worksite
    ON worksite_flag(worksite_id);

CREATE INDEX IF NOT EXISTS idx_worksite_note_worksite_created
    ON worksite_note(worksite_id, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_worksite_change_pending
    ON worksite_change(worksite_id, created_at_us)
    WHERE archive_action IS NULL;

CREATE INDEX IF NOT EXISTS idx_worksite_change_org
    ON worksite_change(organization_id, created_at_us);

CREATE INDEX IF NOT EXISTS idx_sync_log_at
    ON sync_log(log_at_us DESC);
";

/// Migration v3: `updated_after` watermark of the in-progress pass, so a
/// resumed delta pull re-fetches against the same watermark.
pub const MIGRATION_V3_SQL: &str = r"
ALTER TABLE incident_sync_stats ADD COLUMN delta_after_us INTEGER;
";

/// Index names the query paths depend on; asserted by migration tests.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_worksite_incident_coords",
    "idx_worksite_incident_network",
    "idx_worksite_local_modified",
    "idx_worksite_incident_updated",
    "idx_work_type_worksite",
    "idx_worksite_flag_worksite",
    "idx_worksite_note_worksite_created",
    "idx_worksite_change_pending",
    "idx_worksite_change_org",
    "idx_sync_log_at",
];
