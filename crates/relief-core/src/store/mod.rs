//! SQLite store for incidents, worksites, and sync bookkeeping.
//!
//! Runtime defaults are deliberately conservative:
//! - `journal_mode = WAL` so readers keep working while a sync pass writes
//! - `busy_timeout = 5s` to ride out transient lock contention
//! - `foreign_keys = ON` so cascade deletes keep sub-entities consistent
//!
//! Store functions take a `&Connection`; components that share a store hold
//! a [`SharedConnection`] and lock it per call through [`lock`].

pub mod filter;
pub mod incident;
pub mod journal;
pub mod migrations;
pub mod schema;
pub mod stats;
pub mod sync_log;
pub mod worksite;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

pub use filter::WorksiteFilter;

/// Busy timeout applied to every store connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A store connection shared between components; locked per operation.
pub type SharedConnection = Arc<Mutex<Connection>>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Cooperative cancellation observed between write batches.
    #[error("store operation cancelled")]
    Cancelled,

    #[error("store: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("store serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Opens (or creates) the store, applies pragmas, and migrates.
///
/// # Errors
///
/// Returns an error if opening, configuring, or migrating fails.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store {}", path.display()))?;
    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;
    Ok(conn)
}

/// In-memory store with the full schema, for tests.
///
/// # Errors
///
/// Returns an error if configuring or migrating fails.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Locks a shared connection, recovering from poisoning: SQLite state is
/// consistent at statement granularity regardless of a panicked writer.
pub fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    match conn.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn to_us(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn to_us_opt(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(to_us)
}

pub(crate) fn from_us(us: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(us).unwrap_or_default()
}

pub(crate) fn from_us_opt(us: Option<i64>) -> Option<DateTime<Utc>> {
    us.map(from_us)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("relief.db");
        (dir, path)
    }

    #[test]
    fn open_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let conn = open(&path).expect("open store");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(u128::from(busy_timeout_ms), DEFAULT_BUSY_TIMEOUT.as_millis());

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn open_runs_migrations() {
        let (_dir, path) = temp_db_path();
        let conn = open(&path).expect("open store");
        let version = migrations::current_schema_version(&conn).expect("version");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn timestamp_round_trip_is_microsecond_exact() {
        let now = from_us(1_695_000_000_123_456);
        assert_eq!(from_us(to_us(now)), now);
        assert_eq!(to_us_opt(None), None);
        assert_eq!(from_us_opt(Some(0)), Some(DateTime::UNIX_EPOCH));
    }
}
