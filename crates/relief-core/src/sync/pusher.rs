//! Uploads journaled local changes, one change at a time.
//!
//! The pusher walks unarchived journal rows oldest first. Within one
//! worksite the rows form an ordered replay; a failed push abandons the rest
//! of that worksite's queue for this pass so changes are never applied out
//! of order. Rows that have exhausted their push attempts are skipped and
//! left pending for operator attention.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::journal::{ARCHIVE_SYNCED, WorksiteChange};
use crate::net::NetworkError;
use crate::store::{self, SharedConnection};

/// Uploads one journaled change; the concrete REST client lives in the
/// embedding app.
pub trait ChangePushApi: Send + Sync {
    /// Pushes a change and returns the backend's worksite id.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] when the upload fails; the row stays
    /// pending and its attempt counter is bumped.
    fn push_change(&self, change: &WorksiteChange) -> Result<i64, NetworkError>;
}

/// Outcome of one push pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushStats {
    pub pushed: usize,
    pub failed: usize,
    /// Rows left alone: attempts exhausted, or queued behind a failed row
    /// for the same worksite.
    pub skipped: usize,
}

pub struct ChangePusher {
    db: SharedConnection,
    api: Arc<dyn ChangePushApi>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl ChangePusher {
    #[must_use]
    pub fn new(
        db: SharedConnection,
        api: Arc<dyn ChangePushApi>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            api,
            clock,
            config,
        }
    }

    /// Pushes every pending journal row, oldest first per worksite.
    ///
    /// A failure for one worksite skips its remaining rows but keeps going
    /// with other worksites. Cancellation unwinds immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] on cancellation or a store error on
    /// bookkeeping failure. Push failures are bookkeeping, not errors.
    pub fn push_pending(&self, cancel: &CancellationToken) -> Result<PushStats, SyncError> {
        let pending = {
            let conn = store::lock(&self.db);
            store::journal::pending_changes(&conn).map_err(SyncError::from)?
        };
        debug!(pending = pending.len(), "starting push pass");

        let mut stats = PushStats::default();
        let mut halted_worksites: HashSet<i64> = HashSet::new();

        for change in &pending {
            cancel.err_if_cancelled()?;

            if halted_worksites.contains(&change.worksite_id) {
                stats.skipped += 1;
                continue;
            }
            if change.save_attempt >= self.config.max_push_attempts {
                debug!(
                    change_id = change.id,
                    worksite_id = change.worksite_id,
                    attempts = change.save_attempt,
                    "push attempts exhausted, skipping"
                );
                stats.skipped += 1;
                continue;
            }

            match self.api.push_change(change) {
                Ok(network_id) => {
                    let conn = store::lock(&self.db);
                    let now = self.clock.now();
                    store::journal::archive_change(&conn, change.id, ARCHIVE_SYNCED)
                        .map_err(SyncError::from)?;
                    store::worksite::mark_synced(&conn, change.worksite_id, network_id, now)
                        .map_err(SyncError::from)?;
                    stats.pushed += 1;
                }
                Err(err) => {
                    warn!(
                        change_id = change.id,
                        worksite_id = change.worksite_id,
                        error = %err,
                        "change push failed"
                    );
                    let conn = store::lock(&self.db);
                    let now = self.clock.now();
                    store::journal::record_save_attempt(&conn, change.id, now)
                        .map_err(SyncError::from)?;
                    store::worksite::increment_sync_attempt(&conn, change.worksite_id)
                        .map_err(SyncError::from)?;
                    halted_worksites.insert(change.worksite_id);
                    stats.failed += 1;
                }
            }
        }

        debug!(
            pushed = stats.pushed,
            failed = stats.failed,
            skipped = stats.skipped,
            "push pass finished"
        );
        Ok(stats)
    }
}

/// In-memory push API for tests and simulation: records pushed changes,
/// hands out sequential network ids, and can be scripted to fail.
#[derive(Default)]
pub struct InMemoryPushApi {
    inner: std::sync::Mutex<PushApiState>,
}

#[derive(Default)]
struct PushApiState {
    pushed: Vec<WorksiteChange>,
    next_network_id: i64,
    failures_remaining: usize,
}

impl InMemoryPushApi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(PushApiState {
                pushed: Vec::new(),
                next_network_id: 1000,
                failures_remaining: 0,
            }),
        }
    }

    /// The next `count` pushes fail before succeeding again.
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_remaining = count;
    }

    #[must_use]
    pub fn pushed(&self) -> Vec<WorksiteChange> {
        self.lock().pushed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PushApiState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ChangePushApi for InMemoryPushApi {
    fn push_change(&self, change: &WorksiteChange) -> Result<i64, NetworkError> {
        let mut state = self.lock();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(NetworkError::Transport("push rejected".to_string()));
        }
        state.pushed.push(change.clone());
        let id = state.next_network_id;
        state.next_network_id += 1;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};

    use crate::clock::ManualClock;
    use crate::journal::ChangeData;
    use crate::model::Worksite;
    use crate::store::journal::{append_change, pending_changes};
    use crate::store::worksite::save_local_worksite;

    fn setup() -> (SharedConnection, Arc<ManualClock>, SyncConfig) {
        let conn = store::open_in_memory().expect("store");
        {
            store::incident::upsert_incident(&conn, &crate::model::Incident::placeholder(1))
                .expect("incident");
        }
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        ));
        (Arc::new(Mutex::new(conn)), clock, SyncConfig::default())
    }

    fn journaled_edit(db: &SharedConnection, clock: &ManualClock) -> i64 {
        let conn = store::lock(db);
        let now = clock.now();
        let mut w = Worksite::new(1);
        w.address = "12 Oak".to_string();
        let id = save_local_worksite(&conn, &w, "uuid-1", now).expect("save");
        w.id = id;
        let data = ChangeData {
            start: None,
            change: w,
        };
        append_change(&conn, id, "uuid-1", 50, 3, &data, now).expect("journal");
        id
    }

    #[test]
    fn successful_push_archives_and_marks_synced() {
        let (db, clock, config) = setup();
        let worksite_id = journaled_edit(&db, &clock);

        let api = Arc::new(InMemoryPushApi::new());
        let pusher = ChangePusher::new(Arc::clone(&db), api.clone(), clock, config);
        let stats = pusher
            .push_pending(&CancellationToken::new())
            .expect("push");

        assert_eq!(stats.pushed, 1);
        assert_eq!(stats.failed, 0);

        let conn = store::lock(&db);
        assert!(pending_changes(&conn).expect("pending").is_empty());
        let worksite = store::worksite::get_worksite(&conn, worksite_id)
            .expect("get")
            .expect("row");
        assert_eq!(worksite.network_id, 1000);
        assert!(!worksite.is_local_only());
    }

    #[test]
    fn failed_push_bumps_attempt_and_keeps_row_pending() {
        let (db, clock, config) = setup();
        journaled_edit(&db, &clock);

        let api = Arc::new(InMemoryPushApi::new());
        api.fail_next(1);
        let pusher = ChangePusher::new(Arc::clone(&db), api, clock, config);
        let stats = pusher
            .push_pending(&CancellationToken::new())
            .expect("push");

        assert_eq!(stats.failed, 1);
        let conn = store::lock(&db);
        let pending = pending_changes(&conn).expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].save_attempt, 1);
        assert!(pending[0].save_attempt_at.is_some());
    }

    #[test]
    fn failure_halts_that_worksite_but_not_others() {
        let (db, clock, config) = setup();
        let first = journaled_edit(&db, &clock);
        {
            // Second change for the first worksite, plus another worksite.
            let conn = store::lock(&db);
            let now = clock.now();
            let mut w = store::worksite::get_worksite(&conn, first)
                .expect("get")
                .expect("row");
            w.address = "14 Oak".to_string();
            let data = ChangeData {
                start: None,
                change: w,
            };
            append_change(&conn, first, "uuid-2", 50, 3, &data, now).expect("journal");

            let mut other = Worksite::new(1);
            other.address = "90 Pine".to_string();
            let other_id = save_local_worksite(&conn, &other, "uuid-3", now).expect("save");
            other.id = other_id;
            let data = ChangeData {
                start: None,
                change: other,
            };
            append_change(&conn, other_id, "uuid-3", 50, 3, &data, now).expect("journal");
        }

        let api = Arc::new(InMemoryPushApi::new());
        api.fail_next(1);
        let pusher = ChangePusher::new(Arc::clone(&db), api.clone(), clock, config);
        let stats = pusher
            .push_pending(&CancellationToken::new())
            .expect("push");

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1, "second change for failed worksite held");
        assert_eq!(stats.pushed, 1, "other worksite still pushed");
    }

    #[test]
    fn exhausted_attempts_are_skipped() {
        let (db, clock, mut config) = setup();
        config.max_push_attempts = 2;
        journaled_edit(&db, &clock);
        {
            let conn = store::lock(&db);
            let pending = pending_changes(&conn).expect("pending");
            for _ in 0..2 {
                store::journal::record_save_attempt(&conn, pending[0].id, clock.now())
                    .expect("attempt");
            }
        }

        let api = Arc::new(InMemoryPushApi::new());
        let pusher = ChangePusher::new(Arc::clone(&db), api.clone(), clock, config);
        let stats = pusher
            .push_pending(&CancellationToken::new())
            .expect("push");

        assert_eq!(stats.skipped, 1);
        assert!(api.pushed().is_empty());
    }

    #[test]
    fn cancellation_unwinds_immediately() {
        let (db, clock, config) = setup();
        journaled_edit(&db, &clock);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let pusher = ChangePusher::new(db, Arc::new(InMemoryPushApi::new()), clock, config);
        assert!(matches!(
            pusher.push_pending(&cancel),
            Err(SyncError::Cancelled)
        ));
    }
}
