//! Resumable paginated pull of incident data.
//!
//! One invocation is a state machine: decide the target count (full, resume,
//! or delta), fetch missing pages into the on-disk cache, then commit cached
//! pages to the store strictly in page order. Interruption at any point
//! leaves a contiguous committed prefix recorded in the stats row and the
//! fetched pages on disk, so the next invocation picks up where this one
//! stopped instead of re-downloading.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::model::{Incident, Worksite};
use crate::net::NetworkDataSource;
use crate::observe::ObservedValue;
use crate::progress::DataProgress;
use crate::store::{self, SharedConnection};
use crate::sync::page_cache::PageCache;

/// How one pull pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another pass for the same resource and incident is in flight; this
    /// call did nothing.
    AlreadySyncing,
    /// Some pages committed, but not all; the next pass resumes from the
    /// cache.
    Partial {
        paged_count: i64,
        target_count: i64,
    },
    /// Every record committed; the stats row is marked successful and the
    /// incident's cache files are gone.
    Completed { paged_count: i64 },
}

/// How the pass addresses the backend, decided from the stats row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullPlan {
    Full,
    Resume {
        target_count: i64,
        paged_count: i64,
        /// Watermark the interrupted pass was counted against; the resume
        /// must fetch with the same one or its target count means nothing.
        updated_after: Option<chrono::DateTime<chrono::Utc>>,
    },
    Delta {
        updated_after: chrono::DateTime<chrono::Utc>,
    },
}

/// Pulls worksites (and organizations, and the form schema) for incidents.
///
/// One puller serves many incidents; a per-(resource, incident) in-flight
/// flag makes concurrent calls for the same pair a no-op.
pub struct IncidentWorksitePuller {
    db: SharedConnection,
    network: Arc<dyn NetworkDataSource>,
    cache: PageCache,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    progress: ObservedValue<DataProgress>,
    in_flight: Arc<Mutex<HashSet<(&'static str, i64)>>>,
}

struct InFlightGuard {
    flags: Arc<Mutex<HashSet<(&'static str, i64)>>>,
    key: (&'static str, i64),
}

impl InFlightGuard {
    fn acquire(
        flags: &Arc<Mutex<HashSet<(&'static str, i64)>>>,
        key: (&'static str, i64),
    ) -> Option<Self> {
        let mut held = match flags.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !held.insert(key) {
            return None;
        }
        Some(Self {
            flags: Arc::clone(flags),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut held = match self.flags.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        held.remove(&self.key);
    }
}

impl IncidentWorksitePuller {
    #[must_use]
    pub fn new(
        db: SharedConnection,
        network: Arc<dyn NetworkDataSource>,
        cache: PageCache,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            network,
            cache,
            clock,
            config,
            progress: ObservedValue::new(DataProgress::default()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Progress of the current (or last) worksite pass; subscribe for
    /// updates as the fetch and commit loops advance.
    #[must_use]
    pub fn progress(&self) -> ObservedValue<DataProgress> {
        self.progress.clone()
    }

    /// Runs one worksite pull pass for an incident.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] on cancellation, or a store, cache,
    /// or count-request failure. A mid-pass network failure is not an error:
    /// the pass commits what it has and reports [`SyncOutcome::Partial`].
    pub fn sync_worksites(
        &self,
        incident_id: i64,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, ("worksites", incident_id))
        else {
            debug!(incident_id, "worksite sync already in flight");
            return Ok(SyncOutcome::AlreadySyncing);
        };

        self.progress.set(DataProgress::started());
        let result = self.pull_worksites(incident_id, cancel);
        // Terminal value on every exit path, error and cancellation included.
        self.progress.set(self.progress.get().ended());
        result
    }

    fn pull_worksites(
        &self,
        incident_id: i64,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let sync_start = self.clock.now();
        let plan = {
            let conn = store::lock(&self.db);
            ensure_incident_row(&conn, incident_id)?;
            store::sync_log::append(
                &conn,
                sync_start,
                "pull_start",
                "worksite pull pass",
                &format!("incident {incident_id}"),
                None,
            )?;
            plan_for(store::stats::get_sync_stats(&conn, incident_id)?.as_ref())
        };

        let (target_count, updated_after, committed_count) = match plan {
            PullPlan::Full => {
                let count = self
                    .network
                    .get_worksites_count(incident_id, None)
                    .context("count worksites for full pull")?;
                let conn = store::lock(&self.db);
                store::stats::begin_sync(
                    &conn,
                    incident_id,
                    sync_start,
                    count,
                    None,
                    self.config.app_build_version_code,
                )?;
                (count, None, 0)
            }
            PullPlan::Resume {
                target_count,
                paged_count,
                updated_after,
            } => {
                let conn = store::lock(&self.db);
                store::stats::record_attempt(&conn, incident_id, sync_start)?;
                debug!(incident_id, target_count, paged_count, "resuming partial pull");
                (target_count, updated_after, paged_count)
            }
            PullPlan::Delta { updated_after } => {
                let count = self
                    .network
                    .get_worksites_count(incident_id, Some(updated_after))
                    .context("count worksites for delta pull")?;
                let conn = store::lock(&self.db);
                store::stats::begin_sync(
                    &conn,
                    incident_id,
                    sync_start,
                    count,
                    Some(updated_after),
                    self.config.app_build_version_code,
                )?;
                debug!(incident_id, count, "delta pull since last success");
                (count, Some(updated_after), 0)
            }
        };

        let mut progress = DataProgress::started().with_data_count(target_count);
        self.progress.set(progress);

        let page_size = self.config.worksites_page_size.max(1);
        let page_total = (target_count + page_size - 1) / page_size;
        // Pages before this one were committed by the interrupted pass;
        // neither loop revisits them.
        let start_page = (committed_count / page_size).min(page_total);

        // Fetch loop: fill cache holes. A network failure stops fetching but
        // the pages already on disk still get committed below.
        let mut fetched_records: i64 = start_page * page_size;
        for page_index in start_page..page_total {
            cancel.err_if_cancelled()?;
            let now = self.clock.now();
            if self
                .cache
                .has_valid_page(incident_id, page_index, target_count, now)
            {
                fetched_records = (fetched_records + page_size).min(target_count);
                progress = progress.with_query_count(fetched_records);
                self.progress.set(progress);
                continue;
            }

            let offset = page_index * page_size;
            match self
                .network
                .get_worksites_page(incident_id, page_size, offset, updated_after)
            {
                Ok(page) => {
                    self.cache
                        .write_page(incident_id, page_index, offset, &page, now)?;
                    fetched_records += page.results.len() as i64;
                    progress = progress.with_query_count(fetched_records);
                    self.progress.set(progress);
                }
                Err(err) => {
                    warn!(incident_id, page_index, error = %err, "page fetch failed");
                    let conn = store::lock(&self.db);
                    store::sync_log::append(
                        &conn,
                        self.clock.now(),
                        "fetch_error",
                        "page fetch failed",
                        &format!("incident {incident_id} page {page_index}: {err}"),
                        None,
                    )?;
                    break;
                }
            }
        }

        // Commit loop: cached pages in ascending page order only, so the
        // paged count always covers a contiguous prefix.
        let mut paged_count: i64 = start_page * page_size;
        for page_index in start_page..page_total {
            cancel.err_if_cancelled()?;
            let now = self.clock.now();
            let Some(page) = self
                .cache
                .read_page(incident_id, page_index, target_count, now)
            else {
                debug!(
                    incident_id,
                    page_index, "insufficient cached data, halting commit"
                );
                break;
            };

            let worksites: Vec<Worksite> = page
                .results
                .iter()
                .map(crate::net::NetworkWorksite::to_worksite)
                .collect();
            let conn = store::lock(&self.db);
            let stats = store::worksite::upsert_worksites_page(
                &conn,
                &worksites,
                now,
                self.config.effective_batch_size(),
                cancel,
            )
            .map_err(SyncError::from)?;
            paged_count += worksites.len() as i64;
            store::stats::update_paged_count(&conn, incident_id, paged_count)?;
            drop(conn);

            debug!(
                incident_id,
                page_index,
                saved = stats.saved,
                skipped = stats.skipped_locally_modified,
                "page committed"
            );
            progress = progress.with_saved_count(paged_count);
            self.progress.set(progress);
        }

        if paged_count >= target_count {
            let completed_at = self.clock.now();
            let conn = store::lock(&self.db);
            store::stats::mark_successful(&conn, incident_id, completed_at)?;
            store::sync_log::append(
                &conn,
                completed_at,
                "pull_complete",
                "worksite pull pass complete",
                &format!("incident {incident_id}: {paged_count} records"),
                None,
            )?;
            drop(conn);
            // Evict only after a fully committed pass; partial runs keep
            // their pages for resume.
            self.cache.delete_incident_pages(incident_id)?;
            info!(incident_id, paged_count, "worksite pull complete");
            Ok(SyncOutcome::Completed { paged_count })
        } else {
            let conn = store::lock(&self.db);
            store::sync_log::append(
                &conn,
                self.clock.now(),
                "pull_partial",
                "worksite pull pass partial",
                &format!("incident {incident_id}: {paged_count} of {target_count}"),
                None,
            )?;
            drop(conn);
            info!(incident_id, paged_count, target_count, "worksite pull partial");
            Ok(SyncOutcome::Partial {
                paged_count,
                target_count,
            })
        }
    }

    /// Pulls every organization page for an incident straight into the
    /// store; organization pages are small enough to skip the disk cache.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] on cancellation, or a network or
    /// store failure; organization pulls have no partial mode.
    pub fn sync_organizations(
        &self,
        incident_id: i64,
        cancel: &CancellationToken,
    ) -> Result<usize, SyncError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, ("organizations", incident_id))
        else {
            debug!(incident_id, "organization sync already in flight");
            return Ok(0);
        };

        let page_size = self.config.organizations_page_size.max(1);
        let mut offset: i64 = 0;
        let mut saved: usize = 0;
        loop {
            cancel.err_if_cancelled()?;
            let page = self
                .network
                .get_organizations_page(incident_id, page_size, offset)
                .context("fetch organizations page")?;
            if page.results.is_empty() {
                break;
            }
            offset += page.results.len() as i64;
            saved += page.results.len();
            let conn = store::lock(&self.db);
            store::incident::upsert_organizations(&conn, &page.results)?;
            drop(conn);
            if offset >= page.count {
                break;
            }
        }
        debug!(incident_id, saved, "organizations pulled");
        Ok(saved)
    }

    /// Fetches and persists the incident's form schema, which the work-type
    /// reconciler's lookups are built from.
    ///
    /// # Errors
    ///
    /// Returns a network or store failure.
    pub fn pull_form_fields(&self, incident_id: i64) -> Result<usize, SyncError> {
        let fields = self
            .network
            .get_incident_form_fields(incident_id)
            .context("fetch incident form fields")?;
        let conn = store::lock(&self.db);
        ensure_incident_row(&conn, incident_id)?;
        store::incident::replace_form_fields(&conn, incident_id, &fields)?;
        Ok(fields.len())
    }
}

/// Worksite rows have a foreign key to the incident; pulling data for an
/// incident not yet stored gets a placeholder row.
fn ensure_incident_row(
    conn: &rusqlite::Connection,
    incident_id: i64,
) -> Result<(), crate::store::StoreError> {
    if store::incident::get_incident(conn, incident_id)?.is_none() {
        store::incident::upsert_incident(conn, &Incident::placeholder(incident_id))?;
    }
    Ok(())
}

fn plan_for(stats: Option<&store::stats::IncidentDataSyncStats>) -> PullPlan {
    match stats {
        Some(stats) if stats.is_resumable() => PullPlan::Resume {
            target_count: stats.target_count,
            paged_count: stats.paged_count,
            updated_after: stats.delta_after,
        },
        Some(stats) => stats
            .delta_watermark()
            .map_or(PullPlan::Full, |updated_after| PullPlan::Delta {
                updated_after,
            }),
        None => PullPlan::Full,
    }
}
