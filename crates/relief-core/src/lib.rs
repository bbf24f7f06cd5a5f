//! Offline-first core for disaster case-management clients.
//!
//! What lives here:
//!
//! - [`store`] — the SQLite source of truth: worksites with their
//!   sub-entities, incidents, sync stats, the change journal's rows, and an
//!   operational sync log.
//! - [`journal`] — before/after snapshots of local edits, the unit the push
//!   syncer uploads.
//! - [`reconcile`] — pure work-type reconciliation from dynamic form data.
//! - [`sync`] — the resumable paginated puller, its on-disk page cache, and
//!   the push bookkeeping loop.
//! - [`repository`] — the local-edit entry point tying the three above
//!   together.
//! - [`geo`] — coordinate math, incident bounds, and the map-tile cache.
//! - [`net`] — the network trait boundary with an in-memory fake.
//!
//! Ambient pieces: [`cancel`] for cooperative cancellation, [`clock`] for
//! injectable time, [`observe`]/[`progress`] for sync progress reporting,
//! [`config`] for tunables, [`error`] for the sync error taxonomy.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums at module boundaries, `anyhow::Result`
//!   with `.context(...)` at orchestration seams.
//! - **Logging**: `tracing` macros; cancellation is never logged as an
//!   error.
//! - **Time**: all "now" values come from a [`clock::Clock`], never
//!   `Utc::now()` in library paths.

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod geo;
pub mod journal;
pub mod model;
pub mod net;
pub mod observe;
pub mod progress;
pub mod reconcile;
pub mod repository;
pub mod store;
pub mod sync;

pub use cancel::CancellationToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use error::SyncError;
pub use model::{Incident, WorkType, Worksite};
pub use repository::WorksiteRepository;
pub use store::SharedConnection;
pub use sync::{ChangePusher, IncidentWorksitePuller, PageCache, SyncOutcome};
