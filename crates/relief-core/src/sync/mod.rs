//! Sync engine: resumable paginated pull and journaled push.
//!
//! [`IncidentWorksitePuller`] drives the pull state machine over the
//! [`PageCache`]; [`ChangePusher`] drains the local change journal. Both are
//! cancellable through [`crate::cancel::CancellationToken`] and report
//! through [`crate::error::SyncError`].

pub mod page_cache;
pub mod puller;
pub mod pusher;

pub use page_cache::{PageCache, PageCacheError};
pub use puller::{IncidentWorksitePuller, SyncOutcome};
pub use pusher::{ChangePushApi, ChangePusher, InMemoryPushApi, PushStats};
