//! Sync-level error taxonomy.
//!
//! Cancellation is a distinguished variant, not a failure: callers unwind on
//! it without logging an error, and the progress channel still receives its
//! terminal value.

use thiserror::Error;

use crate::store::StoreError;
use crate::sync::page_cache::PageCacheError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Cooperative cancellation requested through a
    /// [`CancellationToken`](crate::cancel::CancellationToken).
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(StoreError),

    #[error("page cache: {0}")]
    Cache(#[from] PageCacheError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => Self::Cancelled,
            other => Self::Store(other),
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Db(err))
    }
}
