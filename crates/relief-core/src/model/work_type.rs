//! Work types: the claim/status lifecycle units of a worksite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{UNSAVED_LOCAL_ID, UNSYNCED_NETWORK_ID};

/// Default status for newly created work.
pub const STATUS_OPEN_UNASSIGNED: &str = "open_unassigned";

/// Terminal status for completed work.
pub const STATUS_CLOSED_COMPLETED: &str = "closed_completed";

/// One categorized unit of work on a worksite (e.g. "debris", "tarp").
///
/// At most one work type per `(worksite, work_type literal)` survives
/// reconciliation; see [`crate::reconcile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkType {
    pub id: i64,
    pub network_id: i64,
    /// Taxonomy literal, the reconciliation key.
    pub work_type: String,
    pub status: String,
    /// Claiming organization, `None` while unclaimed.
    pub org_claim: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub next_recur_at: Option<DateTime<Utc>>,
    pub phase: Option<i64>,
    pub recur: Option<String>,
}

impl WorkType {
    /// A not-yet-persisted work type with the default open status.
    #[must_use]
    pub fn new(work_type: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: UNSAVED_LOCAL_ID,
            network_id: UNSYNCED_NETWORK_ID,
            work_type: work_type.into(),
            status: STATUS_OPEN_UNASSIGNED.to_string(),
            org_claim: None,
            created_at: Some(created_at),
            next_recur_at: None,
            phase: None,
            recur: None,
        }
    }

    #[must_use]
    pub const fn is_claimed(&self) -> bool {
        self.org_claim.is_some()
    }

    /// Status literals use an `open_*` / `closed_*` prefix convention.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status.starts_with("closed")
    }
}
