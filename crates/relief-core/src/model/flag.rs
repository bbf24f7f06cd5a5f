//! Worksite flags: boolean concerns keyed by a translatable reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{UNSAVED_LOCAL_ID, UNSYNCED_NETWORK_ID};

pub const REASON_HIGH_PRIORITY: &str = "flag.worksite_high_priority";
pub const REASON_WRONG_LOCATION: &str = "flag.worksite_wrong_location";
pub const REASON_DUPLICATE: &str = "flag.duplicate";
pub const REASON_MARK_FOR_DELETION: &str = "flag.worksite_mark_for_deletion";

/// At most one flag per `reason_t` exists on a worksite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksiteFlag {
    pub id: i64,
    pub network_id: i64,
    pub reason_t: String,
    pub is_high_priority: bool,
    pub notes: Option<String>,
    pub requested_action: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorksiteFlag {
    #[must_use]
    pub fn new(reason_t: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let reason_t = reason_t.into();
        Self {
            id: UNSAVED_LOCAL_ID,
            network_id: UNSYNCED_NETWORK_ID,
            is_high_priority: reason_t == REASON_HIGH_PRIORITY,
            reason_t,
            notes: None,
            requested_action: None,
            created_at,
        }
    }

    #[must_use]
    pub fn high_priority(created_at: DateTime<Utc>) -> Self {
        Self::new(REASON_HIGH_PRIORITY, created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_priority_reason_sets_the_bit() {
        let now = Utc::now();
        assert!(WorksiteFlag::high_priority(now).is_high_priority);
        assert!(!WorksiteFlag::new(REASON_DUPLICATE, now).is_high_priority);
    }
}
