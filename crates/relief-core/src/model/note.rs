//! Worksite notes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{UNSAVED_LOCAL_ID, UNSYNCED_NETWORK_ID};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksiteNote {
    pub id: i64,
    pub network_id: i64,
    pub created_at: DateTime<Utc>,
    /// Written by the survivor rather than a relief worker.
    pub is_survivor: bool,
    pub note: String,
}

impl WorksiteNote {
    #[must_use]
    pub fn new(note: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: UNSAVED_LOCAL_ID,
            network_id: UNSYNCED_NETWORK_ID,
            created_at,
            is_survivor: false,
            note: note.into(),
        }
    }
}
