//! The change journal: before/after snapshots of local edits.
//!
//! Every committed local edit appends one [`WorksiteChange`] whose payload
//! is a serialized [`ChangeData`]: the worksite as it was when editing began
//! and the worksite as saved, each with its work types. The pair is the unit
//! the push syncer replays against the backend, and it is deliberately a
//! full snapshot rather than a structural diff so journal rows written by an
//! older app version still deserialize.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Worksite;

/// Archive action recorded after a change was pushed successfully.
pub const ARCHIVE_SYNCED: &str = "synced";

/// Archive action recorded when a later change made this one irrelevant.
pub const ARCHIVE_SUPERSEDED: &str = "superseded";

/// The serialized payload of one journal row.
///
/// `start` is `None` when the edit created the worksite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeData {
    pub start: Option<Worksite>,
    pub change: Worksite,
}

impl ChangeData {
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be serialized.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// # Errors
    ///
    /// Returns an error when `json` is not a valid snapshot pair.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub const fn is_creation(&self) -> bool {
        self.start.is_none()
    }
}

/// One append-only journal row.
#[derive(Debug, Clone, PartialEq)]
pub struct WorksiteChange {
    pub id: i64,
    pub worksite_id: i64,
    pub sync_uuid: String,
    pub organization_id: i64,
    pub app_version: i64,
    pub created_at: DateTime<Utc>,
    pub data: ChangeData,
    pub save_attempt: i64,
    pub save_attempt_at: Option<DateTime<Utc>>,
    /// `None` while pending; [`ARCHIVE_SYNCED`] or [`ARCHIVE_SUPERSEDED`]
    /// once retired.
    pub archive_action: Option<String>,
}

impl WorksiteChange {
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archive_action.is_some()
    }
}

/// Claim and close deltas per work-type literal, folded from journal rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClaimCloseCounts {
    pub claimed: i64,
    pub closed: i64,
}

/// Folds an organization's journal rows into per-literal claim/close counts.
///
/// A claim is counted when a change snapshot shows a work type claimed by
/// `organization_id` that the start snapshot did not; a close is counted
/// when a work type transitions into a `closed_*` status. Derived entirely
/// from journal rows so the numbers survive later edits to live state.
#[must_use]
pub fn fold_claim_close(
    changes: &[WorksiteChange],
    organization_id: i64,
) -> BTreeMap<String, ClaimCloseCounts> {
    let mut counts: BTreeMap<String, ClaimCloseCounts> = BTreeMap::new();
    for change in changes {
        let start_types: BTreeMap<&str, _> = change
            .data
            .start
            .as_ref()
            .map(|w| {
                w.work_types
                    .iter()
                    .map(|wt| (wt.work_type.as_str(), wt))
                    .collect()
            })
            .unwrap_or_default();

        for wt in &change.data.change.work_types {
            let before = start_types.get(wt.work_type.as_str());
            let newly_claimed = wt.org_claim == Some(organization_id)
                && before.is_none_or(|b| b.org_claim != Some(organization_id));
            let newly_closed = wt.is_closed() && before.is_none_or(|b| !b.is_closed());
            if !newly_claimed && !newly_closed {
                continue;
            }
            let entry = counts.entry(wt.work_type.clone()).or_default();
            if newly_claimed {
                entry.claimed += 1;
            }
            if newly_closed {
                entry.closed += 1;
            }
        }
    }
    counts
}
