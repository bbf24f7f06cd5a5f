//! Incidents and their dynamic form schema.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Backend id; incidents are never created locally.
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub incident_type: String,
    pub start_at: Option<DateTime<Utc>>,
    pub active_phone_number: Option<String>,
    pub is_archived: bool,
}

impl Incident {
    /// Placeholder row for an incident known only by id, e.g. when worksite
    /// pages arrive before the incident metadata has been fetched.
    #[must_use]
    pub fn placeholder(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            short_name: String::new(),
            incident_type: String::new(),
            start_at: None,
            active_phone_number: None,
            is_archived: false,
        }
    }
}

/// One node of an incident's intake-form tree, keyed by
/// `(parent_key, field_key)`. Fields whose parent is the work-type group
/// drive work-type reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentFormField {
    pub field_key: String,
    /// Empty for top-level groups.
    pub parent_key: String,
    pub label: String,
    pub html_type: String,
    pub data_group: String,
    pub help_t: Option<String>,
    pub list_order: i64,
    pub is_required: bool,
    pub is_read_only: bool,
    /// Editable only through an explicit break-glass confirmation in the UI.
    pub is_read_only_break_glass: bool,
    /// Marks a recurrence selector; its string value becomes the owning
    /// work type's `recur` schedule.
    pub is_frequency: bool,
    /// Selectable options, option key to label translation key.
    pub options: BTreeMap<String, String>,
    pub value_default: Option<String>,
}

impl IncidentFormField {
    #[must_use]
    pub fn new(field_key: impl Into<String>, parent_key: impl Into<String>) -> Self {
        Self {
            field_key: field_key.into(),
            parent_key: parent_key.into(),
            label: String::new(),
            html_type: String::new(),
            data_group: String::new(),
            help_t: None,
            list_order: 0,
            is_required: false,
            is_read_only: false,
            is_read_only_break_glass: false,
            is_frequency: false,
            options: BTreeMap::new(),
            value_default: None,
        }
    }
}
