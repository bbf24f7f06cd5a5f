//! Work-type reconciliation.
//!
//! Whenever a worksite's form data changes, the set of work types must be
//! recomputed: checked work-group fields become work types, unchecked ones
//! are dropped, and rows that survive keep their identity so claims and
//! work-type requests stay attached. [`reconcile_work_types`] is a pure
//! function of its inputs; the repository calls it before persisting.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::model::incident::IncidentFormField;
use crate::model::work_type::STATUS_OPEN_UNASSIGNED;
use crate::model::{FormValue, WorkType};

/// Parent key of the form group whose boolean fields denote work types.
pub const WORK_FORM_GROUP_KEY: &str = "work_info";

/// Form-schema-derived lookups the reconciler needs.
///
/// Built once per incident from its form fields and reused across edits.
#[derive(Debug, Clone, Default)]
pub struct WorkTypeLookups {
    /// Form field key to work-type literal, for fields in the work group.
    pub work_type_for_field: BTreeMap<String, String>,
    /// Field key to its schema node; gives parent keys and frequency flags.
    pub form_fields: BTreeMap<String, IncidentFormField>,
    /// Work-type literal to its default status.
    pub default_statuses: BTreeMap<String, String>,
}

impl WorkTypeLookups {
    /// Derives lookups from an incident's form schema. Work-group field keys
    /// double as work-type literals, the backend's convention for intake
    /// forms.
    #[must_use]
    pub fn from_form_fields(fields: &[IncidentFormField]) -> Self {
        let mut lookups = Self::default();
        for field in fields {
            if field.parent_key == WORK_FORM_GROUP_KEY {
                lookups
                    .work_type_for_field
                    .insert(field.field_key.clone(), field.field_key.clone());
            }
            lookups
                .form_fields
                .insert(field.field_key.clone(), field.clone());
        }
        lookups
    }
}

/// Computes a worksite's new work-type list from its form data.
///
/// - Boolean-true fields under [`WORK_FORM_GROUP_KEY`] form the desired set.
/// - Existing work types matching a desired literal are carried forward,
///   keeping their ids and claims; their status is replaced when
///   `status_overrides` or the default-status lookup names one.
/// - Existing work types absent from the desired set are dropped unless
///   their literal is in `ignored_literals`.
/// - Duplicate literals among `existing` collapse to the row with the
///   greatest id; the others are discarded outright, not merged.
/// - Kept rows preserve the old list's order of first literal occurrence;
///   newly created rows append sorted by literal.
#[must_use]
pub fn reconcile_work_types(
    form_data: &BTreeMap<String, FormValue>,
    existing: &[WorkType],
    lookups: &WorkTypeLookups,
    status_overrides: &BTreeMap<String, String>,
    ignored_literals: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> Vec<WorkType> {
    let desired = desired_literals(form_data, lookups);
    let recur_by_literal = recur_values(form_data, lookups);

    // Highest id wins among duplicate literals; on equal ids the later row
    // (insertion order) wins.
    let mut authoritative: HashMap<&str, &WorkType> = HashMap::new();
    for wt in existing {
        match authoritative.get(wt.work_type.as_str()) {
            Some(current) if current.id > wt.id => {}
            _ => {
                authoritative.insert(wt.work_type.as_str(), wt);
            }
        }
    }

    let mut next = Vec::with_capacity(desired.len());
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for wt in existing {
        let literal = wt.work_type.as_str();
        if !seen.insert(literal) {
            continue;
        }
        let auth = authoritative[literal];
        if desired.contains(literal) {
            let mut kept = auth.clone();
            if let Some(status) = status_overrides
                .get(literal)
                .or_else(|| lookups.default_statuses.get(literal))
            {
                kept.status.clone_from(status);
            }
            let recur = recur_by_literal.get(literal).cloned();
            if kept.recur != recur {
                kept.next_recur_at = None;
            }
            kept.recur = recur;
            next.push(kept);
        } else if ignored_literals.contains(literal) {
            // Explicitly excluded from reconciliation; carried untouched.
            next.push(auth.clone());
        }
    }

    for literal in &desired {
        if seen.contains(literal.as_str()) {
            continue;
        }
        let mut created = WorkType::new(literal.clone(), now);
        created.status = status_overrides
            .get(literal)
            .or_else(|| lookups.default_statuses.get(literal))
            .cloned()
            .unwrap_or_else(|| STATUS_OPEN_UNASSIGNED.to_string());
        created.recur = recur_by_literal.get(literal).cloned();
        next.push(created);
    }

    next
}

fn desired_literals(
    form_data: &BTreeMap<String, FormValue>,
    lookups: &WorkTypeLookups,
) -> BTreeSet<String> {
    let mut desired = BTreeSet::new();
    for (key, value) in form_data {
        if !value.is_true() {
            continue;
        }
        let Some(field) = lookups.form_fields.get(key) else {
            continue;
        };
        if field.parent_key != WORK_FORM_GROUP_KEY {
            continue;
        }
        if let Some(literal) = lookups.work_type_for_field.get(key) {
            desired.insert(literal.clone());
        }
    }
    desired
}

/// Frequency fields hang off a work-group field; their string value becomes
/// that work type's recurrence schedule.
fn recur_values(
    form_data: &BTreeMap<String, FormValue>,
    lookups: &WorkTypeLookups,
) -> BTreeMap<String, String> {
    let mut recur = BTreeMap::new();
    for (key, value) in form_data {
        let Some(field) = lookups.form_fields.get(key) else {
            continue;
        };
        if !field.is_frequency || value.is_bool || value.value_string.is_empty() {
            continue;
        }
        if let Some(literal) = lookups.work_type_for_field.get(&field.parent_key) {
            recur.insert(literal.clone(), value.value_string.clone());
        }
    }
    recur
}
