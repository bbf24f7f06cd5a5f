//! Property tests for work-type reconciliation: determinism, literal-set
//! correctness, deduplication, and ordering.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use relief_core::model::incident::IncidentFormField;
use relief_core::model::{FormValue, WorkType};
use relief_core::reconcile::{WORK_FORM_GROUP_KEY, WorkTypeLookups, reconcile_work_types};

const LITERALS: [&str; 5] = ["debris", "mold", "muck_out", "tarp", "trees"];

fn lookups() -> WorkTypeLookups {
    let fields: Vec<IncidentFormField> = LITERALS
        .iter()
        .map(|key| IncidentFormField::new(*key, WORK_FORM_GROUP_KEY))
        .collect();
    WorkTypeLookups::from_form_fields(&fields)
}

fn form_data(checked: &[bool; 5]) -> BTreeMap<String, FormValue> {
    LITERALS
        .iter()
        .zip(checked)
        .map(|(key, &on)| ((*key).to_string(), FormValue::flag(on)))
        .collect()
}

/// Existing rows with ids unique by construction, so the highest-id rule is
/// unambiguous.
fn existing_rows(picks: &[usize]) -> Vec<WorkType> {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    picks
        .iter()
        .enumerate()
        .map(|(row, &pick)| {
            let mut wt = WorkType::new(LITERALS[pick % LITERALS.len()], now);
            wt.id = (row as i64) + 1;
            wt
        })
        .collect()
}

fn run(
    checked: &[bool; 5],
    existing: &[WorkType],
    ignored: &BTreeSet<String>,
) -> Vec<WorkType> {
    let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    reconcile_work_types(
        &form_data(checked),
        existing,
        &lookups(),
        &BTreeMap::new(),
        ignored,
        now,
    )
}

fn checked_set(checked: &[bool; 5]) -> BTreeSet<String> {
    LITERALS
        .iter()
        .zip(checked)
        .filter(|&(_, &on)| on)
        .map(|(key, _)| (*key).to_string())
        .collect()
}

proptest! {
    #[test]
    fn deterministic(
        checked in proptest::array::uniform5(any::<bool>()),
        picks in proptest::collection::vec(0usize..5, 0..8),
    ) {
        let existing = existing_rows(&picks);
        let first = run(&checked, &existing, &BTreeSet::new());
        let second = run(&checked, &existing, &BTreeSet::new());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn result_literals_are_exactly_desired_plus_ignored_existing(
        checked in proptest::array::uniform5(any::<bool>()),
        picks in proptest::collection::vec(0usize..5, 0..8),
        ignored_pick in proptest::option::of(0usize..5),
    ) {
        let existing = existing_rows(&picks);
        let ignored: BTreeSet<String> = ignored_pick
            .map(|i| LITERALS[i].to_string())
            .into_iter()
            .collect();
        let result = run(&checked, &existing, &ignored);

        let mut expected = checked_set(&checked);
        for wt in &existing {
            if ignored.contains(&wt.work_type) {
                expected.insert(wt.work_type.clone());
            }
        }
        let got: BTreeSet<String> = result.iter().map(|wt| wt.work_type.clone()).collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn no_duplicate_literals_in_result(
        checked in proptest::array::uniform5(any::<bool>()),
        picks in proptest::collection::vec(0usize..5, 0..12),
    ) {
        let existing = existing_rows(&picks);
        let result = run(&checked, &existing, &BTreeSet::new());
        let unique: BTreeSet<&str> = result.iter().map(|wt| wt.work_type.as_str()).collect();
        prop_assert_eq!(unique.len(), result.len());
    }

    #[test]
    fn duplicates_resolve_to_the_highest_id(
        checked in proptest::array::uniform5(any::<bool>()),
        picks in proptest::collection::vec(0usize..5, 1..12),
    ) {
        let existing = existing_rows(&picks);
        let result = run(&checked, &existing, &BTreeSet::new());
        for wt in &result {
            if wt.id == 0 {
                continue; // newly created
            }
            let max_id = existing
                .iter()
                .filter(|e| e.work_type == wt.work_type)
                .map(|e| e.id)
                .max()
                .unwrap_or(0);
            prop_assert_eq!(wt.id, max_id);
        }
    }

    #[test]
    fn kept_rows_precede_new_rows_and_new_rows_sort(
        checked in proptest::array::uniform5(any::<bool>()),
        picks in proptest::collection::vec(0usize..5, 0..8),
    ) {
        let existing = existing_rows(&picks);
        let result = run(&checked, &existing, &BTreeSet::new());

        let first_new = result
            .iter()
            .position(|wt| wt.id == 0)
            .unwrap_or(result.len());
        let (kept, created) = result.split_at(first_new);

        // Nothing kept appears after the first created row.
        prop_assert!(created.iter().all(|wt| wt.id == 0));

        // Kept rows follow first-occurrence order of the existing list.
        let occurrence: Vec<&str> = {
            let mut seen = BTreeSet::new();
            existing
                .iter()
                .filter(|wt| seen.insert(wt.work_type.as_str()))
                .map(|wt| wt.work_type.as_str())
                .collect()
        };
        let kept_order: Vec<usize> = kept
            .iter()
            .map(|wt| {
                occurrence
                    .iter()
                    .position(|l| *l == wt.work_type)
                    .expect("kept literal came from existing")
            })
            .collect();
        prop_assert!(kept_order.windows(2).all(|w| w[0] < w[1]));

        // Created rows append in ascending literal order.
        let created_literals: Vec<&str> =
            created.iter().map(|wt| wt.work_type.as_str()).collect();
        let mut sorted = created_literals.clone();
        sorted.sort_unstable();
        prop_assert_eq!(created_literals, sorted);
    }
}
