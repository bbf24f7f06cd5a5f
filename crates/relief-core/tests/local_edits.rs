//! Local edit flow: repository save, journal rows, push bookkeeping, and
//! claim/close analytics.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};
use relief_core::cancel::CancellationToken;
use relief_core::clock::ManualClock;
use relief_core::config::SyncConfig;
use relief_core::journal::{ChangeData, fold_claim_close};
use relief_core::model::incident::IncidentFormField;
use relief_core::model::work_type::{STATUS_CLOSED_COMPLETED, STATUS_OPEN_UNASSIGNED};
use relief_core::model::{FormValue, Incident, Worksite};
use relief_core::reconcile::WORK_FORM_GROUP_KEY;
use relief_core::repository::WorksiteRepository;
use relief_core::store::{self, SharedConnection};
use relief_core::sync::{ChangePusher, InMemoryPushApi};

const ORG: i64 = 77;
const APP_VERSION: i64 = 31;

fn work_field(key: &str) -> IncidentFormField {
    let mut field = IncidentFormField::new(key, WORK_FORM_GROUP_KEY);
    field.html_type = "checkbox".to_string();
    field
}

struct Harness {
    db: SharedConnection,
    clock: Arc<ManualClock>,
    repo: WorksiteRepository,
    api: Arc<InMemoryPushApi>,
    pusher: ChangePusher,
}

fn harness() -> Harness {
    let conn = store::open_in_memory().expect("store");
    store::incident::upsert_incident(&conn, &Incident::placeholder(1)).expect("incident");
    store::incident::replace_form_fields(
        &conn,
        1,
        &[work_field("debris"), work_field("tarp"), work_field("muck_out")],
    )
    .expect("fields");

    let db: SharedConnection = Arc::new(Mutex::new(conn));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 8, 4, 14, 0, 0).unwrap(),
    ));
    let repo = WorksiteRepository::new(Arc::clone(&db), clock.clone(), ORG, APP_VERSION);
    let api = Arc::new(InMemoryPushApi::new());
    let pusher = ChangePusher::new(
        Arc::clone(&db),
        api.clone(),
        clock.clone(),
        SyncConfig::default(),
    );
    Harness {
        db,
        clock,
        repo,
        api,
        pusher,
    }
}

fn new_case(repo: &WorksiteRepository) -> i64 {
    let mut w = Worksite::new(1);
    w.address = "18 River Rd".to_string();
    w.form_data
        .insert("debris".to_string(), FormValue::flag(true));
    repo.save_worksite(w, &BTreeMap::new(), &BTreeSet::new())
        .expect("save")
}

#[test]
fn edit_then_push_round_trip() {
    let h = harness();
    let id = new_case(&h.repo);

    // Pre-push the worksite is purely local.
    {
        let conn = store::lock(&h.db);
        let w = store::worksite::get_worksite(&conn, id)
            .expect("get")
            .expect("row");
        assert!(w.is_local_only());
        assert_eq!(store::journal::pending_changes(&conn).expect("pending").len(), 1);
    }

    let stats = h
        .pusher
        .push_pending(&CancellationToken::new())
        .expect("push");
    assert_eq!(stats.pushed, 1);

    let conn = store::lock(&h.db);
    let w = store::worksite::get_worksite(&conn, id)
        .expect("get")
        .expect("row");
    assert!(!w.is_local_only(), "network id assigned after push");
    assert!(store::journal::pending_changes(&conn).expect("pending").is_empty());

    let uploaded = h.api.pushed();
    assert_eq!(uploaded.len(), 1);
    assert!(uploaded[0].data.is_creation());
    assert_eq!(uploaded[0].data.change.work_types[0].work_type, "debris");
}

#[test]
fn edits_replay_in_order_and_supersede_nothing_by_default() {
    let h = harness();
    let id = new_case(&h.repo);

    h.clock.advance(Duration::minutes(5));
    let mut edited = h.repo.get_worksite(id).expect("get").expect("row");
    edited
        .form_data
        .insert("tarp".to_string(), FormValue::flag(true));
    h.repo
        .save_worksite(edited, &BTreeMap::new(), &BTreeSet::new())
        .expect("second save");

    h.pusher
        .push_pending(&CancellationToken::new())
        .expect("push");

    let uploaded = h.api.pushed();
    assert_eq!(uploaded.len(), 2, "both snapshots uploaded");
    assert!(uploaded[0].created_at < uploaded[1].created_at);
    assert_eq!(uploaded[1].data.change.work_types.len(), 2);
}

#[test]
fn failed_push_keeps_the_edit_for_a_later_pass() {
    let h = harness();
    let id = new_case(&h.repo);

    h.api.fail_next(1);
    let stats = h
        .pusher
        .push_pending(&CancellationToken::new())
        .expect("push");
    assert_eq!(stats.failed, 1);

    {
        let conn = store::lock(&h.db);
        let w = store::worksite::get_worksite(&conn, id)
            .expect("get")
            .expect("row");
        assert!(w.is_local_only(), "still local after a failed push");
        let pending = store::journal::pending_changes(&conn).expect("pending");
        assert_eq!(pending[0].save_attempt, 1);
    }

    // Connectivity returns; the same row goes through untouched.
    let stats = h
        .pusher
        .push_pending(&CancellationToken::new())
        .expect("retry");
    assert_eq!(stats.pushed, 1);
}

#[test]
fn superseded_changes_are_not_pushed() {
    let h = harness();
    let id = new_case(&h.repo);

    h.clock.advance(Duration::minutes(1));
    let mut edited = h.repo.get_worksite(id).expect("get").expect("row");
    edited
        .form_data
        .insert("muck_out".to_string(), FormValue::flag(true));
    h.repo
        .save_worksite(edited, &BTreeMap::new(), &BTreeSet::new())
        .expect("second save");

    {
        let conn = store::lock(&h.db);
        let pending = store::journal::pending_changes(&conn).expect("pending");
        let newest = pending.last().expect("newest").id;
        store::journal::supersede_older_changes(&conn, id, newest).expect("supersede");
    }

    h.pusher
        .push_pending(&CancellationToken::new())
        .expect("push");
    let uploaded = h.api.pushed();
    assert_eq!(uploaded.len(), 1, "only the newest snapshot uploaded");
    assert_eq!(uploaded[0].data.change.work_types.len(), 2);
}

#[test]
fn claim_close_analytics_fold_from_journal_rows() {
    let h = harness();
    let id = new_case(&h.repo);

    // Claim and close debris through a second edit.
    h.clock.advance(Duration::minutes(10));
    let mut edited = h.repo.get_worksite(id).expect("get").expect("row");
    edited.work_types[0].org_claim = Some(ORG);
    edited.work_types[0].status = STATUS_CLOSED_COMPLETED.to_string();
    let overrides: BTreeMap<String, String> = [(
        "debris".to_string(),
        STATUS_CLOSED_COMPLETED.to_string(),
    )]
    .into();
    h.repo
        .save_worksite(edited, &overrides, &BTreeSet::new())
        .expect("second save");

    let conn = store::lock(&h.db);
    let changes = store::journal::get_org_changes(&conn, ORG).expect("changes");
    let counts = fold_claim_close(&changes, ORG);
    let debris = counts.get("debris").expect("debris counts");
    assert_eq!(debris.claimed, 1);
    assert_eq!(debris.closed, 1);

    // The first snapshot alone claims and closes nothing.
    let first: Vec<ChangeData> = changes.iter().map(|c| c.data.clone()).collect();
    assert_eq!(first[0].change.work_types[0].status, STATUS_OPEN_UNASSIGNED);
}
