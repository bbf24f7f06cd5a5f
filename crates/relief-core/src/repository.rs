//! Local edit entry point.
//!
//! Every UI-originated worksite save flows through here: reconcile work
//! types from the edited form data, persist the worksite as locally
//! modified, and journal a `(start, change)` snapshot pair for the push
//! syncer. The repository is the only writer of persisted worksite rows
//! outside the page-commit path.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::journal::ChangeData;
use crate::model::{UNSAVED_LOCAL_ID, Worksite};
use crate::reconcile::{WorkTypeLookups, reconcile_work_types};
use crate::store::{self, SharedConnection};

pub struct WorksiteRepository {
    db: SharedConnection,
    clock: Arc<dyn Clock>,
    /// Organization the operator belongs to; recorded on journal rows.
    organization_id: i64,
    /// Build version recorded on journal rows for cross-version replay.
    app_version: i64,
}

impl WorksiteRepository {
    #[must_use]
    pub fn new(
        db: SharedConnection,
        clock: Arc<dyn Clock>,
        organization_id: i64,
        app_version: i64,
    ) -> Self {
        Self {
            db,
            clock,
            organization_id,
            app_version,
        }
    }

    /// Saves a local edit: reconciles work types against the incident's
    /// form schema, persists the worksite, and appends a journal row.
    ///
    /// `status_overrides` maps work-type literals to explicit statuses the
    /// operator set; `ignored_literals` names work types kept even without
    /// a backing form-data entry. Returns the worksite's local id.
    ///
    /// # Errors
    ///
    /// Returns an error if loading the form schema, persisting, or
    /// journaling fails; the worksite write itself is transactional.
    pub fn save_worksite(
        &self,
        mut worksite: Worksite,
        status_overrides: &BTreeMap<String, String>,
        ignored_literals: &BTreeSet<String>,
    ) -> Result<i64> {
        let now = self.clock.now();
        let conn = store::lock(&self.db);

        let start = if worksite.id == UNSAVED_LOCAL_ID {
            None
        } else {
            store::worksite::get_worksite(&conn, worksite.id)
                .context("load start snapshot")?
        };

        let fields = store::incident::get_form_fields(&conn, worksite.incident_id)
            .context("load incident form schema")?;
        let lookups = WorkTypeLookups::from_form_fields(&fields);
        worksite.work_types = reconcile_work_types(
            &worksite.form_data,
            &worksite.work_types,
            &lookups,
            status_overrides,
            ignored_literals,
            now,
        );

        let sync_uuid = Uuid::new_v4().to_string();
        let id = store::worksite::save_local_worksite(&conn, &worksite, &sync_uuid, now)
            .context("persist local worksite")?;
        worksite.id = id;

        let data = ChangeData {
            start,
            change: worksite,
        };
        store::journal::append_change(
            &conn,
            id,
            &sync_uuid,
            self.organization_id,
            self.app_version,
            &data,
            now,
        )
        .context("journal worksite change")?;

        debug!(worksite_id = id, creation = data.is_creation(), "local edit saved");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns an error on store failure.
    pub fn get_worksite(&self, id: i64) -> Result<Option<Worksite>> {
        let conn = store::lock(&self.db);
        store::worksite::get_worksite(&conn, id).context("load worksite")
    }
}
