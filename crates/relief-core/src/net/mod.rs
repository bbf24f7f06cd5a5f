//! The network boundary.
//!
//! [`NetworkDataSource`] is the trait the pull syncer consumes; the real
//! REST client lives in the embedding app. DTOs here mirror the backend's
//! wire shapes and convert to domain models at the edge, so nothing past
//! this module knows about the wire. [`InMemoryNetwork`] is the in-crate
//! implementation for tests and simulation, with request logging and fault
//! injection.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    FormValue, NetworkFile, UNSAVED_LOCAL_ID, WorkType, Worksite, WorksiteFlag, WorksiteNote,
};

#[derive(Debug, Error)]
pub enum NetworkError {
    /// Connectivity or server-side failure; retried on a later pass.
    #[error("network transport: {0}")]
    Transport(String),

    #[error("network payload: {0}")]
    Decode(String),
}

/// One page of worksites as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksitePage {
    /// Total matching records, not the page length.
    pub count: i64,
    pub results: Vec<NetworkWorksite>,
}

/// One page of organizations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationPage {
    pub count: i64,
    pub results: Vec<NetworkOrganization>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOrganization {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_true() -> bool {
    true
}

/// Wire shape of a worksite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWorksite {
    pub id: i64,
    pub incident: i64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub case_number: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub county: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone1: String,
    #[serde(default)]
    pub phone2: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub form_data: Vec<NetworkFormValue>,
    #[serde(default)]
    pub key_work_type: Option<NetworkWorkType>,
    #[serde(default)]
    pub work_types: Vec<NetworkWorkType>,
    #[serde(default)]
    pub flags: Vec<NetworkFlag>,
    #[serde(default)]
    pub notes: Vec<NetworkNote>,
    #[serde(default)]
    pub files: Vec<NetworkFileDto>,
    #[serde(default)]
    pub reported_by: Option<i64>,
    #[serde(default)]
    pub svi: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWorkType {
    pub id: i64,
    pub work_type: String,
    pub status: String,
    #[serde(default)]
    pub claimed_by: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_recur_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phase: Option<i64>,
    #[serde(default)]
    pub recur: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFlag {
    pub id: i64,
    pub reason_t: String,
    #[serde(default)]
    pub is_high_priority: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub requested_action: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNote {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_survivor: bool,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFileDto {
    pub id: i64,
    pub file: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub full_url: Option<String>,
    #[serde(default)]
    pub mime_content_type: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFormValue {
    pub field_key: String,
    #[serde(default)]
    pub value_string: String,
    #[serde(default)]
    pub is_bool: bool,
    #[serde(default)]
    pub value_bool: bool,
}

impl NetworkWorksite {
    /// Converts to the domain model. Wire ids land in `network_id` slots;
    /// local ids stay at the unsaved sentinel until the store assigns them.
    #[must_use]
    pub fn to_worksite(&self) -> Worksite {
        let mut w = Worksite::new(self.incident);
        w.network_id = self.id;
        w.address.clone_from(&self.address);
        w.case_number.clone_from(&self.case_number);
        w.city.clone_from(&self.city);
        w.county.clone_from(&self.county);
        w.state.clone_from(&self.state);
        w.postal_code.clone_from(&self.postal_code);
        w.latitude = self.latitude;
        w.longitude = self.longitude;
        w.name.clone_from(&self.name);
        w.phone1.clone_from(&self.phone1);
        w.phone2.clone_from(&self.phone2);
        w.email.clone_from(&self.email);
        w.form_data = self
            .form_data
            .iter()
            .map(|f| {
                (
                    f.field_key.clone(),
                    FormValue {
                        value_string: f.value_string.clone(),
                        is_bool: f.is_bool,
                        value_bool: f.value_bool,
                    },
                )
            })
            .collect();
        w.key_work_type = self.key_work_type.as_ref().map(to_work_type);
        w.work_types = self.work_types.iter().map(to_work_type).collect();
        w.flags = self
            .flags
            .iter()
            .map(|f| WorksiteFlag {
                id: UNSAVED_LOCAL_ID,
                network_id: f.id,
                reason_t: f.reason_t.clone(),
                is_high_priority: f.is_high_priority,
                notes: f.notes.clone(),
                requested_action: f.requested_action.clone(),
                created_at: f.created_at,
            })
            .collect();
        w.notes = self
            .notes
            .iter()
            .map(|n| WorksiteNote {
                id: UNSAVED_LOCAL_ID,
                network_id: n.id,
                created_at: n.created_at,
                is_survivor: n.is_survivor,
                note: n.note.clone(),
            })
            .collect();
        w.files = self
            .files
            .iter()
            .map(|f| NetworkFile {
                id: UNSAVED_LOCAL_ID,
                file_id: f.file,
                url: f.url.clone(),
                full_url: f.full_url.clone(),
                mime_content_type: f.mime_content_type.clone(),
                tag: f.tag.clone(),
                title: f.title.clone(),
                created_at: f.created_at,
            })
            .collect();
        w.reported_by = self.reported_by;
        w.svi = self.svi;
        w.created_at = self.created_at;
        w.updated_at = self.updated_at;
        w
    }
}

fn to_work_type(wt: &NetworkWorkType) -> WorkType {
    WorkType {
        id: UNSAVED_LOCAL_ID,
        network_id: wt.id,
        work_type: wt.work_type.clone(),
        status: wt.status.clone(),
        org_claim: wt.claimed_by,
        created_at: wt.created_at,
        next_recur_at: wt.next_recur_at,
        phase: wt.phase,
        recur: wt.recur.clone(),
    }
}

/// Paged backend reads the pull syncer depends on.
pub trait NetworkDataSource: Send + Sync {
    /// Total worksites for an incident, optionally only those updated at or
    /// after `updated_after`.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] on transport or decode failure.
    fn get_worksites_count(
        &self,
        incident_id: i64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<i64, NetworkError>;

    /// One page of worksites at `page_offset` records in.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] on transport or decode failure.
    fn get_worksites_page(
        &self,
        incident_id: i64,
        page_count: i64,
        page_offset: i64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<WorksitePage, NetworkError>;

    /// One page of organizations active in an incident.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] on transport or decode failure.
    fn get_organizations_page(
        &self,
        incident_id: i64,
        page_count: i64,
        page_offset: i64,
    ) -> Result<OrganizationPage, NetworkError>;

    /// The incident's dynamic intake-form schema.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] on transport or decode failure.
    fn get_incident_form_fields(
        &self,
        incident_id: i64,
    ) -> Result<Vec<crate::model::IncidentFormField>, NetworkError>;
}

/// In-memory backend for tests: seeded data, a request log, and a knob to
/// start failing after a number of worksite-page requests.
#[derive(Default)]
pub struct InMemoryNetwork {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    worksites: HashMap<i64, Vec<NetworkWorksite>>,
    organizations: HashMap<i64, Vec<NetworkOrganization>>,
    form_fields: HashMap<i64, Vec<crate::model::IncidentFormField>>,
    page_requests: Vec<(i64, i64)>,
    fail_after_page_requests: Option<usize>,
}

impl InMemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_worksites(&self, incident_id: i64, worksites: Vec<NetworkWorksite>) {
        self.lock().worksites.insert(incident_id, worksites);
    }

    pub fn seed_organizations(&self, incident_id: i64, organizations: Vec<NetworkOrganization>) {
        self.lock().organizations.insert(incident_id, organizations);
    }

    pub fn seed_form_fields(
        &self,
        incident_id: i64,
        fields: Vec<crate::model::IncidentFormField>,
    ) {
        self.lock().form_fields.insert(incident_id, fields);
    }

    /// Worksite-page requests beyond `count` fail with a transport error.
    pub fn fail_after_page_requests(&self, count: usize) {
        self.lock().fail_after_page_requests = Some(count);
    }

    pub fn clear_failures(&self) {
        self.lock().fail_after_page_requests = None;
    }

    /// `(incident_id, page_offset)` of every worksite-page request served
    /// or failed, in order.
    #[must_use]
    pub fn page_requests(&self) -> Vec<(i64, i64)> {
        self.lock().page_requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn updated_at_or_after(w: &NetworkWorksite, after: Option<DateTime<Utc>>) -> bool {
    after.is_none_or(|after| w.updated_at.is_some_and(|at| at >= after))
}

impl NetworkDataSource for InMemoryNetwork {
    fn get_worksites_count(
        &self,
        incident_id: i64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<i64, NetworkError> {
        let state = self.lock();
        let count = state
            .worksites
            .get(&incident_id)
            .map_or(0, |all| {
                all.iter()
                    .filter(|w| updated_at_or_after(w, updated_after))
                    .count()
            });
        Ok(count as i64)
    }

    fn get_worksites_page(
        &self,
        incident_id: i64,
        page_count: i64,
        page_offset: i64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<WorksitePage, NetworkError> {
        let mut state = self.lock();
        state.page_requests.push((incident_id, page_offset));
        if let Some(limit) = state.fail_after_page_requests {
            if state.page_requests.len() > limit {
                return Err(NetworkError::Transport("connection reset".to_string()));
            }
        }

        let matching: Vec<NetworkWorksite> = state
            .worksites
            .get(&incident_id)
            .map(|all| {
                all.iter()
                    .filter(|w| updated_at_or_after(w, updated_after))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let count = matching.len() as i64;
        let start = usize::try_from(page_offset.max(0)).unwrap_or(usize::MAX);
        let len = usize::try_from(page_count.max(0)).unwrap_or(0);
        let results = matching
            .into_iter()
            .skip(start)
            .take(len)
            .collect();
        Ok(WorksitePage { count, results })
    }

    fn get_organizations_page(
        &self,
        incident_id: i64,
        page_count: i64,
        page_offset: i64,
    ) -> Result<OrganizationPage, NetworkError> {
        let state = self.lock();
        let all = state
            .organizations
            .get(&incident_id)
            .cloned()
            .unwrap_or_default();
        let count = all.len() as i64;
        let start = usize::try_from(page_offset.max(0)).unwrap_or(usize::MAX);
        let len = usize::try_from(page_count.max(0)).unwrap_or(0);
        let results = all.into_iter().skip(start).take(len).collect();
        Ok(OrganizationPage { count, results })
    }

    fn get_incident_form_fields(
        &self,
        incident_id: i64,
    ) -> Result<Vec<crate::model::IncidentFormField>, NetworkError> {
        Ok(self
            .lock()
            .form_fields
            .get(&incident_id)
            .cloned()
            .unwrap_or_default())
    }
}
