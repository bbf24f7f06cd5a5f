//! The worksite root entity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

use super::flag::REASON_HIGH_PRIORITY;
use super::{
    FormValue, NetworkFile, UNSAVED_LOCAL_ID, UNSYNCED_NETWORK_ID, WorkType, WorksiteFlag,
    WorksiteNote,
};

/// One case/property record with its sub-entities.
///
/// Form data is a sorted map so serialization and reconciliation scans are
/// deterministic regardless of edit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worksite {
    pub id: i64,
    pub network_id: i64,
    pub incident_id: i64,
    pub address: String,
    pub case_number: String,
    pub city: String,
    pub county: String,
    pub state: String,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub phone1: String,
    pub phone2: String,
    pub email: String,
    pub form_data: BTreeMap<String, FormValue>,
    /// The work type elected to represent this worksite on maps and lists.
    pub key_work_type: Option<WorkType>,
    pub work_types: Vec<WorkType>,
    pub flags: Vec<WorksiteFlag>,
    pub notes: Vec<WorksiteNote>,
    pub files: Vec<NetworkFile>,
    pub reported_by: Option<i64>,
    /// Social vulnerability index, when the backend supplies one.
    pub svi: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_local_favorite: bool,
}

impl Worksite {
    /// An empty, not-yet-persisted worksite in the given incident.
    #[must_use]
    pub fn new(incident_id: i64) -> Self {
        Self {
            id: UNSAVED_LOCAL_ID,
            network_id: UNSYNCED_NETWORK_ID,
            incident_id,
            address: String::new(),
            case_number: String::new(),
            city: String::new(),
            county: String::new(),
            state: String::new(),
            postal_code: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            name: String::new(),
            phone1: String::new(),
            phone2: String::new(),
            email: String::new(),
            form_data: BTreeMap::new(),
            key_work_type: None,
            work_types: Vec::new(),
            flags: Vec::new(),
            notes: Vec::new(),
            files: Vec::new(),
            reported_by: None,
            svi: None,
            created_at: None,
            updated_at: None,
            is_local_favorite: false,
        }
    }

    #[must_use]
    pub fn coordinates(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }

    /// The explicit key work type, falling back to the first listed one.
    #[must_use]
    pub fn key_work_type_or_first(&self) -> Option<&WorkType> {
        self.key_work_type.as_ref().or_else(|| self.work_types.first())
    }

    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        self.network_id == UNSYNCED_NETWORK_ID
    }

    #[must_use]
    pub fn has_high_priority_flag(&self) -> bool {
        self.flags
            .iter()
            .any(|f| f.is_high_priority || f.reason_t == REASON_HIGH_PRIORITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_worksite_is_local_only() {
        let w = Worksite::new(23);
        assert_eq!(w.incident_id, 23);
        assert!(w.is_local_only());
        assert!(w.key_work_type_or_first().is_none());
    }

    #[test]
    fn key_work_type_falls_back_to_first() {
        let now = Utc::now();
        let mut w = Worksite::new(1);
        w.work_types = vec![WorkType::new("tarp", now), WorkType::new("debris", now)];
        assert_eq!(
            w.key_work_type_or_first().map(|wt| wt.work_type.as_str()),
            Some("tarp")
        );

        w.key_work_type = Some(WorkType::new("debris", now));
        assert_eq!(
            w.key_work_type_or_first().map(|wt| wt.work_type.as_str()),
            Some("debris")
        );
    }

    #[test]
    fn coordinates_are_normalized() {
        let mut w = Worksite::new(1);
        w.latitude = 95.0;
        w.longitude = 200.0;
        let c = w.coordinates();
        assert!((c.latitude() - 90.0).abs() < f64::EPSILON);
        assert!((c.longitude() - -160.0).abs() < 1e-9);
    }

    #[test]
    fn high_priority_flag_detection() {
        let now = Utc::now();
        let mut w = Worksite::new(1);
        assert!(!w.has_high_priority_flag());
        w.flags.push(WorksiteFlag::high_priority(now));
        assert!(w.has_high_priority_flag());
    }
}
