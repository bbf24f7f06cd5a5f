//! Opaque worksite filter compiled to SQL conditions.
//!
//! The UI hands map and list queries a [`WorksiteFilter`]; the query layer
//! never inspects it beyond [`WorksiteFilter::apply`], which appends WHERE
//! fragments and their parameters onto the clauses a query already built.

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;

use super::to_us;

/// Claim-state predicate over a worksite's work types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimFilter {
    /// At least one work type is claimed.
    Claimed,
    /// At least one work type is claimed by this organization.
    ClaimedBy(i64),
    /// No work type is claimed.
    Unclaimed,
}

#[derive(Debug, Clone, Default)]
pub struct WorksiteFilter {
    /// Match worksites with at least one work type in one of these statuses.
    pub statuses: Vec<String>,
    /// Match worksites carrying at least one of these flag reasons.
    pub flag_reasons: Vec<String>,
    /// Match worksites updated at or after this instant.
    pub updated_after: Option<DateTime<Utc>>,
    pub claim: Option<ClaimFilter>,
    /// Restrict to locally modified (unsynced) worksites.
    pub local_modified_only: bool,
}

impl WorksiteFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
            && self.flag_reasons.is_empty()
            && self.updated_after.is_none()
            && self.claim.is_none()
            && !self.local_modified_only
    }

    /// Appends this filter's conditions to a query under construction.
    /// Conditions reference the worksite table through alias `w`.
    pub fn apply(&self, conditions: &mut Vec<String>, params: &mut Vec<Box<dyn ToSql>>) {
        if !self.statuses.is_empty() {
            let placeholders = push_placeholders(params, &self.statuses);
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM work_type wt WHERE wt.worksite_id = w.id \
                 AND wt.status IN ({placeholders}))"
            ));
        }

        if !self.flag_reasons.is_empty() {
            let placeholders = push_placeholders(params, &self.flag_reasons);
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM worksite_flag wf WHERE wf.worksite_id = w.id \
                 AND wf.reason_t IN ({placeholders}))"
            ));
        }

        if let Some(after) = self.updated_after {
            params.push(Box::new(to_us(after)));
            conditions.push(format!("w.updated_at_us >= ?{}", params.len()));
        }

        match self.claim {
            Some(ClaimFilter::Claimed) => conditions.push(
                "EXISTS (SELECT 1 FROM work_type wt WHERE wt.worksite_id = w.id \
                 AND wt.org_claim IS NOT NULL)"
                    .to_string(),
            ),
            Some(ClaimFilter::ClaimedBy(org)) => {
                params.push(Box::new(org));
                conditions.push(format!(
                    "EXISTS (SELECT 1 FROM work_type wt WHERE wt.worksite_id = w.id \
                     AND wt.org_claim = ?{})",
                    params.len()
                ));
            }
            Some(ClaimFilter::Unclaimed) => conditions.push(
                "NOT EXISTS (SELECT 1 FROM work_type wt WHERE wt.worksite_id = w.id \
                 AND wt.org_claim IS NOT NULL)"
                    .to_string(),
            ),
            None => {}
        }

        if self.local_modified_only {
            conditions.push("w.is_local_modified = 1".to_string());
        }
    }
}

fn push_placeholders(params: &mut Vec<Box<dyn ToSql>>, values: &[String]) -> String {
    let mut placeholders = Vec::with_capacity(values.len());
    for value in values {
        params.push(Box::new(value.clone()));
        placeholders.push(format!("?{}", params.len()));
    }
    placeholders.join(", ")
}
