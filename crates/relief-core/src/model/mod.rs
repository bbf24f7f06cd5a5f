//! Domain model: incidents, worksites, and worksite sub-entities.
//!
//! Values here are plain data. Identity conventions shared across the crate:
//! a local id of [`UNSAVED_LOCAL_ID`] marks a row not yet persisted, and a
//! network id of [`UNSYNCED_NETWORK_ID`] marks a record the backend has never
//! seen.

pub mod file;
pub mod flag;
pub mod form;
pub mod incident;
pub mod note;
pub mod work_type;
pub mod worksite;

pub use file::NetworkFile;
pub use flag::WorksiteFlag;
pub use form::FormValue;
pub use incident::{Incident, IncidentFormField};
pub use note::WorksiteNote;
pub use work_type::WorkType;
pub use worksite::Worksite;

/// Local id sentinel for entities that have not been inserted yet.
pub const UNSAVED_LOCAL_ID: i64 = 0;

/// Network id sentinel for entities the backend has not assigned an id.
pub const UNSYNCED_NETWORK_ID: i64 = -1;
