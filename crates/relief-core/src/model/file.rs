//! Attachment metadata mirrored from the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A photo or document hosted by the backend. Only metadata is stored
/// locally; bytes are fetched on demand by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFile {
    pub id: i64,
    /// Backend file id, unique across all worksites.
    pub file_id: i64,
    pub url: String,
    pub full_url: Option<String>,
    pub mime_content_type: String,
    pub tag: Option<String>,
    pub title: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}
