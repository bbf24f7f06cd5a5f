//! On-disk cache of fetched worksite pages.
//!
//! Each `(incident, page)` pair lives in its own file so a crashed or
//! cancelled pull can resume from what it already fetched. A file holds a
//! one-line JSON header followed by the raw page payload; the header carries
//! a blake3 checksum of the payload bytes. Files are written to a temp path
//! and renamed into place so readers never see a half-written page.
//!
//! Validation failures on read are cache misses, not errors: a stale,
//! mismatched, or corrupt file just means the page gets fetched again.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::net::WorksitePage;
use crate::store::{from_us, to_us};

#[derive(Debug, Error)]
pub enum PageCacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct PageHeader {
    incident_id: i64,
    page_index: i64,
    start_count: i64,
    total_count: i64,
    request_time_us: i64,
    checksum: String,
    payload_len: u64,
}

/// Directory of per-page files with a freshness TTL.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
    ttl: Duration,
}

impl PageCache {
    #[must_use]
    pub const fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    fn page_path(&self, incident_id: i64, page_index: i64) -> PathBuf {
        self.dir
            .join(format!("worksites-{incident_id}-{page_index:04}.json"))
    }

    /// Persists one fetched page. `start_count` is how many records were
    /// already paged when the request was issued.
    ///
    /// # Errors
    ///
    /// Returns [`PageCacheError`] if the payload cannot be serialized or the
    /// file cannot be written.
    pub fn write_page(
        &self,
        incident_id: i64,
        page_index: i64,
        start_count: i64,
        page: &WorksitePage,
        request_time: DateTime<Utc>,
    ) -> Result<(), PageCacheError> {
        fs::create_dir_all(&self.dir)?;
        let payload = serde_json::to_vec(page)?;
        let header = PageHeader {
            incident_id,
            page_index,
            start_count,
            total_count: page.count,
            request_time_us: to_us(request_time),
            checksum: blake3::hash(&payload).to_hex().to_string(),
            payload_len: payload.len() as u64,
        };

        let path = self.page_path(incident_id, page_index);
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            serde_json::to_writer(&mut file, &header)?;
            file.write_all(b"\n")?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Reads a page back if a valid entry exists.
    ///
    /// `None` when the file is missing, addressed to a different incident or
    /// page, recorded against a different total count, older than the TTL,
    /// or fails its checksum.
    #[must_use]
    pub fn read_page(
        &self,
        incident_id: i64,
        page_index: i64,
        expected_total: i64,
        now: DateTime<Utc>,
    ) -> Option<WorksitePage> {
        let path = self.page_path(incident_id, page_index);
        let file = File::open(&path).ok()?;
        let mut reader = BufReader::new(file);

        let mut header_line = String::new();
        reader.read_line(&mut header_line).ok()?;
        let header: PageHeader = serde_json::from_str(&header_line).ok()?;

        if header.incident_id != incident_id
            || header.page_index != page_index
            || header.total_count != expected_total
        {
            debug!(incident_id, page_index, "cached page addressed elsewhere");
            return None;
        }
        let age = now - from_us(header.request_time_us);
        if age > self.ttl {
            debug!(incident_id, page_index, "cached page expired");
            return None;
        }

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).ok()?;
        if payload.len() as u64 != header.payload_len
            || blake3::hash(&payload).to_hex().to_string() != header.checksum
        {
            debug!(incident_id, page_index, "cached page failed checksum");
            return None;
        }
        serde_json::from_slice(&payload).ok()
    }

    /// Whether a valid cached entry exists; used by the fetch loop to skip
    /// pages it already has.
    #[must_use]
    pub fn has_valid_page(
        &self,
        incident_id: i64,
        page_index: i64,
        expected_total: i64,
        now: DateTime<Utc>,
    ) -> bool {
        self.read_page(incident_id, page_index, expected_total, now)
            .is_some()
    }

    /// Removes all cached pages for an incident. Returns how many files were
    /// deleted; a missing cache directory counts as zero.
    ///
    /// # Errors
    ///
    /// Returns [`PageCacheError`] on filesystem failure other than the
    /// directory not existing.
    pub fn delete_incident_pages(&self, incident_id: i64) -> Result<usize, PageCacheError> {
        let prefix = format!("worksites-{incident_id}-");
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut deleted = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                fs::remove_file(entry.path())?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{NetworkWorksite, WorksitePage};

    fn sample_page(count: i64) -> WorksitePage {
        WorksitePage {
            count,
            results: vec![NetworkWorksite {
                id: 1,
                incident: 9,
                address: "1 Elm".to_string(),
                case_number: "C1".to_string(),
                city: String::new(),
                county: String::new(),
                state: String::new(),
                postal_code: String::new(),
                latitude: 30.0,
                longitude: -99.0,
                name: String::new(),
                phone1: String::new(),
                phone2: String::new(),
                email: String::new(),
                form_data: vec![],
                key_work_type: None,
                work_types: vec![],
                flags: vec![],
                notes: vec![],
                files: vec![],
                reported_by: None,
                svi: None,
                created_at: None,
                updated_at: None,
            }],
        }
    }

    fn cache(dir: &tempfile::TempDir) -> PageCache {
        PageCache::new(dir.path().to_path_buf(), Duration::hours(96))
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache(&dir);
        let now = Utc::now();
        let page = sample_page(12);

        cache.write_page(9, 0, 0, &page, now).expect("write");
        let read = cache.read_page(9, 0, 12, now).expect("hit");
        assert_eq!(read, page);
        assert!(cache.has_valid_page(9, 0, 12, now));
    }

    #[test]
    fn mismatched_total_count_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache(&dir);
        let now = Utc::now();

        cache.write_page(9, 0, 0, &sample_page(12), now).expect("write");
        assert!(cache.read_page(9, 0, 13, now).is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache(&dir);
        let written = Utc::now();

        cache.write_page(9, 0, 0, &sample_page(12), written).expect("write");
        let later = written + Duration::hours(97);
        assert!(cache.read_page(9, 0, 12, later).is_none());
        assert!(cache.read_page(9, 0, 12, written + Duration::hours(1)).is_some());
    }

    #[test]
    fn corrupt_payload_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache(&dir);
        let now = Utc::now();

        cache.write_page(9, 0, 0, &sample_page(12), now).expect("write");
        let path = dir.path().join("worksites-9-0000.json");
        let mut bytes = fs::read(&path).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).expect("rewrite");

        assert!(cache.read_page(9, 0, 12, now).is_none());
    }

    #[test]
    fn delete_removes_only_that_incident() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache(&dir);
        let now = Utc::now();

        cache.write_page(9, 0, 0, &sample_page(1), now).expect("write");
        cache.write_page(9, 1, 1, &sample_page(1), now).expect("write");
        cache.write_page(7, 0, 0, &sample_page(1), now).expect("write");

        assert_eq!(cache.delete_incident_pages(9).expect("delete"), 2);
        assert!(cache.read_page(9, 0, 1, now).is_none());
        assert!(cache.read_page(7, 0, 1, now).is_some());
    }

    #[test]
    fn missing_directory_deletes_nothing() {
        let cache = PageCache::new(PathBuf::from("/nonexistent/pages"), Duration::hours(1));
        assert_eq!(cache.delete_incident_pages(9).expect("delete"), 0);
    }

    #[test]
    fn no_temp_files_left_after_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache(&dir);
        cache
            .write_page(9, 0, 0, &sample_page(1), Utc::now())
            .expect("write");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
