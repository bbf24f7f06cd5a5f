//! Sync configuration.
//!
//! Page sizes, batch bounds, and cache staleness are tunable through a TOML
//! file under the platform config directory; every field has a default so a
//! missing or partial file behaves sensibly. The embedding app usually loads
//! once and hands the value to each component constructor.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Floor for store write batches; smaller batches thrash transactions.
pub const MIN_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Worksites fetched per network page.
    #[serde(default = "default_worksites_page_size")]
    pub worksites_page_size: i64,
    /// Organizations fetched per network page.
    #[serde(default = "default_organizations_page_size")]
    pub organizations_page_size: i64,
    /// Rows written per store transaction. Clamped to [`MIN_BATCH_SIZE`].
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Age beyond which a cached page file is ignored.
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,
    /// Pending changes are skipped after this many failed push attempts.
    #[serde(default = "default_max_push_attempts")]
    pub max_push_attempts: i64,
    /// Root for the store file and page cache; platform dirs when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Recorded on sync stats rows for debugging cross-version behavior.
    #[serde(default)]
    pub app_build_version_code: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            worksites_page_size: default_worksites_page_size(),
            organizations_page_size: default_organizations_page_size(),
            batch_size: default_batch_size(),
            cache_ttl_hours: default_cache_ttl_hours(),
            max_push_attempts: default_max_push_attempts(),
            data_dir: None,
            app_build_version_code: 0,
        }
    }
}

impl SyncConfig {
    /// Reads `relief/sync.toml` under the platform config directory. A
    /// missing file yields defaults; a malformed file is an error.
    pub fn load() -> Result<Self> {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(Self::default());
        };
        let path = config_dir.join("relief/sync.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// [`Self::load`], logging and falling back to defaults on error.
    #[must_use]
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "sync config unreadable; using defaults");
                Self::default()
            }
        }
    }

    /// Location of the SQLite store file.
    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.data_root()?.join("relief.db"))
    }

    /// Directory holding cached worksite page files.
    pub fn page_cache_dir(&self) -> Result<PathBuf> {
        Ok(self.data_root()?.join("worksite-pages"))
    }

    fn data_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        match dirs::data_dir() {
            Some(dir) => Ok(dir.join("relief")),
            None => bail!("no platform data directory available"),
        }
    }

    #[must_use]
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours)
    }

    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(MIN_BATCH_SIZE)
    }
}

const fn default_worksites_page_size() -> i64 {
    5000
}

const fn default_organizations_page_size() -> i64 {
    200
}

const fn default_batch_size() -> usize {
    500
}

/// Four days.
const fn default_cache_ttl_hours() -> i64 {
    96
}

const fn default_max_push_attempts() -> i64 {
    5
}
