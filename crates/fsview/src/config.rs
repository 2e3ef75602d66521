//! Tunables for a watched root.
//!
//! Every field has a default, so a config file only needs to name the values
//! it overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Quiet period after a processing pass before the view is considered settled.
    pub settle_ms: u64,
    /// Upper bound for the idle wait of the IO thread, which doubles while idle.
    pub max_settle_backoff_ms: u64,
    /// Deleted records younger than this are never aged out.
    pub gc_age_seconds: u64,
    /// How often the IO thread considers an age-out. 0 disables periodic age-out.
    pub gc_interval_seconds: u64,
    pub content_hash_max_items: u64,
    pub symlink_target_max_items: u64,
    /// How long a failed cache computation is remembered.
    pub cache_error_ttl_ms: u64,
    pub content_cache_warming: bool,
    pub max_files_to_warm: usize,
    /// Hold the settle until warming finishes (bounded by `warm_timeout_ms`).
    pub sync_content_cache_warming: bool,
    pub warm_timeout_ms: u64,
    /// Number of processed paths remembered for debugging. 0 turns the log off.
    pub processed_paths_buffer: usize,
    /// Root-relative directories that are recorded but never crawled.
    pub ignore_dirs: Vec<PathBuf>,
    pub pending_channel_capacity: usize,
    pub notify_poll_ms: u64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            settle_ms: 20,
            max_settle_backoff_ms: 1000,
            gc_age_seconds: 12 * 60 * 60,
            gc_interval_seconds: 24 * 60 * 60,
            content_hash_max_items: 128 * 1024,
            symlink_target_max_items: 32 * 1024,
            cache_error_ttl_ms: 2000,
            content_cache_warming: false,
            max_files_to_warm: 1024,
            sync_content_cache_warming: false,
            warm_timeout_ms: 5000,
            processed_paths_buffer: 0,
            ignore_dirs: Vec::new(),
            pending_channel_capacity: 1024,
            notify_poll_ms: 1000,
        }
    }
}

impl ViewConfig {
    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|error| {
            ViewError::Config(format!("failed to read {}: {error}", path.display()))
        })?;
        Self::from_json(&data)
            .map_err(|error| ViewError::Config(format!("{}: {error}", path.display())))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)
            .map_err(|error| ViewError::Config(format!("failed to parse config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pending_channel_capacity == 0 {
            return Err(ViewError::Config(
                "pending_channel_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(dir) = self.ignore_dirs.iter().find(|dir| dir.is_absolute()) {
            return Err(ViewError::Config(format!(
                "ignore_dirs entries must be relative to the root: {}",
                dir.display()
            )));
        }
        Ok(())
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms.max(1))
    }

    pub fn max_settle_backoff(&self) -> Duration {
        Duration::from_millis(self.max_settle_backoff_ms.max(self.settle_ms).max(1))
    }

    pub fn gc_age(&self) -> Duration {
        Duration::from_secs(self.gc_age_seconds)
    }

    pub fn gc_interval(&self) -> Option<Duration> {
        (self.gc_interval_seconds > 0).then(|| Duration::from_secs(self.gc_interval_seconds))
    }

    pub fn cache_error_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_error_ttl_ms)
    }

    pub fn warm_timeout(&self) -> Duration {
        Duration::from_millis(self.warm_timeout_ms)
    }

    pub fn notify_poll(&self) -> Duration {
        Duration::from_millis(self.notify_poll_ms.max(1))
    }

    /// Absolute ignore paths for a given root.
    pub fn ignored_roots(&self, root: &Path) -> Vec<PathBuf> {
        self.ignore_dirs.iter().map(|dir| root.join(dir)).collect()
    }
}
