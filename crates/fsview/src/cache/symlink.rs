//! Symlink targets keyed by path and change time.

use std::path::PathBuf;
use std::time::Duration;

use rayon::prelude::*;

use super::{CacheResult, CacheStats, ErrorTtlCache};
use crate::database::{FileStat, Timespec};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymlinkTargetKey {
    pub path: PathBuf,
    /// Re-pointing a link replaces it, which moves its ctime.
    pub ctime: Timespec,
}

impl SymlinkTargetKey {
    pub fn new(path: impl Into<PathBuf>, stat: &FileStat) -> Self {
        Self {
            path: path.into(),
            ctime: stat.ctime,
        }
    }
}

fn read_target(key: &SymlinkTargetKey) -> CacheResult<PathBuf> {
    Ok(std::fs::read_link(&key.path)?)
}

pub struct SymlinkTargetCache {
    inner: ErrorTtlCache<SymlinkTargetKey, PathBuf>,
}

impl SymlinkTargetCache {
    pub fn new(max_items: u64, error_ttl: Duration) -> Self {
        Self {
            inner: ErrorTtlCache::new("symlink_target", max_items, error_ttl),
        }
    }

    pub fn get(&self, key: &SymlinkTargetKey) -> CacheResult<PathBuf> {
        self.inner.get_or_compute(key, read_target)
    }

    pub fn get_batch(&self, keys: &[SymlinkTargetKey]) -> Vec<CacheResult<PathBuf>> {
        keys.par_iter().map(|key| self.get(key)).collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn clear_stats(&self) {
        self.inner.clear_stats();
    }
}
