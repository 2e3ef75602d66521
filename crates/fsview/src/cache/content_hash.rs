//! SHA-1 content hashes keyed by path and stat identity.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use rayon::prelude::*;
use sha1::{Digest, Sha1};

use super::{CacheResult, CacheStats, ErrorTtlCache};
use crate::database::{FileStat, Timespec};
use crate::error::CacheError;

const READ_CHUNK: usize = 64 * 1024;

/// A path plus the stat fields that must match for a cached hash to apply.
/// A change in size or mtime yields a different key, so stale hashes are
/// never served; they just age out of the LRU.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHashKey {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: Timespec,
}

impl ContentHashKey {
    pub fn new(path: impl Into<PathBuf>, stat: &FileStat) -> Self {
        Self {
            path: path.into(),
            size: stat.size,
            mtime: stat.mtime,
        }
    }

    fn matches(&self, stat: &FileStat) -> bool {
        self.size == stat.size && self.mtime == stat.mtime
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 20]);

impl ContentHash {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Streams the file through SHA-1.
///
/// Fails with [`CacheError::ChangedWhileReading`] if the file no longer
/// matches the key before or after reading.
pub fn hash_file(key: &ContentHashKey) -> CacheResult<ContentHash> {
    let mut file = File::open(&key.path)?;
    let before = FileStat::from_metadata(&file.metadata()?);
    if !key.matches(&before) {
        return Err(CacheError::ChangedWhileReading(key.path.clone()));
    }

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    let after = FileStat::from_metadata(&file.metadata()?);
    if !key.matches(&after) {
        return Err(CacheError::ChangedWhileReading(key.path.clone()));
    }
    Ok(ContentHash(hasher.finalize().into()))
}

pub struct ContentHashCache {
    inner: ErrorTtlCache<ContentHashKey, ContentHash>,
}

impl ContentHashCache {
    pub fn new(max_items: u64, error_ttl: Duration) -> Self {
        Self {
            inner: ErrorTtlCache::new("content_hash", max_items, error_ttl),
        }
    }

    pub fn get(&self, key: &ContentHashKey) -> CacheResult<ContentHash> {
        self.inner.get_or_compute(key, hash_file)
    }

    /// Looks up many keys at once, hashing misses in parallel. Results line
    /// up with `keys`.
    pub fn get_batch(&self, keys: &[ContentHashKey]) -> Vec<CacheResult<ContentHash>> {
        keys.par_iter().map(|key| self.get(key)).collect()
    }

    pub fn peek(&self, key: &ContentHashKey) -> Option<CacheResult<ContentHash>> {
        self.inner.peek(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn clear_stats(&self) {
        self.inner.clear_stats();
    }
}
