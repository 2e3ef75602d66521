//! Bounded get-or-compute caches with error memoization.
//!
//! Successful values stay until capacity pressure evicts them (LRU). Failed
//! computations are remembered too, but only for the configured error TTL,
//! after which the next lookup recomputes.

mod content_hash;
mod symlink;

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;
use serde::Serialize;

pub use content_hash::{hash_file, ContentHash, ContentHashCache, ContentHashKey};
pub use symlink::{SymlinkTargetCache, SymlinkTargetKey};

use crate::error::CacheError;

pub type CacheResult<V> = Result<V, CacheError>;

/// Expires error values after `ttl`; successful values never expire.
struct ErrorTtl {
    ttl: Duration,
}

impl<K, V> Expiry<K, CacheResult<V>> for ErrorTtl {
    fn expire_after_create(
        &self,
        _key: &K,
        value: &CacheResult<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.is_err().then_some(self.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &CacheResult<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.is_err().then_some(self.ttl)
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Computations that failed.
    pub errors: u64,
    /// Entries dropped for capacity.
    pub evictions: u64,
    pub entries: u64,
}

pub struct ErrorTtlCache<K, V> {
    name: &'static str,
    cache: Cache<K, CacheResult<V>>,
    counters: Arc<CacheCounters>,
}

impl<K, V> ErrorTtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, max_items: u64, error_ttl: Duration) -> Self {
        let counters = Arc::new(CacheCounters::default());
        let listener_counters = counters.clone();
        let cache = Cache::builder()
            .name(name)
            .max_capacity(max_items.max(1))
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(ErrorTtl { ttl: error_ttl })
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Size {
                    listener_counters.evictions.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();
        Self {
            name,
            cache,
            counters,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the cached value or remembered error, if any, without
    /// computing.
    pub fn peek(&self, key: &K) -> Option<CacheResult<V>> {
        self.cache.get(key)
    }

    /// Returns the cached result for `key`, computing and storing it on a
    /// miss. Concurrent misses on the same key compute once.
    pub fn get_or_compute<F>(&self, key: &K, compute: F) -> CacheResult<V>
    where
        F: FnOnce(&K) -> CacheResult<V>,
    {
        let entry = self
            .cache
            .entry_by_ref(key)
            .or_insert_with(|| compute(key));
        if entry.is_fresh() {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            if entry.value().is_err() {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        entry.into_value()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }

    pub fn clear_stats(&self) {
        for counter in [
            &self.counters.hits,
            &self.counters.misses,
            &self.counters.errors,
            &self.counters.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
