//! Read-only introspection: pipeline counters and the processed-path log.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::pending::PendingFlags;

/// Counters updated by the IO thread and read by anyone.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    passes: AtomicU64,
    desynced_passes: AtomicU64,
    paths_processed: AtomicU64,
    dirs_crawled: AtomicU64,
    root_inode_mismatches: AtomicU64,
    last_pass_micros: AtomicU64,
    max_pass_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub passes: u64,
    pub desynced_passes: u64,
    pub paths_processed: u64,
    pub dirs_crawled: u64,
    pub root_inode_mismatches: u64,
    pub last_pass_micros: u64,
    pub max_pass_micros: u64,
}

impl PipelineCounters {
    pub fn record_pass(&self, processed: usize, desynced: bool, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.passes.fetch_add(1, Ordering::Relaxed);
        if desynced {
            self.desynced_passes.fetch_add(1, Ordering::Relaxed);
        }
        self.paths_processed
            .fetch_add(processed as u64, Ordering::Relaxed);
        self.last_pass_micros.store(micros, Ordering::Relaxed);
        self.max_pass_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn record_crawl(&self) {
        self.dirs_crawled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_root_inode_mismatch(&self) {
        self.root_inode_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn root_inode_mismatches(&self) -> u64 {
        self.root_inode_mismatches.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            passes: self.passes.load(Ordering::Relaxed),
            desynced_passes: self.desynced_passes.load(Ordering::Relaxed),
            paths_processed: self.paths_processed.load(Ordering::Relaxed),
            dirs_crawled: self.dirs_crawled.load(Ordering::Relaxed),
            root_inode_mismatches: self.root_inode_mismatches.load(Ordering::Relaxed),
            last_pass_micros: self.last_pass_micros.load(Ordering::Relaxed),
            max_pass_micros: self.max_pass_micros.load(Ordering::Relaxed),
        }
    }

    /// Zeroes the counters. The root inode anomaly count survives, since it
    /// flags a condition an operator still has to look at.
    pub fn reset(&self) {
        for counter in [
            &self.passes,
            &self.desynced_passes,
            &self.paths_processed,
            &self.dirs_crawled,
            &self.last_pass_micros,
            &self.max_pass_micros,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// One path handled by the stat step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedPath {
    /// Unix seconds.
    pub timestamp: i64,
    pub flags: u8,
    pub path: PathBuf,
    pub errno: Option<i32>,
    pub mode: u32,
    pub size: u64,
    pub mtime: i64,
}

impl ProcessedPath {
    pub fn pending_flags(&self) -> PendingFlags {
        PendingFlags::from_bits_truncate(self.flags)
    }
}

/// Bounded ring buffer of recently processed paths. A capacity of 0 turns
/// recording off.
#[derive(Debug)]
pub struct ProcessedPathLog {
    capacity: usize,
    entries: Mutex<VecDeque<ProcessedPath>>,
}

impl ProcessedPathLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn record(&self, entry: ProcessedPath) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries oldest first.
    pub fn snapshot(&self) -> Vec<ProcessedPath> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewDebugInfo {
    pub root: PathBuf,
    pub watcher: String,
    pub clock: String,
    pub ticks: u32,
    pub file_count: usize,
    pub dir_count: usize,
    pub recrawl_count: u64,
    pub last_recrawl_reason: Option<String>,
    pub last_age_out_tick: u32,
    pub last_age_out_timestamp: i64,
    pub last_warmed_tick: u32,
    pub settle_generation: u64,
    pub pipeline: PipelineStats,
    pub content_hash_cache: CacheStats,
    pub symlink_target_cache: CacheStats,
    pub processed_paths: Vec<ProcessedPath>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: i64) -> ProcessedPath {
        ProcessedPath {
            timestamp: n,
            flags: PendingFlags::VIA_NOTIFY.bits(),
            path: PathBuf::from(format!("/r/{n}")),
            errno: None,
            mode: 0,
            size: 0,
            mtime: 0,
        }
    }

    #[test]
    fn ring_buffer_keeps_latest() {
        let log = ProcessedPathLog::new(2);
        for n in 0..5 {
            log.record(entry(n));
        }
        let stamps: Vec<_> = log.snapshot().iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![3, 4]);
        assert_eq!(log.snapshot()[0].pending_flags(), PendingFlags::VIA_NOTIFY);

        log.clear();
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let log = ProcessedPathLog::new(0);
        log.record(entry(1));
        assert!(!log.is_enabled());
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn reset_keeps_anomaly_count() {
        let counters = PipelineCounters::default();
        counters.record_pass(3, true, Duration::from_micros(40));
        counters.record_pass(1, false, Duration::from_micros(10));
        counters.record_root_inode_mismatch();

        let stats = counters.snapshot();
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.desynced_passes, 1);
        assert_eq!(stats.paths_processed, 4);
        assert_eq!(stats.last_pass_micros, 10);
        assert_eq!(stats.max_pass_micros, 40);

        counters.reset();
        let stats = counters.snapshot();
        assert_eq!(stats.passes, 0);
        assert_eq!(stats.root_inode_mismatches, 1);
    }
}
