//! Live in-memory view of a watched directory tree.
//!
//! This crate keeps a queryable model of a directory tree in sync with disk:
//! - Arena-backed directory/file graph with a recency-ordered change list
//! - Coalescing pending-change queue and the crawl/stat pipeline that drains it
//! - Notify and IO threads, a monotonic tick clock, settle and ready signals
//! - Content hash and symlink target caches with error memoization
//! - Cookie-file "sync to now" and age-out of old deleted records

pub mod cache;
pub mod clock;
pub mod config;
pub mod cookie;
pub mod database;
pub mod debug;
pub mod error;
pub mod in_memory;
pub mod pending;
pub mod pipeline;
pub mod signal;
pub mod storage;
pub mod watcher;

// Re-export main types
pub use cache::{CacheStats, ContentHash, ContentHashCache, SymlinkTargetCache};
pub use clock::{Clock, ClockPosition, ClockStamp};
pub use config::ViewConfig;
pub use database::{AgeOutStats, DirId, FileId, FileKind, FileStat, ViewDatabase};
pub use debug::ViewDebugInfo;
pub use error::{CacheError, Result, ViewError};
pub use in_memory::{FileResult, InMemoryView, ViewSnapshot};
pub use pending::{PendingChange, PendingChanges, PendingFlags};
pub use watcher::{DirEntry, NotifyWatcher, Watcher, WatcherBatch, WatcherChange, WatcherFlags};
