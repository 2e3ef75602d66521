//! The watcher capability consumed by the view.
//!
//! A watcher delivers raw change batches and answers stat/enumerate requests
//! for the crawler. The view never depends on a concrete backend; the
//! `notify`-based [`NotifyWatcher`] is the default one.

mod native;
mod walker;

#[cfg(test)]
pub(crate) mod manual;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bitflags::bitflags;

pub use native::NotifyWatcher;
pub use walker::{lstat, path_in_scope, path_is_ignored, read_dir_entries};

use crate::database::{FileKind, FileStat};
use crate::pending::PendingFlags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WatcherFlags: u8 {
        /// Events name the changed file itself, not just its directory.
        const HAS_PER_FILE_NOTIFICATIONS = 1 << 0;
        /// A file written into the root is reported after every event that
        /// preceded it.
        const REPORTS_COOKIES = 1 << 1;
    }
}

/// A child returned by directory enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    /// Type hint from the listing, when the platform provides one.
    pub kind: Option<FileKind>,
}

/// One path reported by a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherChange {
    pub path: PathBuf,
    /// `IS_DESYNCED`, `RECURSIVE` or `NONRECURSIVE_SCAN` as the backend sees
    /// fit. The notify thread adds `VIA_NOTIFY`.
    pub flags: PendingFlags,
}

impl WatcherChange {
    pub fn new(path: impl Into<PathBuf>, flags: PendingFlags) -> Self {
        Self {
            path: path.into(),
            flags,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherBatch {
    pub changes: Vec<WatcherChange>,
}

impl WatcherBatch {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

pub trait Watcher: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn flags(&self) -> WatcherFlags {
        WatcherFlags::HAS_PER_FILE_NOTIFICATIONS | WatcherFlags::REPORTS_COOKIES
    }

    /// Stats `path` without following a final symlink.
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        lstat(path)
    }

    fn enumerate(&self, dir: &Path) -> io::Result<Vec<DirEntry>> {
        read_dir_entries(dir)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    /// Waits up to `timeout` for the next batch of changes.
    ///
    /// Returns `None` on timeout or after [`wake`](Watcher::wake).
    fn next_batch(&self, timeout: Duration) -> Option<WatcherBatch>;

    /// Unblocks a pending [`next_batch`](Watcher::next_batch).
    fn wake(&self) {}
}
