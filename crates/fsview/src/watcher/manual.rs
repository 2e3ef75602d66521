//! Test watcher: real filesystem reads, hand-fed events.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use super::{Watcher, WatcherBatch, WatcherChange, WatcherFlags};
use crate::pending::PendingFlags;

pub(crate) struct ManualWatcher {
    flags: WatcherFlags,
    tx: Sender<Option<WatcherBatch>>,
    rx: Receiver<Option<WatcherBatch>>,
}

impl ManualWatcher {
    pub(crate) fn new() -> Self {
        Self::with_flags(WatcherFlags::HAS_PER_FILE_NOTIFICATIONS)
    }

    pub(crate) fn with_flags(flags: WatcherFlags) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { flags, tx, rx }
    }

    pub(crate) fn notify(&self, path: impl Into<PathBuf>, flags: PendingFlags) {
        let batch = WatcherBatch {
            changes: vec![WatcherChange::new(path, flags)],
        };
        let _ = self.tx.send(Some(batch));
    }
}

impl Watcher for ManualWatcher {
    fn name(&self) -> &str {
        "manual"
    }

    fn flags(&self) -> WatcherFlags {
        self.flags
    }

    fn next_batch(&self, timeout: Duration) -> Option<WatcherBatch> {
        self.rx.recv_timeout(timeout).ok().flatten()
    }

    fn wake(&self) {
        let _ = self.tx.send(None);
    }
}
