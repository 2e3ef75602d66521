//! Pending change queue.
//!
//! A FIFO worklist of paths that need a stat or a crawl. Entries for the same
//! path coalesce by OR-ing their flags and keep their original queue position.
//! A recursive entry subsumes everything queued below it, and anything added
//! below a queued recursive entry is dropped (its desync flag is folded into
//! the ancestor so the escalation is not lost).
//!
//! Producers on other threads never touch a [`PendingChanges`] directly; they
//! send batches over the bounded channel from [`pending_channel`] and the IO
//! thread merges them into its private queue.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::clock::ClockStamp;
use crate::error::{Result, ViewError};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PendingFlags: u8 {
        /// Crawl the path and everything below it.
        const RECURSIVE = 1 << 0;
        /// Reported by the watcher rather than generated by the crawler.
        const VIA_NOTIFY = 1 << 1;
        /// Enumerate the directory without re-stating the path itself.
        const CRAWL_ONLY = 1 << 2;
        /// The watcher may have dropped events for this path.
        const IS_DESYNCED = 1 << 3;
        /// The watcher only knows "something in this directory changed";
        /// rescan its immediate children.
        const NONRECURSIVE_SCAN = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub path: PathBuf,
    /// Clock position when the change was queued.
    pub stamp: ClockStamp,
    pub flags: PendingFlags,
}

impl PendingChange {
    pub fn new(path: impl Into<PathBuf>, stamp: ClockStamp, flags: PendingFlags) -> Self {
        Self {
            path: path.into(),
            stamp,
            flags,
        }
    }
}

#[derive(Debug)]
struct Slot {
    seq: u64,
    stamp: ClockStamp,
    flags: PendingFlags,
}

#[derive(Debug, Default)]
pub struct PendingChanges {
    by_path: BTreeMap<PathBuf, Slot>,
    by_seq: BTreeMap<u64, PathBuf>,
    next_seq: u64,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn flags_for(&self, path: &Path) -> Option<PendingFlags> {
        self.by_path.get(path).map(|slot| slot.flags)
    }

    pub fn push(&mut self, change: PendingChange) -> bool {
        self.add(change.path, change.stamp, change.flags)
    }

    /// Queues `path`, coalescing with what is already queued.
    ///
    /// Returns false when the entry was absorbed by a queued recursive
    /// ancestor.
    pub fn add(&mut self, path: PathBuf, stamp: ClockStamp, flags: PendingFlags) -> bool {
        if let Some(ancestor) = self.recursive_ancestor(&path) {
            if let Some(slot) = self.by_path.get_mut(&ancestor) {
                slot.flags |= flags & PendingFlags::IS_DESYNCED;
            }
            return false;
        }

        if let Some(slot) = self.by_path.get_mut(&path) {
            slot.flags |= flags;
            slot.stamp = slot.stamp.max(stamp);
            if flags.contains(PendingFlags::RECURSIVE) {
                self.absorb_descendants(&path);
            }
            return true;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_seq.insert(seq, path.clone());
        self.by_path.insert(path.clone(), Slot { seq, stamp, flags });
        if flags.contains(PendingFlags::RECURSIVE) {
            self.absorb_descendants(&path);
        }
        true
    }

    /// Merges another queue, preserving its order.
    pub fn append(&mut self, other: &mut PendingChanges) {
        while let Some(change) = other.pop() {
            self.push(change);
        }
    }

    pub fn extend(&mut self, changes: impl IntoIterator<Item = PendingChange>) {
        for change in changes {
            self.push(change);
        }
    }

    /// Removes and returns the oldest entry.
    pub fn pop(&mut self) -> Option<PendingChange> {
        let (_, path) = self.by_seq.pop_first()?;
        let slot = self.by_path.remove(&path)?;
        Some(PendingChange {
            path,
            stamp: slot.stamp,
            flags: slot.flags,
        })
    }

    fn recursive_ancestor(&self, path: &Path) -> Option<PathBuf> {
        path.ancestors().skip(1).find_map(|ancestor| {
            self.by_path
                .get(ancestor)
                .filter(|slot| slot.flags.contains(PendingFlags::RECURSIVE))
                .map(|_| ancestor.to_path_buf())
        })
    }

    /// Drops every queued descendant of `path`, folding their desync flags
    /// into `path`'s entry.
    fn absorb_descendants(&mut self, path: &Path) {
        // Paths order component-wise, so descendants directly follow `path`.
        let descendants: Vec<PathBuf> = self
            .by_path
            .range::<Path, _>((Bound::Excluded(path), Bound::Unbounded))
            .take_while(|(candidate, _)| candidate.starts_with(path))
            .map(|(candidate, _)| candidate.clone())
            .collect();

        let mut desynced = PendingFlags::empty();
        for descendant in descendants {
            if let Some(slot) = self.by_path.remove(&descendant) {
                self.by_seq.remove(&slot.seq);
                desynced |= slot.flags & PendingFlags::IS_DESYNCED;
            }
        }
        if let Some(slot) = self.by_path.get_mut(path) {
            slot.flags |= desynced;
        }
    }
}

/// Message delivered to the IO thread.
#[derive(Debug)]
pub enum IoMessage {
    Changes(Vec<PendingChange>),
    /// Re-check the stop flag and any scheduled work.
    Wake,
}

/// Producer half of the notify to IO channel.
#[derive(Debug, Clone)]
pub struct PendingSender {
    tx: Sender<IoMessage>,
}

pub fn pending_channel(capacity: usize) -> (PendingSender, Receiver<IoMessage>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (PendingSender { tx }, rx)
}

impl PendingSender {
    /// Sends a batch, blocking while the channel is full.
    pub fn send(&self, changes: Vec<PendingChange>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        self.tx
            .send(IoMessage::Changes(changes))
            .map_err(|_| ViewError::Stopped)
    }

    /// Nudges the IO thread without queueing work. A full channel already
    /// guarantees a wakeup, so that case is not an error.
    pub fn wake(&self) {
        match self.tx.try_send(IoMessage::Wake) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("fsview wake dropped: io thread gone");
            }
        }
    }
}
