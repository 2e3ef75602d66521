//! `notify` backend.
//!
//! The notify callback runs on the backend's own thread and only forwards
//! events through a crossbeam channel; the notify thread of the view pulls
//! them out with [`Watcher::next_batch`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode};
use parking_lot::Mutex;

use super::{Watcher, WatcherBatch, WatcherChange};
use crate::error::{Result, ViewError};
use crate::pending::PendingFlags;

#[derive(Debug)]
enum NativeEvent {
    Paths(Vec<PathBuf>),
    /// The backend lost track; everything below the root is suspect.
    Rescan(String),
    Wake,
}

pub struct NotifyWatcher {
    root: PathBuf,
    // Held for its lifetime: dropping it stops the backend.
    _watcher: Mutex<RecommendedWatcher>,
    events: Receiver<NativeEvent>,
    wake_tx: Sender<NativeEvent>,
}

impl NotifyWatcher {
    /// Starts a recursive watch on `root`.
    pub fn new(root: &Path) -> Result<Self> {
        let (tx, events) = crossbeam_channel::unbounded();
        let callback_tx = tx.clone();
        let mut watcher = recommended_watcher(move |event_result: notify::Result<Event>| {
            let message = match event_result {
                Ok(event) if event.need_rescan() || event.paths.is_empty() => {
                    NativeEvent::Rescan(format!("{:?}", event.kind))
                }
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    NativeEvent::Paths(event.paths)
                }
                Err(error) => NativeEvent::Rescan(error.to_string()),
            };
            let _ = callback_tx.send(message);
        })
        .map_err(|error| {
            ViewError::Watcher(format!(
                "failed to create filesystem watcher for {}: {error}",
                root.display()
            ))
        })?;

        notify::Watcher::watch(&mut watcher, root, RecursiveMode::Recursive).map_err(
            |error| ViewError::Watcher(format!("failed to watch {}: {error}", root.display())),
        )?;

        Ok(Self {
            root: root.to_path_buf(),
            _watcher: Mutex::new(watcher),
            events,
            wake_tx: tx,
        })
    }

    fn push_event(&self, batch: &mut WatcherBatch, event: NativeEvent) {
        match event {
            NativeEvent::Paths(paths) => batch.changes.extend(
                paths
                    .into_iter()
                    .map(|path| WatcherChange::new(path, PendingFlags::empty())),
            ),
            NativeEvent::Rescan(reason) => {
                log::warn!(
                    "fsview watcher lost events root={} reason={reason}",
                    self.root.display()
                );
                batch.changes.push(WatcherChange::new(
                    self.root.clone(),
                    PendingFlags::RECURSIVE | PendingFlags::IS_DESYNCED,
                ));
            }
            NativeEvent::Wake => {}
        }
    }
}

impl Watcher for NotifyWatcher {
    fn name(&self) -> &str {
        "notify"
    }

    fn next_batch(&self, timeout: Duration) -> Option<WatcherBatch> {
        let first = match self.events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
        };

        let mut batch = WatcherBatch::default();
        self.push_event(&mut batch, first);
        while let Ok(event) = self.events.try_recv() {
            self.push_event(&mut batch, event);
        }
        (!batch.is_empty()).then_some(batch)
    }

    fn wake(&self) {
        let _ = self.wake_tx.send(NativeEvent::Wake);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn wake_unblocks_next_batch() {
        let temp = TempDir::new().unwrap();
        let watcher = NotifyWatcher::new(temp.path()).unwrap();
        watcher.wake();
        let started = Instant::now();
        assert!(watcher.next_batch(Duration::from_secs(5)).is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn reports_created_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let watcher = NotifyWatcher::new(&root).unwrap();
        std::fs::write(root.join("new.txt"), b"x").unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = false;
        while Instant::now() < deadline && !seen {
            if let Some(batch) = watcher.next_batch(Duration::from_millis(200)) {
                seen = batch
                    .changes
                    .iter()
                    .any(|change| change.path.starts_with(&root));
            }
        }
        assert!(seen);
    }

    #[test]
    fn watching_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let result = NotifyWatcher::new(&temp.path().join("missing"));
        assert!(matches!(result, Err(ViewError::Watcher(_))));
    }
}
