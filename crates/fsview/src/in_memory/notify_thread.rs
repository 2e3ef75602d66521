//! The notify thread: watcher batches in, pending changes out.

use super::InMemoryView;
use crate::pending::{PendingChange, PendingFlags};

impl InMemoryView {
    pub(super) fn notify_loop(&self) {
        log::info!(
            "fsview notify thread started root={} watcher={}",
            self.root.display(),
            self.watcher.name()
        );
        let poll = self.config.notify_poll();

        while !self.is_stopping() {
            let Some(batch) = self.watcher.next_batch(poll) else {
                continue;
            };
            if batch.is_empty() {
                continue;
            }

            self.clock.advance();
            let stamp = self.clock.stamp();
            let changes: Vec<_> = batch
                .changes
                .into_iter()
                .map(|change| {
                    PendingChange::new(change.path, stamp, change.flags | PendingFlags::VIA_NOTIFY)
                })
                .collect();
            log::debug!(
                "fsview notify batch root={} paths={}",
                self.root.display(),
                changes.len()
            );
            if self.sender.send(changes).is_err() {
                break;
            }
        }

        log::info!("fsview notify thread stopped root={}", self.root.display());
    }
}
