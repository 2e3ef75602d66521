//! The IO thread: the only writer of the database.

use std::sync::atomic::Ordering;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::InMemoryView;
use crate::pending::{IoMessage, PendingChanges, PendingFlags};
use crate::pipeline::PassOutcome;

impl InMemoryView {
    pub(super) fn io_loop(&self, receiver: Receiver<IoMessage>) {
        log::info!("fsview io thread started root={}", self.root.display());
        let mut pending = PendingChanges::new();
        let mut idle_wait = self.config.settle();
        let mut last_age_out = Instant::now();

        self.full_crawl(&mut pending, false);
        let mut unsettled = true;

        while !self.is_stopping() {
            if self.recrawl_requested.swap(false, Ordering::AcqRel) {
                self.full_crawl(&mut pending, true);
                unsettled = true;
                idle_wait = self.config.settle();
                continue;
            }

            match receiver.recv_timeout(idle_wait) {
                Ok(message) => {
                    enqueue(&mut pending, message);
                    for message in receiver.try_iter() {
                        enqueue(&mut pending, message);
                    }
                    if pending.is_empty() {
                        continue;
                    }
                    self.process_pending(&mut pending);
                    unsettled = true;
                    idle_wait = self.config.settle();
                }
                Err(RecvTimeoutError::Timeout) => {
                    if unsettled {
                        self.settle_view();
                        unsettled = false;
                    }
                    self.consider_age_out(&mut last_age_out);
                    idle_wait = (idle_wait * 2).min(self.config.max_settle_backoff());
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.cookies.close();
        log::info!("fsview io thread stopped root={}", self.root.display());
    }

    /// Runs one pass under the write lock, then resolves or aborts the
    /// cookies it saw.
    pub(super) fn process_pending(&self, pending: &mut PendingChanges) -> PassOutcome {
        let outcome = {
            let mut db = self.db.write();
            let ticks = self.clock.advance();
            self.pipeline.process_all_pending(&mut db, pending, ticks)
        };

        if outcome.desynced {
            self.cookies.abort_all();
        } else {
            for cookie in &outcome.cookies {
                self.cookies.notify_cookie(cookie);
            }
        }
        outcome
    }

    /// Crawls the whole root. A recrawl is flagged desynced: whatever made
    /// it necessary may also have hidden cookie events.
    pub(super) fn full_crawl(&self, pending: &mut PendingChanges, desynced: bool) {
        let started = Instant::now();
        let mut flags = PendingFlags::RECURSIVE;
        if desynced {
            flags |= PendingFlags::IS_DESYNCED;
        }
        pending.add(self.root.clone(), self.clock.stamp(), flags);
        let outcome = self.process_pending(pending);

        let (files, dirs) = {
            let db = self.db.read();
            (db.file_count(), db.dir_count())
        };
        log::info!(
            "fsview crawl complete root={} files={} dirs={} processed={} recrawl={} elapsed_ms={}",
            self.root.display(),
            files,
            dirs,
            outcome.processed,
            desynced,
            started.elapsed().as_millis()
        );
        self.mark_crawl_complete();
    }

    fn settle_view(&self) {
        self.warm_content_cache();
        let generation = self.settle.settle();
        log::debug!(
            "fsview settled root={} tick={} generation={}",
            self.root.display(),
            self.clock.ticks(),
            generation
        );
    }

    fn consider_age_out(&self, last_age_out: &mut Instant) {
        let Some(interval) = self.config.gc_interval() else {
            return;
        };
        if last_age_out.elapsed() < interval {
            return;
        }
        *last_age_out = Instant::now();
        self.age_out(self.config.gc_age());
    }
}

fn enqueue(pending: &mut PendingChanges, message: IoMessage) {
    match message {
        IoMessage::Changes(changes) => pending.extend(changes),
        IoMessage::Wake => {}
    }
}
