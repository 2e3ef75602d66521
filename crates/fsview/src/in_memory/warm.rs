//! Content-hash warming on settle.

use std::sync::atomic::Ordering;
use std::time::Instant;

use super::InMemoryView;
use crate::cache::ContentHashKey;
use crate::signal::Completion;

impl InMemoryView {
    /// Hashes regular files changed since the previous warm, most recent
    /// first, up to `max_files_to_warm`.
    ///
    /// Runs on the rayon pool. With `sync_content_cache_warming` the caller
    /// waits for it, bounded by `warm_timeout_ms`.
    pub(super) fn warm_content_cache(&self) {
        if !self.config.content_cache_warming {
            return;
        }

        let (keys, ticks) = {
            let db = self.db.read();
            let since = self.last_warmed_tick.load(Ordering::Relaxed);
            let keys: Vec<_> = db
                .files_since(since)
                .filter_map(|id| {
                    let node = db.file(id)?;
                    if !node.exists() || !node.stat().is_file() {
                        return None;
                    }
                    Some(ContentHashKey::new(db.file_path(id)?, node.stat()))
                })
                .take(self.config.max_files_to_warm)
                .collect();
            (keys, self.clock.ticks())
        };
        self.last_warmed_tick.store(ticks, Ordering::Relaxed);
        if keys.is_empty() {
            return;
        }

        let done = Completion::new();
        let cache = self.content_hashes.clone();
        let signal = done.clone();
        let root = self.root.clone();
        rayon::spawn(move || {
            let started = Instant::now();
            let results = cache.get_batch(&keys);
            let failed = results.iter().filter(|result| result.is_err()).count();
            log::debug!(
                "fsview cache warm root={} files={} failed={} elapsed_ms={}",
                root.display(),
                results.len(),
                failed,
                started.elapsed().as_millis()
            );
            signal.complete();
        });

        if self.config.sync_content_cache_warming && !done.wait(self.config.warm_timeout()) {
            log::warn!(
                "fsview cache warm timed out root={} timeout_ms={}",
                self.root.display(),
                self.config.warm_timeout_ms
            );
        }
    }
}
