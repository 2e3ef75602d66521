//! Directory enumeration.

use std::ffi::OsString;

use fnv::FnvHashSet;

use super::Pipeline;
use crate::database::ViewDatabase;
use crate::error::is_missing_path_error;
use crate::pending::{PendingChange, PendingChanges, PendingFlags};
use crate::watcher::{path_is_ignored, WatcherFlags};

impl Pipeline {
    /// Enumerates `change.path` and queues the children that need a stat.
    ///
    /// A recursive crawl, a nonrecursive scan, or any crawl for a watcher
    /// without per-file notifications stats every child. Otherwise only new,
    /// missing or previously deleted children are queued. Known children are
    /// queued without `RECURSIVE`, so a scan stops one level down.
    pub(super) fn crawl_dir(
        &self,
        db: &mut ViewDatabase,
        pending: &mut PendingChanges,
        change: &PendingChange,
        ticks: u32,
    ) {
        let path = &change.path;
        let is_root = *path == self.root;
        if !is_root && path_is_ignored(&self.ignored_roots, path) {
            return;
        }

        let desynced = change.flags & PendingFlags::IS_DESYNCED;
        let mut recursive = change.flags.contains(PendingFlags::RECURSIVE);
        let stat_all = change.flags.contains(PendingFlags::NONRECURSIVE_SCAN)
            || !self
                .watcher
                .flags()
                .contains(WatcherFlags::HAS_PER_FILE_NOTIFICATIONS);

        let Some(dir) = db.resolve_or_create_dir(path) else {
            return;
        };
        let otime = Self::otime(change, ticks);

        if is_root {
            match self.watcher.stat(path) {
                Ok(stat) => {
                    if db.root_inode().is_some_and(|ino| ino != stat.ino) {
                        log::warn!(
                            "fsview root inode changed root={} expected={:?} actual={}",
                            path.display(),
                            db.root_inode(),
                            stat.ino
                        );
                        self.counters.record_root_inode_mismatch();
                        recursive = true;
                    }
                    db.set_root_inode(stat.ino);
                }
                Err(error) => {
                    log::error!("fsview root stat failed root={} error={error}", path.display());
                }
            }
        }

        if db.dir(dir).is_some_and(|node| !node.last_check_existed()) {
            recursive = true;
        }

        log::debug!(
            "fsview crawl dir={} recursive={recursive} stat_all={stat_all}",
            path.display()
        );
        self.counters.record_crawl();

        let entries = match self.watcher.enumerate(path) {
            Ok(entries) => entries,
            Err(error) => {
                if is_root {
                    log::error!("fsview root unreadable root={} error={error}", path.display());
                } else if is_missing_path_error(&error) {
                    log::debug!("fsview dir vanished dir={}", path.display());
                } else {
                    log::warn!("fsview opendir failed dir={} error={error}", path.display());
                }
                db.mark_dir_deleted(dir, otime, true);
                return;
            }
        };

        // Children recorded as existing that the listing no longer shows.
        let mut maybe_deleted: FnvHashSet<OsString> = db
            .dir(dir)
            .map(|node| {
                node.files()
                    .filter(|(_, id)| db.file(*id).is_some_and(|file| file.exists()))
                    .map(|(name, _)| name.to_os_string())
                    .collect()
            })
            .unwrap_or_default();

        for entry in &entries {
            maybe_deleted.remove(&entry.name);
            let existing = db
                .child_file(dir, &entry.name)
                .and_then(|id| db.file(id))
                .map(|file| file.exists());
            let is_new = existing != Some(true);
            if is_new || stat_all || recursive {
                let mut flags = desynced;
                if recursive || is_new {
                    flags |= PendingFlags::RECURSIVE;
                }
                pending.add(path.join(&entry.name), change.stamp, flags);
            }
        }

        let requeue = desynced
            | if recursive {
                PendingFlags::RECURSIVE
            } else {
                PendingFlags::empty()
            };
        for name in maybe_deleted {
            pending.add(path.join(name), change.stamp, requeue);
        }

        db.set_dir_crawled(dir, otime);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Harness;
    use crate::pending::PendingFlags;
    use crate::watcher::manual::ManualWatcher;
    use crate::watcher::WatcherFlags;
    use std::fs;

    #[test]
    fn vanished_children_are_rechecked() {
        let mut h = Harness::new();
        fs::write(h.root.join("a"), b"a").unwrap();
        fs::write(h.root.join("b"), b"b").unwrap();
        h.full_crawl();

        fs::remove_file(h.root.join("b")).unwrap();
        let root = h.root.clone();
        h.run(vec![(root, PendingFlags::CRAWL_ONLY)]);
        assert_eq!(h.exists("a"), Some(true));
        assert_eq!(h.exists("b"), Some(false));
    }

    #[test]
    fn shallow_crawl_skips_known_children() {
        let mut h = Harness::new();
        fs::write(h.root.join("a"), b"a").unwrap();
        h.full_crawl();
        let before = h.otime("a").unwrap();

        fs::write(h.root.join("b"), b"b").unwrap();
        let root = h.root.clone();
        let outcome = h.run(vec![(root, PendingFlags::CRAWL_ONLY)]);
        assert_eq!(h.exists("b"), Some(true));
        assert_eq!(h.otime("a"), Some(before));
        // The root crawl plus the stat of the new child.
        assert_eq!(outcome.processed, 2);
    }

    #[test]
    fn directory_watchers_stat_every_child() {
        let watcher = ManualWatcher::with_flags(WatcherFlags::empty());
        let mut h = Harness::with_watcher(watcher, Vec::new());
        fs::write(h.root.join("a"), b"a").unwrap();
        fs::write(h.root.join("b"), b"b").unwrap();
        h.full_crawl();

        let root = h.root.clone();
        let outcome = h.run(vec![(root.clone(), PendingFlags::CRAWL_ONLY)]);
        assert_eq!(outcome.processed, 3);

        let scan = h.run(vec![(
            root,
            PendingFlags::CRAWL_ONLY | PendingFlags::NONRECURSIVE_SCAN,
        )]);
        assert_eq!(scan.processed, 3);
    }

    fn rescan_restats_modified_child(watcher: ManualWatcher) {
        let mut h = Harness::with_watcher(watcher, Vec::new());
        fs::create_dir_all(h.root.join("d/sub")).unwrap();
        fs::write(h.root.join("d/x"), b"x").unwrap();
        fs::write(h.root.join("d/sub/deep"), b"deep").unwrap();
        h.full_crawl();
        let before = h.otime("d/x").unwrap();
        let deep_before = h.otime("d/sub/deep").unwrap();

        let x = h.root.join("d/x");
        fs::write(&x, b"rewritten").unwrap();
        filetime::set_file_mtime(&x, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();
        let dir = h.root.join("d");
        let outcome = h.run(vec![(
            dir,
            PendingFlags::VIA_NOTIFY | PendingFlags::NONRECURSIVE_SCAN,
        )]);

        assert!(h.otime("d/x").unwrap() > before);
        assert_eq!(h.otime("d/sub/deep"), Some(deep_before));
        // d, its crawl, then x and sub; sub itself is not crawled.
        assert_eq!(outcome.processed, 4);
    }

    #[test]
    fn nonrecursive_scan_restats_children_with_per_file_watcher() {
        rescan_restats_modified_child(ManualWatcher::new());
    }

    #[test]
    fn nonrecursive_scan_restats_children_with_directory_watcher() {
        rescan_restats_modified_child(ManualWatcher::with_flags(WatcherFlags::empty()));
    }

    #[test]
    fn unreadable_dir_is_marked_deleted() {
        let mut h = Harness::new();
        fs::create_dir(h.root.join("d")).unwrap();
        fs::write(h.root.join("d/x"), b"x").unwrap();
        h.full_crawl();

        fs::remove_dir_all(h.root.join("d")).unwrap();
        let dir = h.root.join("d");
        h.run(vec![(dir, PendingFlags::CRAWL_ONLY)]);
        assert_eq!(h.exists("d/x"), None);
        assert!(h.db.resolve_dir(&h.root.join("d")).is_none());
        h.db.verify_integrity().unwrap();
    }
}
