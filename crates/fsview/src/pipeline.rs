//! Crawl/stat pipeline.
//!
//! Drains a [`PendingChanges`] queue against the database. Directories are
//! enumerated and their children queued; everything else is stat'ed and
//! reconciled with its record. Work generated while draining is processed in
//! the same pass, so a pass only ends once the queue is empty.

mod crawl;
mod stat;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::clock::ClockStamp;
use crate::database::{DirId, FileStat, ViewDatabase};
use crate::debug::{PipelineCounters, ProcessedPathLog};
use crate::pending::{PendingChange, PendingChanges, PendingFlags};
use crate::watcher::{path_in_scope, Watcher, WatcherFlags};

/// What a processing pass saw.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub processed: usize,
    /// Some entry carried `IS_DESYNCED`; cookies observed in this pass must
    /// not be trusted.
    pub desynced: bool,
    /// Cookie files that showed up during the pass.
    pub cookies: Vec<PathBuf>,
}

pub struct Pipeline {
    watcher: Arc<dyn Watcher>,
    root: PathBuf,
    ignored_roots: Vec<PathBuf>,
    cookie_prefix: OsString,
    counters: Arc<PipelineCounters>,
    processed_paths: Arc<ProcessedPathLog>,
}

impl Pipeline {
    pub fn new(
        watcher: Arc<dyn Watcher>,
        root: PathBuf,
        ignored_roots: Vec<PathBuf>,
        cookie_prefix: OsString,
        counters: Arc<PipelineCounters>,
        processed_paths: Arc<ProcessedPathLog>,
    ) -> Self {
        Self {
            watcher,
            root,
            ignored_roots,
            cookie_prefix,
            counters,
            processed_paths,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Processes queued work until the queue is empty. Every mutation is
    /// stamped with `ticks`.
    pub fn process_all_pending(
        &self,
        db: &mut ViewDatabase,
        pending: &mut PendingChanges,
        ticks: u32,
    ) -> PassOutcome {
        let started = Instant::now();
        let mut outcome = PassOutcome::default();

        while let Some(change) = pending.pop() {
            if change.flags.contains(PendingFlags::IS_DESYNCED) {
                outcome.desynced = true;
            }
            self.process_path(db, pending, &change, ticks, &mut outcome);
            outcome.processed += 1;
        }

        self.counters
            .record_pass(outcome.processed, outcome.desynced, started.elapsed());
        if outcome.desynced {
            log::info!(
                "fsview pass desynced root={} processed={}",
                self.root.display(),
                outcome.processed
            );
        }
        outcome
    }

    fn process_path(
        &self,
        db: &mut ViewDatabase,
        pending: &mut PendingChanges,
        change: &PendingChange,
        ticks: u32,
        outcome: &mut PassOutcome,
    ) {
        if !path_in_scope(&self.root, &change.path) {
            log::debug!("fsview skipping out-of-root path={}", change.path.display());
            return;
        }
        // Cookies never show up in the tree.
        if self.is_cookie(&change.path) {
            outcome.cookies.push(change.path.clone());
            return;
        }

        if change.path == self.root || change.flags.contains(PendingFlags::CRAWL_ONLY) {
            self.crawl_dir(db, pending, change, ticks);
        } else {
            self.stat_path(db, pending, change, ticks);
        }
    }

    fn is_cookie(&self, path: &Path) -> bool {
        let prefix = self.cookie_prefix.as_encoded_bytes();
        path.parent() == Some(self.root.as_path())
            && path
                .file_name()
                .is_some_and(|name| name.as_encoded_bytes().starts_with(prefix))
    }

    fn otime(change: &PendingChange, ticks: u32) -> ClockStamp {
        ClockStamp {
            ticks,
            timestamp: change.stamp.timestamp,
        }
    }

    /// Queues a re-check of the parent directory when a child appeared or
    /// vanished and the watcher reported it directly.
    ///
    /// With per-file notifications the parent's listing is not otherwise
    /// revisited, so siblings created or removed in the same instant could
    /// be missed. Crawler-generated changes never propagate: the crawl that
    /// generated them already covers the parent.
    #[allow(clippy::too_many_arguments)]
    fn propagate_to_parent(
        &self,
        db: &ViewDatabase,
        pending: &mut PendingChanges,
        change: &PendingChange,
        entry_stat: Option<&FileStat>,
        dir_path: &Path,
        parent: DirId,
        is_unlink: bool,
        is_new: bool,
    ) -> bool {
        let entry_is_dir = entry_stat.is_some_and(FileStat::is_dir);
        let parent_existed = db.dir(parent).is_some_and(|dir| dir.last_check_existed());
        let should_propagate = self
            .watcher
            .flags()
            .contains(WatcherFlags::HAS_PER_FILE_NOTIFICATIONS)
            && change.flags.contains(PendingFlags::VIA_NOTIFY)
            && dir_path != self.root
            && !entry_is_dir
            && parent_existed
            && (is_unlink || is_new);
        if should_propagate {
            pending.add(
                dir_path.to_path_buf(),
                change.stamp,
                PendingFlags::CRAWL_ONLY | (change.flags & PendingFlags::IS_DESYNCED),
            );
        }
        should_propagate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::watcher::manual::ManualWatcher;
    use std::ffi::OsStr;
    use std::fs;
    use tempfile::TempDir;

    pub(super) struct Harness {
        _temp: TempDir,
        pub root: PathBuf,
        pub db: ViewDatabase,
        pub pipeline: Pipeline,
        pub counters: Arc<PipelineCounters>,
        pub log: Arc<ProcessedPathLog>,
        pub clock: Clock,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_watcher(ManualWatcher::new(), Vec::new())
        }

        pub fn with_watcher(watcher: ManualWatcher, ignore: Vec<&str>) -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().canonicalize().unwrap();
            let counters = Arc::new(PipelineCounters::default());
            let log = Arc::new(ProcessedPathLog::new(64));
            let pipeline = Pipeline::new(
                Arc::new(watcher),
                root.clone(),
                ignore.iter().map(|dir| root.join(dir)).collect(),
                OsString::from(".cookie-"),
                counters.clone(),
                log.clone(),
            );
            Self {
                db: ViewDatabase::new(root.clone()),
                _temp: temp,
                root,
                pipeline,
                counters,
                log,
                clock: Clock::new(1),
            }
        }

        pub fn run(&mut self, changes: Vec<(PathBuf, PendingFlags)>) -> PassOutcome {
            let ticks = self.clock.advance();
            let stamp = self.clock.stamp();
            let mut pending = PendingChanges::new();
            for (path, flags) in changes {
                pending.add(path, stamp, flags);
            }
            self.pipeline
                .process_all_pending(&mut self.db, &mut pending, ticks)
        }

        pub fn full_crawl(&mut self) -> PassOutcome {
            let root = self.root.clone();
            self.run(vec![(root, PendingFlags::RECURSIVE)])
        }

        pub fn exists(&self, relative: &str) -> Option<bool> {
            let id = self.db.lookup_file(&self.root.join(relative))?;
            Some(self.db.file(id)?.exists())
        }

        pub fn otime(&self, relative: &str) -> Option<u32> {
            let id = self.db.lookup_file(&self.root.join(relative))?;
            Some(self.db.file(id)?.otime().ticks)
        }
    }

    #[test]
    fn full_crawl_records_tree() {
        let mut h = Harness::new();
        fs::create_dir_all(h.root.join("a/b")).unwrap();
        fs::write(h.root.join("top.txt"), b"1").unwrap();
        fs::write(h.root.join("a/b/deep.txt"), b"22").unwrap();

        let outcome = h.full_crawl();
        assert!(!outcome.desynced);
        assert_eq!(h.exists("top.txt"), Some(true));
        assert_eq!(h.exists("a"), Some(true));
        assert_eq!(h.exists("a/b/deep.txt"), Some(true));
        let deep = h.db.lookup_file(&h.root.join("a/b/deep.txt")).unwrap();
        assert_eq!(h.db.file(deep).unwrap().stat().size, 2);
        let b = h.db.resolve_dir(&h.root.join("a/b")).unwrap();
        assert!(h.db.dir(b).unwrap().fully_populated());
        assert!(h.db.root_inode().is_some());
        h.db.verify_integrity().unwrap();
    }

    #[test]
    fn unchanged_file_keeps_its_tick() {
        let mut h = Harness::new();
        fs::write(h.root.join("same.txt"), b"x").unwrap();
        h.full_crawl();
        let first = h.otime("same.txt").unwrap();

        let path = h.root.join("same.txt");
        h.run(vec![(path, PendingFlags::empty())]);
        assert_eq!(h.otime("same.txt"), Some(first));
    }

    #[test]
    fn notified_file_is_marked_changed() {
        let mut h = Harness::new();
        fs::write(h.root.join("f.txt"), b"x").unwrap();
        h.full_crawl();
        let first = h.otime("f.txt").unwrap();

        let path = h.root.join("f.txt");
        h.run(vec![(path, PendingFlags::VIA_NOTIFY)]);
        assert!(h.otime("f.txt").unwrap() > first);
    }

    #[test]
    fn modified_file_is_detected_by_stat() {
        let mut h = Harness::new();
        let path = h.root.join("f.txt");
        fs::write(&path, b"x").unwrap();
        h.full_crawl();
        let first = h.otime("f.txt").unwrap();

        fs::write(&path, b"longer").unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();
        h.run(vec![(path, PendingFlags::empty())]);
        assert!(h.otime("f.txt").unwrap() > first);
    }

    #[test]
    fn removed_file_is_marked_deleted() {
        let mut h = Harness::new();
        fs::create_dir(h.root.join("d")).unwrap();
        fs::write(h.root.join("d/gone.txt"), b"x").unwrap();
        h.full_crawl();

        fs::remove_file(h.root.join("d/gone.txt")).unwrap();
        let path = h.root.join("d/gone.txt");
        h.run(vec![(path, PendingFlags::VIA_NOTIFY)]);
        assert_eq!(h.exists("d/gone.txt"), Some(false));
        h.db.verify_integrity().unwrap();
    }

    #[test]
    fn removed_dir_is_pruned_recursively() {
        let mut h = Harness::new();
        fs::create_dir_all(h.root.join("d/e")).unwrap();
        fs::write(h.root.join("d/e/f.txt"), b"x").unwrap();
        h.full_crawl();

        fs::remove_dir_all(h.root.join("d")).unwrap();
        let path = h.root.join("d");
        h.run(vec![(path, PendingFlags::VIA_NOTIFY)]);
        assert_eq!(h.exists("d"), Some(false));
        assert!(h.db.resolve_dir(&h.root.join("d")).is_none());
        let reachable_live = h
            .db
            .all_files()
            .filter(|id| h.db.file(*id).unwrap().exists())
            .count();
        assert_eq!(reachable_live, 0);
        h.db.verify_integrity().unwrap();
    }

    #[test]
    fn created_then_deleted_gets_placeholder() {
        let mut h = Harness::new();
        h.full_crawl();
        let path = h.root.join("flash.txt");
        h.run(vec![(path, PendingFlags::VIA_NOTIFY)]);
        assert_eq!(h.exists("flash.txt"), Some(false));
        assert!(h.log.snapshot().last().unwrap().errno.is_some());
    }

    #[test]
    fn new_dir_from_notify_is_crawled() {
        let mut h = Harness::new();
        h.full_crawl();
        fs::create_dir_all(h.root.join("n/m")).unwrap();
        fs::write(h.root.join("n/m/x.txt"), b"x").unwrap();

        let path = h.root.join("n");
        h.run(vec![(path, PendingFlags::VIA_NOTIFY)]);
        assert_eq!(h.exists("n/m/x.txt"), Some(true));
    }

    #[test]
    fn file_to_dir_and_back() {
        let mut h = Harness::new();
        let path = h.root.join("flip");
        fs::write(&path, b"x").unwrap();
        h.full_crawl();

        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inner.txt"), b"y").unwrap();
        h.run(vec![(path.clone(), PendingFlags::VIA_NOTIFY)]);
        assert_eq!(h.exists("flip/inner.txt"), Some(true));

        fs::remove_dir_all(&path).unwrap();
        fs::write(&path, b"z").unwrap();
        h.run(vec![(path.clone(), PendingFlags::VIA_NOTIFY)]);
        assert_eq!(h.exists("flip"), Some(true));
        assert!(h.db.resolve_dir(&path).is_none());
        assert_eq!(h.exists("flip/inner.txt"), None);
        h.db.verify_integrity().unwrap();
    }

    #[test]
    fn desynced_entry_marks_pass_and_children() {
        let mut h = Harness::new();
        fs::create_dir(h.root.join("d")).unwrap();
        fs::write(h.root.join("d/x.txt"), b"x").unwrap();
        h.full_crawl();

        let root = h.root.clone();
        let outcome = h.run(vec![(root, PendingFlags::RECURSIVE | PendingFlags::IS_DESYNCED)]);
        assert!(outcome.desynced);
        assert!(outcome.processed > 1);
        let desynced_stats = h
            .log
            .snapshot()
            .iter()
            .filter(|entry| entry.pending_flags().contains(PendingFlags::IS_DESYNCED))
            .count();
        // d and d/x.txt were both re-stated with the flag.
        assert!(desynced_stats >= 2);

        let path = h.root.join("d/x.txt");
        let calm = h.run(vec![(path, PendingFlags::empty())]);
        assert!(!calm.desynced);
    }

    #[test]
    fn cookies_are_reported_not_recorded() {
        let mut h = Harness::new();
        h.full_crawl();
        let cookie = h.root.join(".cookie-1");
        fs::write(&cookie, b"").unwrap();

        let outcome = h.run(vec![(cookie.clone(), PendingFlags::VIA_NOTIFY)]);
        assert_eq!(outcome.cookies, vec![cookie]);
        assert_eq!(h.exists(".cookie-1"), None);
    }

    #[test]
    fn ignored_dir_is_recorded_but_not_crawled() {
        let mut h = Harness::with_watcher(ManualWatcher::new(), vec![".git"]);
        fs::create_dir(h.root.join(".git")).unwrap();
        fs::write(h.root.join(".git/HEAD"), b"ref").unwrap();
        h.full_crawl();

        assert_eq!(h.exists(".git"), Some(true));
        assert_eq!(h.exists(".git/HEAD"), None);

        let path = h.root.join(".git/HEAD");
        h.run(vec![(path, PendingFlags::VIA_NOTIFY)]);
        assert_eq!(h.exists(".git/HEAD"), None);
    }

    #[test]
    fn unlink_propagates_to_parent() {
        let mut h = Harness::new();
        fs::create_dir(h.root.join("d")).unwrap();
        fs::write(h.root.join("d/a.txt"), b"a").unwrap();
        fs::write(h.root.join("d/b.txt"), b"b").unwrap();
        h.full_crawl();

        // Only a.txt is reported; the parent re-check finds b.txt gone too.
        fs::remove_file(h.root.join("d/a.txt")).unwrap();
        fs::remove_file(h.root.join("d/b.txt")).unwrap();
        let path = h.root.join("d/a.txt");
        h.run(vec![(path, PendingFlags::VIA_NOTIFY)]);
        assert_eq!(h.exists("d/a.txt"), Some(false));
        assert_eq!(h.exists("d/b.txt"), Some(false));
    }

    #[test]
    fn root_inode_change_is_counted() {
        let mut h = Harness::new();
        h.full_crawl();
        h.db.set_root_inode(u64::MAX);
        h.full_crawl();
        assert_eq!(h.counters.root_inode_mismatches(), 1);
        assert_ne!(h.db.root_inode(), Some(u64::MAX));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_target_is_kept_on_record() {
        let mut h = Harness::new();
        std::os::unix::fs::symlink("target.txt", h.root.join("link")).unwrap();
        h.full_crawl();
        let id = h.db.lookup_file(&h.root.join("link")).unwrap();
        assert_eq!(
            h.db.file(id).unwrap().symlink_target(),
            Some(Path::new("target.txt"))
        );
        assert_eq!(h.db.file_name(id), Some(OsStr::new("link")));
    }
}
