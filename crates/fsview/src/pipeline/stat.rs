//! Single-path reconciliation.

use std::ffi::OsStr;
use std::io;
use std::path::Path;

use super::Pipeline;
use crate::clock::{unix_now, ClockStamp};
use crate::database::{DirId, FileStat, ViewDatabase};
use crate::debug::ProcessedPath;
use crate::error::is_missing_path_error;
use crate::pending::{PendingChange, PendingChanges, PendingFlags};
use crate::watcher::path_is_ignored;

impl Pipeline {
    /// Stats `change.path` and reconciles the result with its record.
    pub(super) fn stat_path(
        &self,
        db: &mut ViewDatabase,
        pending: &mut PendingChanges,
        change: &PendingChange,
        ticks: u32,
    ) {
        let path = change.path.as_path();
        let (Some(dir_path), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        if path_is_ignored(&self.ignored_roots, dir_path) {
            return;
        }
        let Some(dir) = db.resolve_or_create_dir(dir_path) else {
            return;
        };

        let otime = Self::otime(change, ticks);
        let result = self.watcher.stat(path);
        self.record_processed(change, &result);

        let stat = match result {
            Ok(stat) => stat,
            Err(error) => {
                if !is_missing_path_error(&error) {
                    log::warn!("fsview lstat failed path={} error={error}", path.display());
                }
                self.reconcile_missing(db, pending, change, dir_path, dir, name, otime);
                return;
            }
        };

        let via_notify = change.flags.contains(PendingFlags::VIA_NOTIFY);
        let desynced = change.flags & PendingFlags::IS_DESYNCED;
        let mut recursive = change.flags.contains(PendingFlags::RECURSIVE);

        let (file, is_new) = match db.child_file(dir, name) {
            Some(file) => (file, false),
            None => (db.get_or_create_child_file(dir, name, otime), true),
        };
        let (existed, previous) = match db.file(file) {
            Some(node) => (node.exists(), *node.stat()),
            None => return,
        };

        if existed {
            if previous.ino != stat.ino {
                recursive = true;
            }
        } else {
            // Deleted before, or never seen: this is a (re)creation.
            if !is_new {
                db.reset_file_ctime(file, otime);
            }
            recursive = true;
        }

        let changed = !existed || previous.did_change(&stat);
        if changed || via_notify {
            db.mark_file_changed(file, Some(stat), otime);
            if stat.is_symlink() {
                let target = match self.watcher.read_link(path) {
                    Ok(target) => Some(target),
                    Err(error) => {
                        log::debug!("fsview readlink failed path={} error={error}", path.display());
                        None
                    }
                };
                db.set_symlink_target(file, target);
            } else {
                db.set_symlink_target(file, None);
            }
        }

        let dir_entry = db.child_dir(dir, name);
        if stat.is_dir() {
            if dir_entry
                .and_then(|entry| db.dir(entry))
                .map_or(true, |entry| !entry.last_check_existed())
            {
                recursive = true;
            }
            let scan = change.flags & PendingFlags::NONRECURSIVE_SCAN;
            // Known directories reached by a crawl are not descended into.
            let crawl = recursive || via_notify || !scan.is_empty();
            if crawl && !path_is_ignored(&self.ignored_roots, path) {
                let scan = if recursive { PendingFlags::RECURSIVE } else { scan };
                pending.add(
                    path.to_path_buf(),
                    change.stamp,
                    PendingFlags::CRAWL_ONLY | scan | desynced,
                );
            }
        } else if let Some(former_dir) = dir_entry {
            // Used to be a directory: its subtree is gone.
            db.mark_dir_deleted(former_dir, otime, true);
        }

        self.propagate_to_parent(
            db,
            pending,
            change,
            Some(&stat),
            dir_path,
            dir,
            false,
            !existed,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn reconcile_missing(
        &self,
        db: &mut ViewDatabase,
        pending: &mut PendingChanges,
        change: &PendingChange,
        dir_path: &Path,
        dir: DirId,
        name: &OsStr,
        otime: ClockStamp,
    ) {
        if let Some(dir_entry) = db.child_dir(dir, name) {
            db.mark_dir_deleted(dir_entry, otime, true);
        }

        let last_stat = match db.child_file(dir, name) {
            Some(file) => {
                let Some(node) = db.file(file) else {
                    return;
                };
                let last_stat = *node.stat();
                if node.exists() {
                    db.mark_file_deleted(file, otime);
                }
                Some(last_stat)
            }
            None => {
                // Created and removed before we could look: record a deleted
                // placeholder so "since" queries still report it.
                let file = db.get_or_create_child_file(dir, name, otime);
                db.mark_file_deleted(file, otime);
                None
            }
        };

        self.propagate_to_parent(
            db,
            pending,
            change,
            last_stat.as_ref(),
            dir_path,
            dir,
            true,
            false,
        );
    }

    fn record_processed(&self, change: &PendingChange, result: &io::Result<FileStat>) {
        if !self.processed_paths.is_enabled() {
            return;
        }
        let (errno, stat) = match result {
            Ok(stat) => (None, *stat),
            Err(error) => (Some(error.raw_os_error().unwrap_or(-1)), FileStat::default()),
        };
        self.processed_paths.record(ProcessedPath {
            timestamp: unix_now(),
            flags: change.flags.bits(),
            path: change.path.clone(),
            errno,
            mode: stat.mode,
            size: stat.size,
            mtime: stat.mtime.secs,
        });
    }
}
