//! Removal of long-deleted records.

use std::time::Duration;

use serde::Serialize;

use super::{DirId, FileId, ViewDatabase};
use crate::clock::ClockStamp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgeOutStats {
    /// Records inspected from the stale end of the recency list.
    pub walked: usize,
    pub files_removed: usize,
    pub dirs_removed: usize,
}

impl ViewDatabase {
    /// Removes deleted file records whose last change is older than
    /// `min_age` relative to `now` (Unix seconds).
    ///
    /// Scans from the tail of the recency list and stops at the first record
    /// within the threshold. Deleted directories left without children are
    /// pruned along the way.
    pub fn age_out(&mut self, min_age: Duration, now: i64) -> AgeOutStats {
        let cutoff = now.saturating_sub(i64::try_from(min_age.as_secs()).unwrap_or(i64::MAX));
        let mut stats = AgeOutStats::default();
        let mut max_removed_ticks = None;

        let mut cursor = self.oldest_file();
        while let Some(id) = cursor {
            let node = &self.files[id.0];
            if node.otime.timestamp > cutoff {
                break;
            }
            stats.walked += 1;
            cursor = node.newer.to_option().map(FileId);
            if node.exists {
                continue;
            }
            let ticks = node.otime.ticks;
            max_removed_ticks = Some(max_removed_ticks.map_or(ticks, |max: u32| max.max(ticks)));
            self.remove_file(id, &mut stats);
        }

        if let Some(ticks) = max_removed_ticks {
            self.last_age_out = ClockStamp {
                ticks,
                timestamp: now,
            };
        }
        stats
    }

    fn remove_file(&mut self, file: FileId, stats: &mut AgeOutStats) {
        self.unlink(file);
        let Some(node) = self.files.try_remove(file.0) else {
            return;
        };
        stats.files_removed += 1;

        let parent = node.parent();
        let siblings = &mut self.dirs[parent.0].files;
        if siblings.get(node.name()) == Some(&file) {
            siblings.remove(node.name());
        }
        self.prune_deleted_dirs(parent, stats);
    }

    /// Drops `dir` and then its ancestors while they are deleted and empty.
    fn prune_deleted_dirs(&mut self, mut dir: DirId, stats: &mut AgeOutStats) {
        loop {
            let node = &self.dirs[dir.0];
            if !node.deleted || !node.is_childless() {
                return;
            }
            let parent = node.parent();
            if let Some(removed) = self.dirs.try_remove(dir.0) {
                stats.dirs_removed += 1;
                if let Some(parent) = parent {
                    let siblings = &mut self.dirs[parent.0].dirs;
                    if siblings.get(removed.name()) == Some(&dir) {
                        siblings.remove(removed.name());
                    }
                }
            }
            match parent {
                Some(parent) => dir = parent,
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{file_stat, stamp};
    use super::*;
    use std::ffi::OsStr;
    use std::path::Path;

    const NOW: i64 = 10_000;

    fn deleted_file(db: &mut ViewDatabase, dir: &str, name: &str, ticks: u32, age: i64) -> FileId {
        let dir = db.resolve_or_create_dir(&db.root_path().join(dir)).unwrap();
        let id = db.get_or_create_child_file(dir, OsStr::new(name), stamp(ticks, NOW - age));
        db.mark_file_deleted(id, stamp(ticks, NOW - age));
        id
    }

    #[test]
    fn removes_exactly_the_stale_records() {
        let mut db = ViewDatabase::new("/root");
        let thirty = deleted_file(&mut db, "", "thirty", 1, 30);
        let twenty = deleted_file(&mut db, "", "twenty", 2, 20);
        let ten = deleted_file(&mut db, "", "ten", 3, 10);

        let stats = db.age_out(Duration::from_secs(15), NOW);
        assert_eq!(stats.files_removed, 2);
        assert!(db.file(thirty).is_none());
        assert!(db.file(twenty).is_none());
        assert!(db.file(ten).is_some());
        assert_eq!(db.last_age_out(), stamp(2, NOW));
        db.verify_integrity().unwrap();

        let again = db.age_out(Duration::from_secs(15), NOW);
        assert_eq!(again, AgeOutStats::default());
        assert_eq!(db.file_count(), 1);
    }

    #[test]
    fn existing_files_survive_any_age() {
        let mut db = ViewDatabase::new("/root");
        let root = db.root_dir();
        let live = db.get_or_create_child_file(root, OsStr::new("live"), stamp(1, 0));
        db.mark_file_changed(live, Some(file_stat(3)), stamp(1, 0));
        let gone = deleted_file(&mut db, "", "gone", 2, 1000);

        let stats = db.age_out(Duration::from_secs(15), NOW);
        assert_eq!(stats.files_removed, 1);
        assert_eq!(stats.walked, 2);
        assert!(db.file(live).is_some());
        assert!(db.file(gone).is_none());
    }

    #[test]
    fn deleted_dirs_are_pruned_once_empty() {
        let mut db = ViewDatabase::new("/root");
        let root = db.root_dir();
        let dir = db.resolve_or_create_dir(Path::new("/root/d/e")).unwrap();
        let file = db.get_or_create_child_file(dir, OsStr::new("f"), stamp(1, 0));
        db.mark_file_changed(file, Some(file_stat(1)), stamp(1, 0));
        let d = db.resolve_dir(Path::new("/root/d")).unwrap();

        db.mark_dir_deleted(d, stamp(2, 0), true);
        assert_eq!(db.dir_count(), 3);

        let stats = db.age_out(Duration::from_secs(15), NOW);
        assert_eq!(stats.dirs_removed, 2);
        assert!(db.file(file).is_none());
        assert!(db.dir(dir).is_none());
        assert!(db.dir(d).is_none());
        assert!(db.dir(root).is_some());
        assert_eq!(db.dir_count(), 1);
        db.verify_integrity().unwrap();
    }
}
