//! Read-only traversal used by the query layer.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::{DirId, FileId, FileNode, ViewDatabase};
use crate::storage::OptionSlabIndex;

/// Iterates file records from most to least recently changed.
pub struct RecencyIter<'a> {
    db: &'a ViewDatabase,
    cursor: OptionSlabIndex,
}

impl<'a> Iterator for RecencyIter<'a> {
    type Item = FileId;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor.to_option()?;
        self.cursor = self.db.files.get(index).map_or(OptionSlabIndex::none(), |node| node.older);
        Some(FileId(index))
    }
}

/// Depth-first walk over every file below a directory.
pub struct DirWalk<'a> {
    db: &'a ViewDatabase,
    pending_dirs: Vec<DirId>,
    files: Vec<FileId>,
}

impl<'a> Iterator for DirWalk<'a> {
    type Item = FileId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(file) = self.files.pop() {
                return Some(file);
            }
            let dir = self.pending_dirs.pop()?;
            if let Some(node) = self.db.dir(dir) {
                self.files.extend(node.files.values().copied());
                self.pending_dirs.extend(node.dirs.values().copied());
            }
        }
    }
}

impl ViewDatabase {
    pub fn latest_file(&self) -> Option<FileId> {
        self.latest.to_option().map(FileId)
    }

    pub fn oldest_file(&self) -> Option<FileId> {
        self.oldest.to_option().map(FileId)
    }

    pub fn iter_recent(&self) -> RecencyIter<'_> {
        RecencyIter {
            db: self,
            cursor: self.latest,
        }
    }

    pub(super) fn iter_recent_nodes(&self) -> impl Iterator<Item = (FileId, &FileNode)> + '_ {
        self.iter_recent()
            .filter_map(|id| self.files.get(id.0).map(|node| (id, node)))
    }

    /// Files that changed after `ticks`, most recent first.
    ///
    /// Stops at the first older record, so the cost is proportional to the
    /// number of results.
    pub fn files_since(&self, ticks: u32) -> impl Iterator<Item = FileId> + '_ {
        self.iter_recent_nodes()
            .take_while(move |(_, node)| node.otime.ticks > ticks)
            .map(|(id, _)| id)
    }

    /// Every file record reachable from `dir`, including deleted
    /// placeholders.
    pub fn walk_files(&self, dir: DirId) -> DirWalk<'_> {
        DirWalk {
            db: self,
            pending_dirs: vec![dir],
            files: Vec::new(),
        }
    }

    pub fn all_files(&self) -> DirWalk<'_> {
        self.walk_files(self.root)
    }

    pub fn dir_path(&self, dir: DirId) -> Option<PathBuf> {
        let mut names = Vec::new();
        let mut current = self.dirs.get(dir.0)?;
        while let Some(parent) = current.parent() {
            names.push(current.name());
            current = self.dirs.get(parent.0)?;
        }
        let mut path = self.root_path.clone();
        for name in names.iter().rev() {
            path.push(name);
        }
        Some(path)
    }

    pub fn file_path(&self, file: FileId) -> Option<PathBuf> {
        let node = self.files.get(file.0)?;
        let mut path = self.dir_path(node.parent())?;
        path.push(node.name());
        Some(path)
    }

    /// Finds the record for an absolute path below the root.
    pub fn lookup_file(&self, path: &Path) -> Option<FileId> {
        let name = path.file_name()?;
        let parent = self.resolve_dir(path.parent()?)?;
        self.child_file(parent, name)
    }

    /// True if any of the root-relative `names` is recorded as existing.
    pub fn do_any_of_these_files_exist<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        names.into_iter().any(|name| {
            let path = self.root_path.join(name.as_ref());
            self.lookup_file(&path)
                .and_then(|id| self.file(id))
                .is_some_and(FileNode::exists)
        })
    }

    pub fn file_name(&self, file: FileId) -> Option<&OsStr> {
        self.files.get(file.0).map(FileNode::name)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{add_file, stamp};
    use super::*;

    #[test]
    fn paths_are_rebuilt_from_parent_chain() {
        let mut db = ViewDatabase::new("/root");
        let id = add_file(&mut db, "a/b", "c.txt", 1);
        assert_eq!(db.file_path(id), Some(PathBuf::from("/root/a/b/c.txt")));
        let dir = db.file(id).unwrap().parent();
        assert_eq!(db.dir_path(dir), Some(PathBuf::from("/root/a/b")));
        assert_eq!(db.dir_path(db.root_dir()), Some(PathBuf::from("/root")));
        assert_eq!(db.lookup_file(Path::new("/root/a/b/c.txt")), Some(id));
        assert_eq!(db.lookup_file(Path::new("/root/a/b/nope")), None);
    }

    #[test]
    fn files_since_stops_at_position() {
        let mut db = ViewDatabase::new("/root");
        let a = add_file(&mut db, "", "a", 1);
        let b = add_file(&mut db, "", "b", 2);
        let c = add_file(&mut db, "", "c", 3);

        assert_eq!(db.files_since(1).collect::<Vec<_>>(), vec![c, b]);
        assert_eq!(db.files_since(3).count(), 0);
        assert_eq!(db.files_since(0).collect::<Vec<_>>(), vec![c, b, a]);
    }

    #[test]
    fn walk_covers_subtree_only() {
        let mut db = ViewDatabase::new("/root");
        let a = add_file(&mut db, "x", "a", 1);
        let b = add_file(&mut db, "x/y", "b", 1);
        add_file(&mut db, "z", "c", 1);

        let x = db.resolve_dir(Path::new("/root/x")).unwrap();
        let mut under_x: Vec<_> = db.walk_files(x).collect();
        under_x.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(under_x, expected);
        assert_eq!(db.all_files().count(), 3);
    }

    #[test]
    fn existence_check_ignores_deleted_records() {
        let mut db = ViewDatabase::new("/root");
        let a = add_file(&mut db, "", ".hg", 1);
        add_file(&mut db, "sub", "marker", 1);
        assert!(db.do_any_of_these_files_exist([".git", ".hg"]));
        assert!(db.do_any_of_these_files_exist(["sub/marker"]));

        db.mark_file_deleted(a, stamp(2, 0));
        assert!(!db.do_any_of_these_files_exist([".git", ".hg"]));
    }
}
