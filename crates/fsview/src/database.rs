//! The in-memory directory/file graph of one watched root.
//!
//! Records live in two arenas addressed by [`FileId`] and [`DirId`]. Every
//! file record sits in exactly one directory's child map and exactly once in
//! the recency list, which is ordered most-recently-changed first.
//!
//! Nothing here performs I/O. The pipeline stats paths and feeds the results
//! in; callers hold the view's write lock for every mutation.

mod age_out;
mod node;
mod read;
mod recency;
mod stat;

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

pub use age_out::AgeOutStats;
pub use node::{DirId, DirNode, FileId, FileNode};
pub use read::{DirWalk, RecencyIter};
pub use stat::{FileKind, FileStat, Timespec};

use crate::clock::ClockStamp;
use crate::storage::{OptionSlabIndex, Slab};

#[derive(Debug)]
pub struct ViewDatabase {
    root_path: PathBuf,
    files: Slab<FileNode>,
    dirs: Slab<DirNode>,
    root: DirId,
    /// Head of the recency list (most recently changed).
    latest: OptionSlabIndex,
    /// Tail of the recency list (least recently changed).
    oldest: OptionSlabIndex,
    root_inode: Option<u64>,
    last_age_out: ClockStamp,
}

impl ViewDatabase {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        let root_path = root_path.into();
        let mut dirs = Slab::new();
        let root = DirId(dirs.insert(DirNode::new(root_path.as_os_str(), None)));
        Self {
            root_path,
            files: Slab::new(),
            dirs,
            root,
            latest: OptionSlabIndex::none(),
            oldest: OptionSlabIndex::none(),
            root_inode: None,
            last_age_out: ClockStamp::default(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn root_dir(&self) -> DirId {
        self.root
    }

    pub fn file(&self, id: FileId) -> Option<&FileNode> {
        self.files.get(id.0)
    }

    pub fn dir(&self, id: DirId) -> Option<&DirNode> {
        self.dirs.get(id.0)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn root_inode(&self) -> Option<u64> {
        self.root_inode
    }

    pub fn set_root_inode(&mut self, ino: u64) {
        self.root_inode = Some(ino);
    }

    /// Tick and time of the last age-out that removed anything.
    pub fn last_age_out(&self) -> ClockStamp {
        self.last_age_out
    }

    /// Splits `path` into its names below the root.
    ///
    /// Returns `None` for paths outside the root or paths with `..` in them.
    fn relative_names<'a>(&self, path: &'a Path) -> Option<Vec<&'a OsStr>> {
        let relative = path.strip_prefix(&self.root_path).ok()?;
        let mut names = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => names.push(name),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(names)
    }

    /// Looks up the directory record for `path` without creating anything.
    pub fn resolve_dir(&self, path: &Path) -> Option<DirId> {
        let names = self.relative_names(path)?;
        let mut current = self.root;
        for name in names {
            current = self.dirs[current.0].dir(name)?;
        }
        Some(current)
    }

    /// Looks up the directory record for `path`, creating it and any missing
    /// intermediate directories.
    ///
    /// Returns `None` only when `path` is outside the root.
    pub fn resolve_or_create_dir(&mut self, path: &Path) -> Option<DirId> {
        let names = self.relative_names(path)?;
        let mut current = self.root;
        for name in names {
            current = match self.dirs[current.0].dir(name) {
                Some(child) => child,
                None => {
                    let child = DirId(self.dirs.insert(DirNode::new(name, Some(current))));
                    self.dirs[current.0].dirs.insert(Box::from(name), child);
                    child
                }
            };
        }
        Some(current)
    }

    pub fn child_file(&self, dir: DirId, name: &OsStr) -> Option<FileId> {
        self.dirs.get(dir.0)?.file(name)
    }

    pub fn child_dir(&self, dir: DirId, name: &OsStr) -> Option<DirId> {
        self.dirs.get(dir.0)?.dir(name)
    }

    /// Returns the record for `name` in `dir`, creating one stamped with
    /// `ctime` if it does not exist yet.
    ///
    /// A new record starts out non-existent at the head of the recency list;
    /// the caller marks it changed once it has a stat result.
    pub fn get_or_create_child_file(
        &mut self,
        dir: DirId,
        name: &OsStr,
        ctime: ClockStamp,
    ) -> FileId {
        if let Some(existing) = self.dirs[dir.0].file(name) {
            return existing;
        }
        let id = FileId(self.files.insert(FileNode::new(name, dir, ctime)));
        self.dirs[dir.0].files.insert(Box::from(name), id);
        self.link_at_head(id);
        id
    }

    /// Records a change to `file` observed at `otime` and moves it to the
    /// head of the recency list.
    ///
    /// `Some(stat)` means the entry exists with that stat; `None` means it
    /// is gone. The stat of a deleted entry is left as last seen.
    pub fn mark_file_changed(&mut self, file: FileId, stat: Option<FileStat>, otime: ClockStamp) {
        let node = &mut self.files[file.0];
        match stat {
            Some(stat) => {
                node.exists = true;
                node.stat = stat;
            }
            None => {
                node.exists = false;
                node.symlink_target = None;
            }
        }
        node.otime = otime;
        self.unlink(file);
        self.link_at_head(file);
    }

    pub fn mark_file_deleted(&mut self, file: FileId, otime: ClockStamp) {
        self.mark_file_changed(file, None, otime);
    }

    /// Treats an existing record as newly created, for entries that
    /// reappear after having been deleted.
    pub fn reset_file_ctime(&mut self, file: FileId, ctime: ClockStamp) {
        self.files[file.0].ctime = ctime;
    }

    pub fn set_symlink_target(&mut self, file: FileId, target: Option<PathBuf>) {
        self.files[file.0].symlink_target = target;
    }

    pub fn set_dir_crawled(&mut self, dir: DirId, stamp: ClockStamp) {
        let node = &mut self.dirs[dir.0];
        node.fully_populated = true;
        node.last_check_existed = true;
        node.last_crawl = Some(stamp);
    }

    pub fn set_dir_existed(&mut self, dir: DirId, existed: bool) {
        self.dirs[dir.0].last_check_existed = existed;
    }

    /// Marks every direct child file of `dir` non-existent as of `otime`,
    /// recursing into subdirectories when asked, and detaches `dir` from its
    /// parent.
    ///
    /// Detached directories are flagged deleted but stay in the arena so
    /// that the parent links of their deleted files remain valid. Age-out
    /// prunes them once the last of those files is gone. The root is never
    /// detached.
    pub fn mark_dir_deleted(&mut self, dir: DirId, otime: ClockStamp, recursive: bool) {
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            let (files, subdirs): (Vec<FileId>, Vec<DirId>) = {
                let node = &self.dirs[current.0];
                (
                    node.files.values().copied().collect(),
                    node.dirs.values().copied().collect(),
                )
            };

            for file in files {
                if self.files[file.0].exists {
                    self.mark_file_deleted(file, otime);
                }
            }
            if recursive {
                stack.extend(subdirs);
            }
            self.detach_dir(current);
        }
    }

    /// Flags `dir` deleted. It is unhooked from its parent only when the
    /// parent is live, so a deleted subtree keeps its shape until age-out
    /// dismantles it bottom-up.
    fn detach_dir(&mut self, dir: DirId) {
        let node = &mut self.dirs[dir.0];
        node.last_check_existed = false;
        node.fully_populated = false;
        let Some(parent) = node.parent() else {
            return;
        };
        node.deleted = true;
        let name = Box::<OsStr>::from(node.name());
        let parent_node = &mut self.dirs[parent.0];
        if parent_node.deleted {
            return;
        }
        if parent_node.dirs.get(&name) == Some(&dir) {
            parent_node.dirs.remove(&name);
        }
    }

    /// Walks the whole graph and checks its structural invariants.
    ///
    /// O(n); meant for tests and debugging.
    pub fn verify_integrity(&self) -> Result<(), String> {
        let mut seen = 0usize;
        let mut previous: Option<FileId> = None;
        for (id, node) in self.iter_recent_nodes() {
            seen += 1;
            if seen > self.files.len() {
                return Err("recency list has a cycle".to_string());
            }
            if node.newer.to_option() != previous.map(|p| p.0) {
                return Err(format!("file {} has a stale newer link", id.index()));
            }
            let parent = self
                .dirs
                .get(node.parent().0)
                .ok_or_else(|| format!("file {} has a dangling parent", id.index()))?;
            if parent.file(node.name()) != Some(id) {
                return Err(format!("file {} is missing from its parent", id.index()));
            }
            previous = Some(id);
        }
        if seen != self.files.len() {
            return Err(format!(
                "recency list holds {seen} of {} files",
                self.files.len()
            ));
        }
        if self.oldest.to_option() != previous.map(|p| p.0) {
            return Err("oldest pointer does not match the list tail".to_string());
        }
        for (index, dir) in self.dirs.iter() {
            for (_, child) in dir.dirs() {
                let child_node = self
                    .dirs
                    .get(child.0)
                    .ok_or_else(|| format!("dir {} has a dangling child", index.get()))?;
                if child_node.parent() != Some(DirId(index))
                    || (child_node.is_deleted() && !dir.is_deleted())
                {
                    return Err(format!("dir {} is misparented", child.index()));
                }
            }
            for (_, file) in dir.files() {
                if self.files.get(file.0).is_none() {
                    return Err(format!("dir {} has a dangling file", index.get()));
                }
            }
        }
        Ok(())
    }
}
