//! File and directory records stored in the view arenas.
//!
//! Relations between records are plain indices into the same arenas. Parent
//! links are lookup-only; ownership runs strictly from a directory's child
//! maps downwards.

use std::ffi::OsStr;

use fnv::FnvHashMap;

use super::stat::FileStat;
use crate::clock::ClockStamp;
use crate::storage::{OptionSlabIndex, SlabIndex};

/// Handle to a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) SlabIndex);

/// Handle to a directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(pub(crate) SlabIndex);

impl FileId {
    pub fn index(self) -> usize {
        self.0.get()
    }
}

impl DirId {
    pub fn index(self) -> usize {
        self.0.get()
    }
}

/// One filesystem entry, or a placeholder for an entry that was deleted.
#[derive(Debug)]
pub struct FileNode {
    name: Box<OsStr>,
    parent: DirId,
    pub(crate) exists: bool,
    pub(crate) stat: FileStat,
    /// When the entry was first observed (or re-observed after a deletion).
    pub(crate) ctime: ClockStamp,
    /// When the entry last changed.
    pub(crate) otime: ClockStamp,
    pub(crate) symlink_target: Option<std::path::PathBuf>,
    /// Neighbour towards the head (more recently changed).
    pub(super) newer: OptionSlabIndex,
    /// Neighbour towards the tail (less recently changed).
    pub(super) older: OptionSlabIndex,
}

impl FileNode {
    pub(super) fn new(name: &OsStr, parent: DirId, ctime: ClockStamp) -> Self {
        Self {
            name: Box::from(name),
            parent,
            exists: false,
            stat: FileStat::default(),
            ctime,
            otime: ctime,
            symlink_target: None,
            newer: OptionSlabIndex::none(),
            older: OptionSlabIndex::none(),
        }
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    pub fn parent(&self) -> DirId {
        self.parent
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn stat(&self) -> &FileStat {
        &self.stat
    }

    pub fn ctime(&self) -> ClockStamp {
        self.ctime
    }

    pub fn otime(&self) -> ClockStamp {
        self.otime
    }

    pub fn symlink_target(&self) -> Option<&std::path::Path> {
        self.symlink_target.as_deref()
    }

    /// True if the entry appeared after the given tick.
    pub fn is_new_since(&self, ticks: u32) -> bool {
        self.ctime.ticks > ticks
    }
}

#[derive(Debug)]
pub struct DirNode {
    /// The root carries the full root path here.
    name: Box<OsStr>,
    parent: Option<DirId>,
    pub(crate) files: FnvHashMap<Box<OsStr>, FileId>,
    pub(crate) dirs: FnvHashMap<Box<OsStr>, DirId>,
    pub(crate) last_check_existed: bool,
    pub(crate) fully_populated: bool,
    pub(crate) last_crawl: Option<ClockStamp>,
    /// Set once the directory has been detached from its parent. The record
    /// stays in the arena until its deleted files age out.
    pub(crate) deleted: bool,
}

impl DirNode {
    pub(super) fn new(name: &OsStr, parent: Option<DirId>) -> Self {
        Self {
            name: Box::from(name),
            parent,
            files: FnvHashMap::default(),
            dirs: FnvHashMap::default(),
            last_check_existed: true,
            fully_populated: false,
            last_crawl: None,
            deleted: false,
        }
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }

    pub fn file(&self, name: &OsStr) -> Option<FileId> {
        self.files.get(name).copied()
    }

    pub fn dir(&self, name: &OsStr) -> Option<DirId> {
        self.dirs.get(name).copied()
    }

    pub fn files(&self) -> impl Iterator<Item = (&OsStr, FileId)> + '_ {
        self.files.iter().map(|(name, id)| (&**name, *id))
    }

    pub fn dirs(&self) -> impl Iterator<Item = (&OsStr, DirId)> + '_ {
        self.dirs.iter().map(|(name, id)| (&**name, *id))
    }

    pub fn last_check_existed(&self) -> bool {
        self.last_check_existed
    }

    pub fn fully_populated(&self) -> bool {
        self.fully_populated
    }

    pub fn last_crawl(&self) -> Option<ClockStamp> {
        self.last_crawl
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(super) fn is_childless(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}
