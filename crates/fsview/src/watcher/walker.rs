//! Filesystem helpers shared by watcher backends and the crawler.

use std::io;
use std::path::{Path, PathBuf};

use super::DirEntry;
use crate::database::{FileKind, FileStat};

/// Checks if a path is the root or below it.
pub fn path_in_scope(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

/// Checks if a path is an ignored directory or inside one.
pub fn path_is_ignored(ignored_roots: &[PathBuf], candidate: &Path) -> bool {
    ignored_roots
        .iter()
        .any(|ignored| candidate.starts_with(ignored))
}

pub fn lstat(path: &Path) -> io::Result<FileStat> {
    std::fs::symlink_metadata(path).map(|metadata| FileStat::from_metadata(&metadata))
}

/// Lists a directory, sorted by name for deterministic crawl order.
pub fn read_dir_entries(dir: &Path) -> io::Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        entries.push(DirEntry {
            name: entry.file_name(),
            kind: entry.file_type().ok().map(FileKind::from),
        });
    }
    entries.sort_unstable_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
