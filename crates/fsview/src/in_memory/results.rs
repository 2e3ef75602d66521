//! Owned file results and their cache-backed enrichments.

use std::io;
use std::path::PathBuf;

use super::InMemoryView;
use crate::cache::{CacheResult, ContentHash, ContentHashKey, SymlinkTargetKey};
use crate::clock::ClockStamp;
use crate::database::{FileId, FileStat, ViewDatabase};
use crate::error::CacheError;

/// A file record copied out of the database, usable after the lock is
/// released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub path: PathBuf,
    pub exists: bool,
    pub stat: FileStat,
    pub ctime: ClockStamp,
    pub otime: ClockStamp,
    pub symlink_target: Option<PathBuf>,
}

impl FileResult {
    pub fn new(db: &ViewDatabase, id: FileId) -> Option<Self> {
        let node = db.file(id)?;
        Some(Self {
            path: db.file_path(id)?,
            exists: node.exists(),
            stat: *node.stat(),
            ctime: node.ctime(),
            otime: node.otime(),
            symlink_target: node.symlink_target().map(PathBuf::from),
        })
    }

    /// Whether the file first appeared after `ticks`.
    pub fn is_new_since(&self, ticks: u32) -> bool {
        self.ctime.ticks > ticks
    }

    fn content_key(&self) -> CacheResult<ContentHashKey> {
        if !self.exists {
            return Err(io::Error::from(io::ErrorKind::NotFound).into());
        }
        if !self.stat.is_file() {
            return Err(CacheError::Io {
                kind: io::ErrorKind::InvalidInput,
                message: format!("not a regular file: {}", self.path.display()),
            });
        }
        Ok(ContentHashKey::new(&self.path, &self.stat))
    }
}

impl InMemoryView {
    pub fn content_sha1(&self, file: &FileResult) -> CacheResult<ContentHash> {
        self.content_hashes.get(&file.content_key()?)
    }

    /// Hashes many results at once; misses are computed in parallel. The
    /// output lines up with `files`.
    pub fn content_sha1_batch(&self, files: &[FileResult]) -> Vec<CacheResult<ContentHash>> {
        let keys: Vec<_> = files.iter().map(FileResult::content_key).collect();
        let lookups: Vec<_> = keys
            .iter()
            .filter_map(|key| key.as_ref().ok().cloned())
            .collect();
        let mut hashed = self.content_hashes.get_batch(&lookups).into_iter();

        keys.into_iter()
            .map(|key| match key {
                Ok(_) => hashed.next().unwrap_or_else(|| {
                    Err(CacheError::Io {
                        kind: io::ErrorKind::Other,
                        message: "missing batch result".to_string(),
                    })
                }),
                Err(error) => Err(error),
            })
            .collect()
    }

    pub fn symlink_target(&self, file: &FileResult) -> CacheResult<PathBuf> {
        if !file.exists || !file.stat.is_symlink() {
            return Err(CacheError::Io {
                kind: io::ErrorKind::InvalidInput,
                message: format!("not a symlink: {}", file.path.display()),
            });
        }
        self.symlink_targets
            .get(&SymlinkTargetKey::new(&file.path, &file.stat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;
    use crate::watcher::manual::ManualWatcher;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn crawled(temp: &TempDir) -> Arc<InMemoryView> {
        let view = InMemoryView::new(
            temp.path(),
            Arc::new(ManualWatcher::new()),
            ViewConfig::default(),
        )
        .unwrap();
        view.client_mode_crawl();
        view
    }

    fn result_for(view: &InMemoryView, name: &str) -> FileResult {
        let snapshot = view.read();
        let id = snapshot.lookup_file(&view.root().join(name)).unwrap();
        snapshot.file_result(id).unwrap()
    }

    #[test]
    fn hashes_regular_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("abc.txt"), b"abc").unwrap();
        let view = crawled(&temp);

        let file = result_for(&view, "abc.txt");
        let hash = view.content_sha1(&file).unwrap();
        assert_eq!(hash.to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(view.content_sha1(&file).unwrap(), hash);
        assert_eq!(view.view_debug_info().content_hash_cache.hits, 1);
    }

    #[test]
    fn batch_keeps_positions_around_directories() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(temp.path().join("dir")).unwrap();
        fs::write(temp.path().join("b.txt"), b"b").unwrap();
        let view = crawled(&temp);

        let files = vec![
            result_for(&view, "a.txt"),
            result_for(&view, "dir"),
            result_for(&view, "b.txt"),
        ];
        let hashes = view.content_sha1_batch(&files);
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes[0], view.content_sha1(&files[0]));
        assert!(hashes[1].is_err());
        assert_eq!(hashes[2], view.content_sha1(&files[2]));
        assert_ne!(hashes[0], hashes[2]);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_target_goes_through_cache() {
        let temp = TempDir::new().unwrap();
        std::os::unix::fs::symlink("elsewhere", temp.path().join("link")).unwrap();
        fs::write(temp.path().join("plain"), b"p").unwrap();
        let view = crawled(&temp);

        let link = result_for(&view, "link");
        assert_eq!(link.symlink_target, Some(PathBuf::from("elsewhere")));
        assert_eq!(view.symlink_target(&link), Ok(PathBuf::from("elsewhere")));
        assert!(view.symlink_target(&result_for(&view, "plain")).is_err());
    }
}
