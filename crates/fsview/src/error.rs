use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Timed out after {timeout:?} waiting for the view to sync")]
    SyncTimeout { timeout: Duration },

    #[error("View threads are stopping")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, ViewError>;

/// Error memoized by the caches.
///
/// Unlike [`ViewError`] this is `Clone`, because the same remembered failure
/// is handed to every lookup that hits it until its TTL runs out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("{kind:?}: {message}")]
    Io { kind: io::ErrorKind, message: String },

    #[error("file changed while it was being read: {0}")]
    ChangedWhileReading(PathBuf),
}

impl From<io::Error> for CacheError {
    fn from(error: io::Error) -> Self {
        CacheError::Io {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Returns true when a stat/open error means "the path is not there".
pub fn is_missing_path_error(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::NotFound {
        return true;
    }
    #[cfg(unix)]
    if error.raw_os_error() == Some(libc::ENOTDIR) {
        return true;
    }
    false
}
