//! Stat snapshots kept on file records.

use std::fs::Metadata;

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    #[default]
    Unknown,
}

impl From<std::fs::FileType> for FileKind {
    fn from(file_type: std::fs::FileType) -> Self {
        if file_type.is_file() {
            FileKind::File
        } else if file_type.is_dir() {
            FileKind::Dir
        } else if file_type.is_symlink() {
            FileKind::Symlink
        } else {
            FileKind::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Timespec {
    pub secs: i64,
    pub nanos: u32,
}

impl Timespec {
    pub const fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    fn from_system_time(time: std::io::Result<std::time::SystemTime>) -> Self {
        time.ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| Self::new(d.as_secs() as i64, d.subsec_nanos()))
            .unwrap_or_default()
    }
}

/// The result of an lstat, trimmed to what the view compares and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub kind: FileKind,
    pub mode: u32,
    pub size: u64,
    pub ino: u64,
    pub dev: u64,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub mtime: Timespec,
    pub ctime: Timespec,
    pub atime: Timespec,
}

impl FileStat {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            kind: FileKind::from(metadata.file_type()),
            mode: metadata.mode(),
            size: metadata.size(),
            ino: metadata.ino(),
            dev: metadata.dev(),
            nlink: metadata.nlink(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            mtime: Timespec::new(metadata.mtime(), metadata.mtime_nsec() as u32),
            ctime: Timespec::new(metadata.ctime(), metadata.ctime_nsec() as u32),
            atime: Timespec::new(metadata.atime(), metadata.atime_nsec() as u32),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            kind: FileKind::from(metadata.file_type()),
            mode: if metadata.permissions().readonly() { 0o444 } else { 0o644 },
            size: metadata.len(),
            ino: 0,
            dev: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            mtime: Timespec::from_system_time(metadata.modified()),
            ctime: Timespec::from_system_time(metadata.created()),
            atime: Timespec::from_system_time(metadata.accessed()),
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    /// True when `fresh` differs from this snapshot in anything but atime.
    ///
    /// Reads bump atime, and a read must not be reported as a change.
    pub fn did_change(&self, fresh: &FileStat) -> bool {
        self.kind != fresh.kind
            || self.mode != fresh.mode
            || self.size != fresh.size
            || self.ino != fresh.ino
            || self.dev != fresh.dev
            || self.nlink != fresh.nlink
            || self.uid != fresh.uid
            || self.gid != fresh.gid
            || self.mtime != fresh.mtime
            || self.ctime != fresh.ctime
    }
}
