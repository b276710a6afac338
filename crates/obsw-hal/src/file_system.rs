//! File-system abstraction consumed by the storage and logging layers.
//!
//! A deliberately narrow, handle-based interface: the backing
//! implementation may be a flash translation layer, a POSIX directory or
//! the in-memory test double in [`crate::memory_fs`]. All fallible
//! operations return the single [`FsError`] taxonomy.

use obsw_base::GpsTime;
use thiserror::Error;

/// Upper bound for path lengths accepted by implementations.
pub const MAX_PATH_LENGTH: usize = 256;

pub type FileSize = u64;
pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// End of file or no further directory entries.
    #[error("end of data")]
    EndOfData,
    #[error("file or directory not found")]
    NotFound,
    #[error("no permission")]
    AccessDenied,
    #[error("file, directory or partition full")]
    NoSpace,
    /// Write attempted on a read-only mount or handle.
    #[error("cannot write")]
    ReadOnly,
    /// Read attempted on a write-only handle.
    #[error("cannot read")]
    WriteOnly,
    #[error("already exists")]
    AlreadyExists,
    /// Removed directory is not empty.
    #[error("directory not empty")]
    NotEmpty,
    #[error("operation requires a file")]
    NotAFile,
    #[error("operation requires a directory")]
    NotADirectory,
    #[error("malformed parameter")]
    InvalidInput,
    #[error("internal resource exhausted")]
    ResourceExhausted,
    #[error("operation not allowed in this state")]
    InvalidState,
    #[error("error in underlying driver or hardware")]
    IoError,
    #[error("not supported by this file system")]
    NotImplemented,
    /// Related file is open by another operation.
    #[error("file in use")]
    FileInUse,
    /// File system used without mounting it first.
    #[error("not mounted")]
    NotMounted,
    #[error("unspecified failure")]
    Other,
}

/// Object permission bitmask: read 1, write 2, execute 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission(u8);

impl Permission {
    pub const R: Permission = Permission(0b001);
    pub const W: Permission = Permission(0b010);
    pub const X: Permission = Permission(0b100);
    pub const RW: Permission = Permission(0b011);
    pub const RWX: Permission = Permission(0b111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Permission(bits & 0b111)
    }

    pub const fn is_set(self, other: Permission) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_readable(self) -> bool {
        self.is_set(Self::R)
    }

    pub const fn is_writable(self) -> bool {
        self.is_set(Self::W)
    }

    pub const fn is_executable(self) -> bool {
        self.is_set(Self::X)
    }
}

impl std::ops::BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMask(u8);

impl OpenMask {
    pub const READ: OpenMask = OpenMask(0b00001);
    pub const WRITE: OpenMask = OpenMask(0b00010);
    pub const EXECUTE: OpenMask = OpenMask(0b00100);
    pub const APPEND: OpenMask = OpenMask(0b01000);
    /// Create the file if it does not exist; requires an existing parent
    /// directory.
    pub const CREATE: OpenMask = OpenMask(0b10000);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_set(self, other: OpenMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpenMask {
    type Output = OpenMask;

    fn bitor(self, rhs: OpenMask) -> OpenMask {
        OpenMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Relative to the start of the file.
    Set,
    /// Relative to the current position.
    Current,
    /// Relative to the end of the file.
    End,
}

/// Open-file handle. Valid until passed to [`FileSystem::close`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FileHandle(pub(crate) u64);

/// Open-directory handle. Valid until passed to
/// [`FileSystem::close_dir`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DirHandle(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// Result of an info query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Info {
    pub kind: FileKind,
    pub size: FileSize,
    pub permission: Permission,
    pub creation_time: GpsTime,
    pub modify_time: GpsTime,
}

impl Info {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

pub trait FileSystem: Send {
    fn is_mounted(&self) -> bool;

    /// Mounts the file system; `read_only` forbids every modification.
    fn mount(&mut self, read_only: bool) -> FsResult<()>;

    fn unmount(&mut self) -> FsResult<()>;

    fn mkdir(&mut self, path: &str, permission: Permission) -> FsResult<()>;

    fn create_file(&mut self, path: &str, permission: Permission) -> FsResult<()>;

    fn open(&mut self, path: &str, mask: OpenMask) -> FsResult<FileHandle>;

    fn close(&mut self, file: FileHandle) -> FsResult<()>;

    /// Reads up to `dst.len()` bytes at the current position. At the end of
    /// the file `EndOfData` is returned.
    fn read(&mut self, file: &FileHandle, dst: &mut [u8]) -> FsResult<usize>;

    /// Writes `src` at the current position; returns the bytes written.
    fn write(&mut self, file: &FileHandle, src: &[u8]) -> FsResult<usize>;

    /// Moves the position by `diff` relative to `mode`; returns the new
    /// absolute position.
    fn seek(&mut self, file: &FileHandle, diff: i64, mode: SeekMode) -> FsResult<FileSize>;

    fn flush(&mut self, file: &FileHandle) -> FsResult<()>;

    fn truncate(&mut self, path: &str, length: FileSize) -> FsResult<()>;

    fn rename(&mut self, source: &str, target: &str) -> FsResult<()>;

    fn copy(&mut self, source: &str, target: &str) -> FsResult<()>;

    fn chmod(&mut self, path: &str, permission: Permission) -> FsResult<()>;

    /// Removes a file or an empty directory.
    fn remove(&mut self, path: &str) -> FsResult<()>;

    fn open_dir(&mut self, path: &str) -> FsResult<DirHandle>;

    /// Returns the name of the next entry; `EndOfData` past the last one.
    fn read_dir(&mut self, dir: &DirHandle) -> FsResult<String>;

    fn rewind_dir(&mut self, dir: &DirHandle) -> FsResult<()>;

    fn close_dir(&mut self, dir: DirHandle) -> FsResult<()>;

    fn get_info(&self, path: &str) -> FsResult<Info>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_masks_compose() {
        let rw = Permission::R | Permission::W;
        assert_eq!(rw, Permission::RW);
        assert!(rw.is_readable());
        assert!(rw.is_writable());
        assert!(!rw.is_executable());
        assert!(Permission::RWX.is_set(rw));
        assert!(!rw.is_set(Permission::X));
    }

    #[test]
    fn permission_bits_round_trip() {
        assert_eq!(Permission::from_bits(0b101).bits(), 0b101);
        // out-of-range bits are masked off
        assert_eq!(Permission::from_bits(0xFF), Permission::RWX);
    }

    #[test]
    fn open_mask_composition() {
        let mask = OpenMask::READ | OpenMask::WRITE | OpenMask::CREATE;
        assert!(mask.is_set(OpenMask::READ));
        assert!(mask.is_set(OpenMask::CREATE));
        assert!(!mask.is_set(OpenMask::APPEND));
    }
}
