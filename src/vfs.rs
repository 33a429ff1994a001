//! External POSIX-shaped interface, grounded on the teacher's `fs::vfs`
//! module: a narrow `Filesystem` trait plus the attribute/entry/error types
//! an embedder (FUSE shim, kernel VFS glue, whatever) adapts to its own
//! surface.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::Ods5Error;

/// Inode number, in the host's numbering: `Fid::ino()` for every file this
/// crate resolves.
pub type InodeNum = u64;

/// Errors surfaced across the external interface. `From<Ods5Error>` folds
/// the decoder's internal taxonomy down to this one, coarser where the
/// internal distinction (e.g. `NoMemory` vs `Io`) isn't meaningful to a
/// caller outside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    NotFound,
    PermissionDenied,
    NotADirectory,
    NotAFile,
    IsADirectory,
    RangeError,
    InvalidArgument,
    IoError,
    NotSupported,
    NameTooLong,
    ReadOnlyFs,
    NoFilesystem,
}

impl From<Ods5Error> for VfsError {
    fn from(err: Ods5Error) -> Self {
        match err {
            Ods5Error::Io => VfsError::IoError,
            Ods5Error::Invalid => VfsError::IoError,
            Ods5Error::NotFound => VfsError::NotFound,
            Ods5Error::BadName => VfsError::InvalidArgument,
            Ods5Error::NameTooLong => VfsError::NameTooLong,
            Ods5Error::NoMemory => VfsError::IoError,
            Ods5Error::BadHandle => VfsError::InvalidArgument,
            Ods5Error::PermissionDenied => VfsError::PermissionDenied,
            Ods5Error::RangeError => VfsError::RangeError,
            Ods5Error::NotSupported => VfsError::NotSupported,
            Ods5Error::NoChild => VfsError::NotFound,
        }
    }
}

/// File type, the POSIX-shaped analogue of [`crate::inode::FileKind`] (which
/// carries only the three kinds this read-only volume format can produce).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsFileType {
    Regular,
    Directory,
    Symlink,
}

impl From<crate::inode::FileKind> for VfsFileType {
    fn from(kind: crate::inode::FileKind) -> Self {
        match kind {
            crate::inode::FileKind::Regular => VfsFileType::Regular,
            crate::inode::FileKind::Directory => VfsFileType::Directory,
            crate::inode::FileKind::Symlink => VfsFileType::Symlink,
        }
    }
}

/// Inode attributes (stat data), seconds-resolution POSIX times.
#[derive(Debug, Clone, Copy)]
pub struct VfsAttr {
    pub ino: InodeNum,
    pub file_type: VfsFileType,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlink: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl From<crate::inode::Attr> for VfsAttr {
    fn from(attr: crate::inode::Attr) -> Self {
        Self {
            ino: attr.ino,
            file_type: attr.kind.into(),
            mode: attr.mode,
            uid: attr.uid,
            gid: attr.gid,
            size: attr.size,
            nlink: attr.nlink,
            atime: attr.atime.sec,
            mtime: attr.mtime.sec,
            ctime: attr.ctime.sec,
        }
    }
}

/// One directory entry: rendered name (already version-suffixed per
/// [`crate::dir::Entry`]) and the inode it resolves to.
#[derive(Debug, Clone)]
pub struct VfsDirEntry {
    pub name: String,
    pub ino: InodeNum,
    pub file_type: VfsFileType,
}

/// Volume-wide statistics, the POSIX `statvfs` shape.
#[derive(Debug, Clone, Copy)]
pub struct VfsStatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
}

/// Filesystem operations trait. Every mutating method has a default that
/// rejects with [`VfsError::ReadOnlyFs`]; implementors of a read-only
/// volume format never override them.
pub trait Filesystem: Send + Sync {
    fn name(&self) -> &'static str;

    fn lookup(&self, parent: InodeNum, name: &str) -> Result<InodeNum, VfsError>;

    fn getattr(&self, ino: InodeNum) -> Result<VfsAttr, VfsError>;

    fn readdir(&self, ino: InodeNum) -> Result<Vec<VfsDirEntry>, VfsError>;

    fn read(&self, ino: InodeNum, offset: u64, size: usize) -> Result<Vec<u8>, VfsError>;

    fn readlink(&self, ino: InodeNum) -> Result<String, VfsError> {
        let _ = ino;
        Err(VfsError::NotSupported)
    }

    fn getxattr(&self, ino: InodeNum, name: &str, buffer: &mut [u8]) -> Result<usize, VfsError> {
        let _ = (ino, name, buffer);
        Err(VfsError::NotSupported)
    }

    fn statfs(&self) -> Result<VfsStatFs, VfsError>;

    fn write(&self, ino: InodeNum, offset: u64, data: &[u8]) -> Result<usize, VfsError> {
        let _ = (ino, offset, data);
        Err(VfsError::ReadOnlyFs)
    }

    fn create(&self, parent: InodeNum, name: &str, file_type: VfsFileType) -> Result<InodeNum, VfsError> {
        let _ = (parent, name, file_type);
        Err(VfsError::ReadOnlyFs)
    }

    fn unlink(&self, parent: InodeNum, name: &str) -> Result<(), VfsError> {
        let _ = (parent, name);
        Err(VfsError::ReadOnlyFs)
    }

    fn rename(&self, old_parent: InodeNum, old_name: &str, new_parent: InodeNum, new_name: &str) -> Result<(), VfsError> {
        let _ = (old_parent, old_name, new_parent, new_name);
        Err(VfsError::ReadOnlyFs)
    }

    fn truncate(&self, ino: InodeNum, size: u64) -> Result<(), VfsError> {
        let _ = (ino, size);
        Err(VfsError::ReadOnlyFs)
    }

    fn sync(&self) -> Result<(), VfsError> {
        Ok(())
    }
}
