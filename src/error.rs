//! Error taxonomy for the volume decoder.
//!
//! Mirrors the host-facing error codes a VMS-aware POSIX shim would surface,
//! without depending on `std::error::Error` (the crate is `no_std`).

use core::fmt;

/// Errors produced while decoding an ODS-5/ODS-2 volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ods5Error {
    /// Underlying block device read/write failed.
    Io,
    /// A structural invariant (home block, file header, directory record)
    /// was violated.
    Invalid,
    /// Name or FID does not resolve to anything.
    NotFound,
    /// Malformed UTF-8, or a name exceeding the on-disk length limit.
    BadName,
    /// Name exceeds `ODS5_FN_STRING_SIZE`/`ODS5_FILENAME_LEN`.
    NameTooLong,
    /// Extension-chain node allocation failed.
    NoMemory,
    /// File descriptor / handle is not valid.
    BadHandle,
    /// Caller lacks permission, or attempted a mutating operation.
    PermissionDenied,
    /// Buffer too small for the requested fixed-size structure.
    RangeError,
    /// Operation has no meaning for this filesystem (write path, ACLs, ...).
    NotSupported,
    /// Symlink resolution had no parent to report against.
    NoChild,
}

impl fmt::Display for Ods5Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Ods5Error::Io => "I/O error",
            Ods5Error::Invalid => "structural invariant violated",
            Ods5Error::NotFound => "not found",
            Ods5Error::BadName => "malformed name",
            Ods5Error::NameTooLong => "name too long",
            Ods5Error::NoMemory => "out of memory",
            Ods5Error::BadHandle => "bad handle",
            Ods5Error::PermissionDenied => "permission denied",
            Ods5Error::RangeError => "buffer too small",
            Ods5Error::NotSupported => "not supported",
            Ods5Error::NoChild => "no child entry",
        };
        f.write_str(s)
    }
}

/// POSIX-style errno, for hosts that want a numeric surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    Eio,
    Einval,
    Enoent,
    Efault,
    Ebadf,
    Eacces,
    Erange,
    Eopnotsupp,
    Enametoolong,
    Enomem,
    Echild,
}

impl Ods5Error {
    /// Maps to the POSIX-style codes enumerated in the external interface.
    pub fn errno(self) -> Errno {
        match self {
            Ods5Error::Io => Errno::Eio,
            Ods5Error::Invalid => Errno::Eio,
            Ods5Error::NotFound => Errno::Enoent,
            Ods5Error::BadName => Errno::Einval,
            Ods5Error::NameTooLong => Errno::Enametoolong,
            Ods5Error::NoMemory => Errno::Enomem,
            Ods5Error::BadHandle => Errno::Ebadf,
            Ods5Error::PermissionDenied => Errno::Eacces,
            Ods5Error::RangeError => Errno::Erange,
            Ods5Error::NotSupported => Errno::Eopnotsupp,
            Ods5Error::NoChild => Errno::Echild,
        }
    }
}

pub type Result<T> = core::result::Result<T, Ods5Error>;
