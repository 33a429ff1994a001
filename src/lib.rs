//! # ods5fs: a read-only decoder for OpenVMS ODS-5/ODS-2 volumes
//!
//! This crate decodes the on-disk layout of an OpenVMS Files-11 volume
//! (home block, file headers, retrieval pointers, directory records) and
//! exposes it as a POSIX-shaped `Filesystem` trait: `lookup`, `getattr`,
//! `readdir`, `read`, `readlink`, `getxattr`, `statfs`. It never writes to
//! the volume; every mutating `Filesystem` method rejects with
//! [`vfs::VfsError::ReadOnlyFs`].
//!
//! ## Layout
//!
//! - [`block`]: device abstraction and ODS block-size scaling
//! - [`layout`]: on-disk structs (home block, `fh2`, `fat`, directory
//!   records) and the unaligned encode/decode helpers they're read through
//! - [`home`]: home-block validation and volume geometry
//! - [`fh`]: file-header location and validation
//! - [`mapping`]: VBN -> LBN resolution through retrieval pointers and
//!   extension-header chains
//! - [`dir`]: directory record scanning
//! - [`lookup`]: name/version resolution, including the symbolic-link
//!   dialect
//! - [`inode`]: POSIX attribute derivation from a validated header
//! - [`statfs`]: volume-wide statistics
//! - [`xattr`]: raw `fat`/`fh2` extended-attribute views
//! - [`charset`], [`time`], [`checksum`]: shared codecs
//! - [`options`]: mount option parsing
//! - [`vfs`]: the external `Filesystem` trait and its attribute/entry types
//! - [`fs`]: the orchestrator ([`fs::Ods5Fs`]) wiring everything above
//!   together
#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod block;
pub mod charset;
pub mod checksum;
pub mod dir;
pub mod error;
pub mod fh;
pub mod fs;
pub mod home;
pub mod inode;
pub mod layout;
pub mod lookup;
pub mod mapping;
pub mod options;
pub mod statfs;
pub mod time;
pub mod vfs;
pub mod xattr;

pub use error::{Ods5Error, Result};
pub use fs::Ods5Fs;
pub use options::{Charset, MountOptions};
pub use vfs::{Filesystem, InodeNum, VfsAttr, VfsDirEntry, VfsError, VfsFileType, VfsStatFs};
