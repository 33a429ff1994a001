//! Inode materialiser (C9): turns a validated file header into a
//! POSIX-shaped attribute set (mode, uid/gid, size, times, nlink).

use crate::charset::isl1_utf8_growth;
use crate::error::Result;
use crate::layout::{self, Fat, Fh2, Fi2, Fi5, FileChar};
use crate::options::{Charset, MountOptions};
use crate::time::{v2utime, UnixTime};

pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFREG: u32 = 0o100_000;
pub const S_IFLNK: u32 = 0o120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Symlink,
    Regular,
}

/// POSIX-shaped attribute set derived from an `fh2`.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub ino: u64,
    pub kind: FileKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlink: u32,
    pub atime: UnixTime,
    pub mtime: UnixTime,
    pub ctime: UnixTime,
}

/// On-disk content length in bytes, before any charset-driven adjustment:
/// `(efblk-1)*512 + ffbyte`. Shared by [`derive_attr`] and by callers (e.g.
/// symlink target readers) that need to know how many bytes to read before
/// any UTF-8 growth is added on top.
pub fn raw_size_from_fat(recattr: &Fat) -> u64 {
    let efblk = recattr.efblk_block() as u64;
    let ffbyte = recattr.ffbyte as u64;
    efblk.saturating_sub(1) * 512 + ffbyte
}

/// Classifies a header's file kind, independent of `raw`/ident-area access.
pub fn file_kind(fh2: &Fh2) -> FileKind {
    let filechar = fh2.filechar();
    if filechar.contains(FileChar::DIRECTORY) {
        return FileKind::Directory;
    }
    let recattr: Fat = fh2.recattr;
    if recattr.fileorg() == layout::FAT_SPECIAL && recattr.rattrib == layout::FAT_SYMBOLIC_LINK {
        return FileKind::Symlink;
    }
    FileKind::Regular
}

fn permission_bits(fileprot: u16, extra_mode: u16) -> u32 {
    let prot = layout::Prot(fileprot);
    let grant = |nibble: u8| -> u32 {
        let mut bits = 0u32;
        if nibble & layout::DENY_READ == 0 {
            bits |= 0o4;
        }
        if nibble & layout::DENY_WRITE == 0 {
            bits |= 0o2;
        }
        if nibble & layout::DENY_EXEC == 0 {
            bits |= 0o1;
        }
        bits
    };
    let owner = grant(prot.owner()) << 6;
    let group = grant(prot.group()) << 3;
    let world = grant(prot.world());
    (owner | group | world) | extra_mode as u32
}

/// Derives the full POSIX attribute set for a validated header.
///
/// `hardlinks` is the mount's pre-masked `volchar & HARDLINKS` bit (ODS-5
/// only; meaningless for ODS-2). `link_content` is the whole symlink target,
/// required only when `file_kind(fh2) == Symlink` and the mount is in `utf8`
/// mode (the on-disk ISO-Latin-1 byte count under-reports the UTF-8 byte
/// count by one per high-bit byte). `fallback_now` is used only when the
/// header carries no ident area (`idoffset == 0`): there is no wall clock
/// available inside this crate, so the embedder supplies one.
pub fn derive_attr(
    raw: &[u8],
    fh2: &Fh2,
    is_ods5: bool,
    hardlinks: bool,
    options: &MountOptions,
    link_content: Option<&[u8]>,
    fallback_now: UnixTime,
) -> Result<Attr> {
    let kind = file_kind(fh2);
    let mode_bits = permission_bits(fh2.fileprot, options.mode);
    let kind_bits = match kind {
        FileKind::Directory => S_IFDIR,
        FileKind::Symlink => S_IFLNK,
        FileKind::Regular => S_IFREG,
    };

    let recattr: Fat = fh2.recattr;
    let mut size = raw_size_from_fat(&recattr);
    if kind == FileKind::Symlink && options.charset == Charset::Utf8 {
        if let Some(content) = link_content {
            size += isl1_utf8_growth(content) as u64;
        }
    }

    let idoffset = fh2.idoffset;
    let (ctime, mtime, atime) = if idoffset == 0 {
        (fallback_now, fallback_now, fallback_now)
    } else if is_ods5 {
        let fi5: Fi5 = layout::decode(&raw[idoffset as usize * 2..])?;
        (v2utime(fi5.attdate), v2utime(fi5.revdate), v2utime(fi5.accdate))
    } else {
        let fi2: Fi2 = layout::decode(&raw[idoffset as usize * 2..])?;
        let ctime = v2utime(fi2.credate);
        let mtime = v2utime(fi2.revdate);
        (ctime, mtime, mtime)
    };

    let linkcount = fh2.linkcount;
    let nlink = if is_ods5 && hardlinks { linkcount as u32 } else { 1 };

    Ok(Attr {
        ino: fh2.fid.ino(),
        kind,
        mode: kind_bits | mode_bits,
        uid: fh2.fileowner.mem as u32,
        gid: fh2.fileowner.grp as u32,
        size,
        nlink,
        atime,
        mtime,
        ctime,
    })
}
