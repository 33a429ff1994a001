//! Extended attributes / ioctl equivalents (C11): raw `fat` and `fh2` byte
//! views, matching `ioctl.c`'s `GETFAT`/`GETFH` and the `user.fat`/`user.fh`
//! attribute names.

use alloc::vec::Vec;

use crate::block::{BlockDevice, BlockReader};
use crate::error::{Ods5Error, Result};
use crate::fh::{self, FhInfo};
use crate::home::VolumeGeometry;
use crate::layout::{self, Fid};

/// Copies `src` into `buffer`, honouring the size-probe convention: a
/// zero-length `buffer` returns `src.len()` without copying anything, and a
/// too-small nonempty buffer fails with `RangeError` (-> `ERANGE`).
pub fn read_attr(src: &[u8], buffer: &mut [u8]) -> Result<usize> {
    if buffer.is_empty() {
        return Ok(src.len());
    }
    if buffer.len() < src.len() {
        return Err(Ods5Error::RangeError);
    }
    buffer[..src.len()].copy_from_slice(src);
    Ok(src.len())
}

/// Raw 32-byte record-attribute area (`user.fat` / `GETFAT`). Served from
/// the inode's already-validated, cached `recattr` — no re-read needed since
/// it was copied out of a validated header at `iget` time.
pub fn fat_bytes(fh: &FhInfo) -> Vec<u8> {
    layout::encode(&fh.recattr)
}

/// Raw 512-byte file header (`user.fh` / `GETFH`). Unlike `fat_bytes`, this
/// re-reads and re-validates the header on every access: a changed on-disk
/// header invalidates whatever was cached at `iget` time, and callers of
/// this attribute want the current header, not a stale snapshot.
pub fn fh_bytes<D: BlockDevice>(
    reader: &BlockReader<D>,
    geometry: &VolumeGeometry,
    index_fh: Option<&FhInfo>,
    fnum: u32,
    expected: Fid,
) -> Result<Vec<u8>> {
    let (raw, _fh2) = fh::read_fh(reader, geometry, index_fh, fnum, expected)?;
    Ok(raw.to_vec())
}
