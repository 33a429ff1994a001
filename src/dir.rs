//! Directory record scanner (C7).
//!
//! The reference implementation exposes directory contents through a
//! resumable `(pos) -> entries` cursor suited to a single `getdents` call at
//! a time. This crate's external interface hands back a whole directory
//! listing per call (matching the teacher's `Filesystem::readdir`/
//! `Ext4Fs::read_directory`, which do the same), so the scanner here walks
//! every block once and returns the full `Vec` rather than reproducing the
//! cursor's bit-for-bit position arithmetic.

use alloc::string::String;
use alloc::vec::Vec;

use crate::block::{BlockDevice, BlockReader};
use crate::charset;
use crate::error::Result;
use crate::fh::FhInfo;
use crate::home::VolumeGeometry;
use crate::block::ODS5_BLOCK_SIZE;
use crate::layout::{self, DirHeader, Fid, DIR_ISL1, DIR_UCS2, NO_MORE_RECORDS, ODS5_MFD_INO};
use crate::mapping;
use crate::options::{Charset, MountOptions};

/// One emitted directory entry: the rendered, separator-and-version
/// terminated name, and the FID it resolves to.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub version: u16,
    pub fid: Fid,
}

/// Renders a directory record's raw name bytes according to its on-disk
/// name-type and the mount's charset mode.
fn render_name(name_type: u8, name_bytes: &[u8], charset: Charset) -> Result<String> {
    match name_type {
        DIR_UCS2 => match charset {
            Charset::Utf8 => charset::ucs2_to_utf8(name_bytes),
            Charset::Vtf7 => charset::ucs2_to_vtf7(name_bytes),
        },
        DIR_ISL1 => Ok(charset::isl1_to_utf8(name_bytes)),
        _ => Ok(charset::isl1_to_utf8(name_bytes)),
    }
}

/// Walks every VBN of a directory inode (`size` bytes long) and returns
/// every `(name, version, fid)` triple, applying MFD suppression per
/// `options.nomfd`.
pub fn read_all<D: BlockDevice>(
    reader: &BlockReader<D>,
    geometry: &VolumeGeometry,
    fh: &FhInfo,
    options: &MountOptions,
    size: u64,
) -> Result<Vec<Entry>> {
    let mut out = Vec::new();
    let mut vbn = 1u32;

    loop {
        let block_start = (vbn as u64 - 1) * ODS5_BLOCK_SIZE as u64;
        if block_start >= size {
            break;
        }
        let (lbn, _extent) = mapping::map_vbn(reader, geometry, fh, vbn)?;
        let block = reader.read_block(lbn)?;

        let mut fnoff = 0usize;
        while fnoff + 2 <= block.len() {
            let size_word = u16::from_le_bytes([block[fnoff], block[fnoff + 1]]);
            if size_word == NO_MORE_RECORDS {
                break;
            }
            let dirhdr: DirHeader = layout::decode(&block[fnoff..])?;
            let namecount = dirhdr.namecount as usize;
            let flags = layout::DirFlags(dirhdr.flags);
            let name_start = fnoff + layout::DIR_HEADER_SIZE;
            if name_start + namecount > block.len() {
                break;
            }
            let name_bytes = &block[name_start..name_start + namecount];
            let padded_namelen = (namecount + 1) & !1;
            let value_start = name_start + padded_namelen;
            let record_end = fnoff + 2 + dirhdr.size as usize;
            if record_end > block.len() {
                break;
            }

            let name = render_name(flags.name_type(), name_bytes, options.charset)?;
            let sep = if options.dotversion { '.' } else { ';' };

            let mut vfoff = value_start;
            while vfoff + layout::DIRENT_SIZE <= record_end {
                let dirent: layout::DirEnt = layout::decode(&block[vfoff..])?;
                let version = dirent.version;
                if version == NO_MORE_RECORDS {
                    // Record's value field continues in the next block;
                    // nothing further to emit from this fragment.
                    break;
                }
                let fid = dirent.fid;
                if !(options.nomfd && fid.ino() == ODS5_MFD_INO) {
                    let mut rendered = String::with_capacity(name.len() + 8);
                    rendered.push_str(&name);
                    rendered.push(sep);
                    rendered.push_str(&itoa_u16(version));
                    out.push(Entry { name: rendered, version, fid });
                }
                vfoff += layout::DIRENT_SIZE;
            }

            fnoff = record_end;
        }

        vbn += 1;
    }

    Ok(out)
}

/// Minimal decimal formatting helper (avoids pulling in `alloc::format!`
/// for a hot loop over every directory entry).
fn itoa_u16(mut value: u16) -> String {
    if value == 0 {
        return String::from("0");
    }
    let mut digits = Vec::with_capacity(5);
    while value > 0 {
        digits.push((b'0' + (value % 10) as u8) as char);
        value /= 10;
    }
    digits.iter().rev().collect()
}
