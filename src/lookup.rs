//! Name/version lookup (C8), including the symbolic-link dialect where a
//! bare name must match a trailing-dot or `.DIR`-suffixed directory record.

use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::block::{BlockDevice, BlockReader};
use crate::charset;
use crate::error::{Ods5Error, Result};
use crate::fh::FhInfo;
use crate::home::VolumeGeometry;
use crate::layout::{self, DirHeader, Fid, DIR_UCS2, NO_MORE_RECORDS, ODS5_FILENAME_LEN, ODS5_VERS_MAX};
use crate::mapping;
use crate::options::{Charset, MountOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    Found(Fid),
    NotFound,
}

/// A query name converted into its on-disk comparison form.
enum CompareForm {
    Isl1(Vec<u8>),
    Ucs2(Vec<u8>),
}

fn upcase_byte(b: u8) -> u8 {
    if b.is_ascii_lowercase() {
        b - 32
    } else {
        b
    }
}

/// Caseblind lexicographic comparison of two ISL-1 byte strings. Equal only
/// when both the caseblind prefix and the lengths match.
fn compare_caseblind(a: &[u8], b: &[u8]) -> Ordering {
    let n = a.len().min(b.len());
    for i in 0..n {
        let (ua, ub) = (upcase_byte(a[i]), upcase_byte(b[i]));
        match ua.cmp(&ub) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn ucs2_all_high_zero(words: &[u8]) -> bool {
    words.chunks_exact(2).all(|c| c[1] == 0)
}

fn ucs2_low_bytes(words: &[u8]) -> Vec<u8> {
    words.chunks_exact(2).map(|c| c[0]).collect()
}

/// Converts a query name to its comparison form per the mount's charset.
fn compare_form(name: &str, charset: Charset) -> Result<CompareForm> {
    match charset {
        Charset::Utf8 => {
            let ucs2 = charset::utf8_to_ucs2(name)?;
            if ucs2_all_high_zero(&ucs2) {
                Ok(CompareForm::Isl1(ucs2_low_bytes(&ucs2)))
            } else {
                Ok(CompareForm::Ucs2(ucs2))
            }
        }
        Charset::Vtf7 => {
            if name.contains('?') {
                Ok(CompareForm::Ucs2(charset::vtf7_to_ucs2(name)?))
            } else {
                Ok(CompareForm::Isl1(name.as_bytes().to_vec()))
            }
        }
    }
}

/// Splits `name;version` (or `name.version` under `dotversion`) at the last
/// delimiter, returning `(name, Some(version))`, or `(name, None)` if no
/// delimiter is present.
fn split_name_version(name: &str, dotversion: bool) -> (&str, Option<&str>) {
    let sep = if dotversion { '.' } else { ';' };
    match name.rfind(sep) {
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
        None => (name, None),
    }
}

/// One directory record, decoded far enough to drive both the versioned and
/// symlink-dialect matchers. Offsets only: the closure slices `name_bytes`
/// out of the block it's handed alongside this, sidestepping a borrow tied
/// to two separate closure parameters.
struct Record {
    name_type: u8,
    name_start: usize,
    namecount: usize,
    value_start: usize,
    record_end: usize,
}

impl Record {
    fn name_bytes<'b>(&self, block: &'b [u8]) -> &'b [u8] {
        &block[self.name_start..self.name_start + self.namecount]
    }
}

/// Iterates every directory record across every VBN, handing each to `f`.
/// `f` returns `Some(result)` to stop the walk early (an abort or a hit);
/// `None` to continue to the next record.
fn scan_records<D: BlockDevice>(
    reader: &BlockReader<D>,
    geometry: &VolumeGeometry,
    fh: &FhInfo,
    size: u64,
    mut f: impl FnMut(&[u8], Record) -> Option<LookupResult>,
) -> Result<LookupResult> {
    let mut vbn = 1u32;
    loop {
        let block_start = (vbn as u64 - 1) * crate::block::ODS5_BLOCK_SIZE as u64;
        if block_start >= size {
            return Ok(LookupResult::NotFound);
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
            let padded_namelen = (namecount + 1) & !1;
            let value_start = name_start + padded_namelen;
            let record_end = fnoff + 2 + dirhdr.size as usize;
            if record_end > block.len() {
                break;
            }

            let record = Record {
                name_type: flags.name_type(),
                name_start,
                namecount,
                value_start,
                record_end,
            };
            if let Some(result) = f(&block, record) {
                return Ok(result);
            }

            fnoff = record_end;
        }
        vbn += 1;
    }
}

/// Resolves `name;version` against a directory. `name` with no version
/// delimiter falls through to the symlink dialect iff `options.syml`.
pub fn lookup<D: BlockDevice>(
    reader: &BlockReader<D>,
    geometry: &VolumeGeometry,
    fh: &FhInfo,
    options: &MountOptions,
    size: u64,
    name: &str,
) -> Result<LookupResult> {
    if name.len() > ODS5_FILENAME_LEN {
        return Err(Ods5Error::NameTooLong);
    }

    let (base, version_str) = split_name_version(name, options.dotversion);
    let version = match version_str {
        Some(v) => {
            let parsed: u16 = v.parse().map_err(|_| Ods5Error::BadName)?;
            if parsed == 0 || parsed > ODS5_VERS_MAX {
                return Err(Ods5Error::BadName);
            }
            parsed
        }
        None => {
            return if options.syml {
                lookup_symlink(reader, geometry, fh, size, name)
            } else {
                Ok(LookupResult::NotFound)
            };
        }
    };

    let form = compare_form(base, options.charset)?;

    scan_records(reader, geometry, fh, size, |block, record| {
        let name_bytes = record.name_bytes(block);
        let name_matches = match (&form, record.name_type) {
            (CompareForm::Ucs2(qwords), DIR_UCS2) => qwords.as_slice() == name_bytes,
            (CompareForm::Ucs2(_), _) => false,
            (CompareForm::Isl1(_), DIR_UCS2) => false,
            (CompareForm::Isl1(qbytes), _) => {
                // Comparing query against the record's name: the directory
                // is sorted ascending, so once a record's name exceeds the
                // query no later record can match either.
                match compare_caseblind(qbytes, name_bytes) {
                    Ordering::Less => return Some(LookupResult::NotFound),
                    Ordering::Greater => return None,
                    Ordering::Equal => true,
                }
            }
        };
        if !name_matches {
            return None;
        }

        let mut vfoff = record.value_start;
        while vfoff + layout::DIRENT_SIZE <= record.record_end {
            let dirent: layout::DirEnt = layout::decode(&block[vfoff..]).ok()?;
            if dirent.version == NO_MORE_RECORDS {
                break;
            }
            match dirent.version.cmp(&version) {
                Ordering::Equal => return Some(LookupResult::Found(dirent.fid)),
                Ordering::Less => return Some(LookupResult::NotFound),
                Ordering::Greater => {}
            }
            vfoff += layout::DIRENT_SIZE;
        }
        Some(LookupResult::NotFound)
    })
}

/// Symlink-dialect match: the bare name, `name.DIR`, and (when the query has
/// no `.` or ends in one) `name.`, matched caseblind against ISL-1 records
/// only. Unlike the versioned path this walks the whole directory (no sort
/// pruning, since several differently-lengthed candidates are live at once)
/// and returns the highest-version hit across every candidate.
fn lookup_symlink<D: BlockDevice>(
    reader: &BlockReader<D>,
    geometry: &VolumeGeometry,
    fh: &FhInfo,
    size: u64,
    name: &str,
) -> Result<LookupResult> {
    let base = charset::utf8_to_isl1(name)?;
    let mut candidates: Vec<Vec<u8>> = Vec::new();
    let mut dir_variant = base.clone();
    dir_variant.extend_from_slice(b".DIR");
    candidates.push(dir_variant);
    candidates.push(base.clone());
    if !name.contains('.') || name.ends_with('.') {
        let mut dotted = base;
        dotted.push(b'.');
        candidates.push(dotted);
    }

    let mut best: Option<(u16, Fid)> = None;

    scan_records(reader, geometry, fh, size, |block, record| {
        if record.name_type == DIR_UCS2 {
            return None;
        }
        let name_bytes = record.name_bytes(block);
        let is_candidate = candidates
            .iter()
            .any(|c| compare_caseblind(c, name_bytes) == Ordering::Equal);
        if !is_candidate {
            return None;
        }
        if record.value_start + layout::DIRENT_SIZE > record.record_end {
            return None;
        }
        // Versions within a record are sorted descending: the first value
        // field is the record's highest version.
        if let Ok(dirent) = layout::decode::<layout::DirEnt>(&block[record.value_start..]) {
            if dirent.version != NO_MORE_RECORDS {
                let better = match best {
                    Some((v, _)) => dirent.version > v,
                    None => true,
                };
                if better {
                    best = Some((dirent.version, dirent.fid));
                }
            }
        }
        None
    })?;

    Ok(match best {
        Some((_, fid)) => LookupResult::Found(fid),
        None => LookupResult::NotFound,
    })
}
