//! VBN -> LBN mapping engine (C6): retrieval-pointer decode/lookup, and the
//! lazy, concurrency-safe walk across a file's extension-header chain.

use alloc::vec::Vec;

use crate::block::{BlockDevice, BlockReader};
use crate::error::{Ods5Error, Result};
use crate::fh::{self, ExtNode, FhInfo};
use crate::home::VolumeGeometry;
use crate::layout::Fm2;

/// Decodes a run of retrieval-pointer words into tagged [`Fm2`] entries,
/// per the 2-bit format discriminator in the high bits of each entry's
/// first word.
pub fn decode_fm2_words(bytes: &[u8]) -> Result<Vec<Fm2>> {
    if bytes.len() % 2 != 0 {
        return Err(Ods5Error::Invalid);
    }
    let words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    let mut entries = Vec::new();
    let mut i = 0usize;
    while i < words.len() {
        let w0 = words[i];
        let fmt = (w0 >> 14) & 0x3;
        match fmt {
            0 => {
                entries.push(Fm2::Format0);
                i += 1;
            }
            1 => {
                if i + 2 > words.len() {
                    return Err(Ods5Error::Invalid);
                }
                let count = (w0 & 0xFF) as u32 + 1;
                let highlbn = ((w0 >> 8) & 0x3F) as u32;
                let lowlbn = words[i + 1] as u32;
                let lbn = (highlbn << 16) + lowlbn;
                entries.push(Fm2::Format1 { count, lbn });
                i += 2;
            }
            2 => {
                if i + 3 > words.len() {
                    return Err(Ods5Error::Invalid);
                }
                let count = (w0 & 0x3FFF) as u32 + 1;
                let lbn = words[i + 1] as u32 | ((words[i + 2] as u32) << 16);
                entries.push(Fm2::Format2 { count, lbn });
                i += 3;
            }
            3 => {
                if i + 4 > words.len() {
                    return Err(Ods5Error::Invalid);
                }
                let highcount = (w0 & 0x3FFF) as u32;
                let lowcount = words[i + 1] as u32;
                let count = (highcount << 16) + lowcount + 1;
                let lbn = words[i + 2] as u32 | ((words[i + 3] as u32) << 16);
                entries.push(Fm2::Format3 { count, lbn });
                i += 4;
            }
            _ => unreachable!(),
        }
    }
    Ok(entries)
}

/// Returns the `(count, lbn)` an entry contributes to the running sum, or
/// `None` for a format-0 placeholder (no count contribution).
fn entry_count_lbn(entry: &Fm2) -> Option<(u32, u32)> {
    match *entry {
        Fm2::Format0 => None,
        Fm2::Format1 { count, lbn } => Some((count, lbn)),
        Fm2::Format2 { count, lbn } => Some((count, lbn)),
        Fm2::Format3 { count, lbn } => Some((count, lbn)),
    }
}

/// Walks one map slice looking for `vbn`, advancing `sum` as it goes.
/// Returns `(lbn, extent)` on a hit, where `extent` is the run length
/// remaining at `lbn` co-linear with `vbn`.
fn lbn_lookup(entries: &[Fm2], vbn: u32, sum: &mut u32) -> Option<(u32, u32)> {
    for entry in entries {
        let (count, lbn) = match entry_count_lbn(entry) {
            Some(v) => v,
            None => continue,
        };
        if vbn <= *sum + count {
            let xlbn = lbn + (vbn - *sum) - 1;
            let extent = count - (xlbn - lbn);
            return Some((xlbn, extent));
        }
        *sum += count;
    }
    None
}

/// Resolves a virtual block number to `(lbn, extent)` for `fh`, fetching
/// and publishing extension-header nodes on demand.
///
/// Concurrency contract: the chain is append-only. This function only ever
/// reads already-published nodes under `FhInfo`'s read lock, or publishes
/// exactly one new node under its write lock with a double-checked length
/// comparison — a racing peer that already extended the chain is detected
/// and its result reused instead of creating a duplicate node.
pub fn map_vbn<D: BlockDevice>(
    reader: &BlockReader<D>,
    geometry: &VolumeGeometry,
    fh: &FhInfo,
    vbn: u32,
) -> Result<(u32, u32)> {
    let mut sum = 0u32;
    if let Some(r) = lbn_lookup(fh.primary_map(), vbn, &mut sum) {
        return Ok(r);
    }

    let mut ext_fid = fh.primary_ext_fid();
    let mut idx = 0usize;
    loop {
        if ext_fid.is_zero() {
            return Err(Ods5Error::NotFound);
        }

        if idx < fh.chain_len() {
            let outcome = fh
                .with_chain_node(idx, |node| (lbn_lookup(&node.map, vbn, &mut sum), node.ext_fid))
                .ok_or(Ods5Error::Io)?;
            if let (Some(hit), _) = outcome {
                return Ok(hit);
            }
            ext_fid = outcome.1;
            idx += 1;
            continue;
        }

        // Chain doesn't yet reach `idx`: fetch the extension header and
        // try to publish it. `fnum` for an extension FID is the file
        // number within INDEXF.SYS that the FID names.
        let fnum = ext_fid.num as u32 | ((ext_fid.nmx as u32) << 16);
        let (raw, fh2) = fh::read_fh(reader, geometry, Some(fh), fnum, ext_fid)?;
        let map = decode_fm2_words({
            let mpoffset = fh2.mpoffset as usize;
            let map_inuse = fh2.map_inuse as usize;
            let start = mpoffset * 2;
            let end = start + map_inuse * 2;
            if end > raw.len() {
                return Err(Ods5Error::Invalid);
            }
            &raw[start..end]
        })?;
        let node = ExtNode {
            ext_fid: fh2.ext_fid,
            map,
        };
        // If a peer already published this node while we were fetching,
        // `try_append` returns false and we just re-read at the same
        // index on the next loop iteration.
        fh.try_append(idx, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_format1_entry() {
        // count=4 (stored as 3), highlbn=0, format=1 (bits14-15), lowlbn=100.
        let w0: u16 = (1u16 << 14) | 3;
        let w1: u16 = 100;
        let bytes = [
            (w0 & 0xFF) as u8,
            (w0 >> 8) as u8,
            (w1 & 0xFF) as u8,
            (w1 >> 8) as u8,
        ];
        let entries = decode_fm2_words(&bytes).unwrap();
        assert_eq!(entries, alloc::vec![Fm2::Format1 { count: 4, lbn: 100 }]);
    }

    #[test]
    fn lbn_lookup_finds_covering_pointer_and_truncates_extent() {
        let entries = alloc::vec![Fm2::Format2 { count: 10, lbn: 1000 }];
        let mut sum = 0;
        let (lbn, extent) = lbn_lookup(&entries, 4, &mut sum).unwrap();
        assert_eq!(lbn, 1003);
        assert_eq!(extent, 7);
    }

    #[test]
    fn lbn_lookup_advances_sum_across_entries() {
        let entries = alloc::vec![
            Fm2::Format2 { count: 5, lbn: 100 },
            Fm2::Format2 { count: 5, lbn: 500 },
        ];
        let mut sum = 0;
        let (lbn, extent) = lbn_lookup(&entries, 7, &mut sum).unwrap();
        assert_eq!(lbn, 502);
        assert_eq!(extent, 3);
    }
}
