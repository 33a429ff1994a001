//! File-header reader (C5): locates and validates `fh2` records, and holds
//! the per-inode state (`FhInfo`) the mapping engine extends lazily.

use alloc::vec::Vec;
use spin::RwLock;

use crate::block::{BlockDevice, BlockReader};
use crate::checksum::word_sum;
use crate::error::{Ods5Error, Result};
use crate::home::VolumeGeometry;
use crate::layout::{self, Fh2, Fid, FH2_HIGHWATER_WORD_OFFSET};
use crate::mapping::{self, Fm2};

/// Byte offset of the `checksum` field within `fh2`.
const FH2_CHECKSUM_OFFSET: usize = 510;

/// One link of the lazily-extended retrieval-pointer chain.
pub struct ExtNode {
    pub ext_fid: Fid,
    pub map: Vec<Fm2>,
}

/// Per-inode state: the record-attribute area, the primary retrieval
/// pointers, and the append-only chain of extension headers. Chain
/// extension is guarded by an `RwLock`: readers take a cheap read lock to
/// traverse already-published nodes; an appender takes the write lock,
/// double-checks under it (a concurrent appender may have already added the
/// node it's about to fetch), and pushes exactly once.
pub struct FhInfo {
    pub fid: Fid,
    pub recattr: crate::layout::Fat,
    pub filechar: crate::layout::FileChar,
    pub linkcount: u16,
    pub fileprot: u16,
    pub fileowner: crate::layout::Uic,
    primary_map: Vec<Fm2>,
    primary_ext_fid: Fid,
    chain: RwLock<Vec<ExtNode>>,
}

impl FhInfo {
    pub fn primary_map(&self) -> &[Fm2] {
        &self.primary_map
    }

    pub fn primary_ext_fid(&self) -> Fid {
        self.primary_ext_fid
    }

    pub fn chain_len(&self) -> usize {
        self.chain.read().len()
    }

    /// Runs `f` against the chain node at `index` under a read lock.
    pub fn with_chain_node<R>(&self, index: usize, f: impl FnOnce(&ExtNode) -> R) -> Option<R> {
        let chain = self.chain.read();
        chain.get(index).map(f)
    }

    /// Appends a freshly-fetched node if the chain is still exactly
    /// `expected_len` long (i.e. no peer appended while we fetched it).
    /// Returns `true` if this call published the node.
    pub fn try_append(&self, expected_len: usize, node: ExtNode) -> bool {
        let mut chain = self.chain.write();
        if chain.len() != expected_len {
            return false;
        }
        chain.push(node);
        true
    }
}

/// Validates a decoded `fh2` against the FID it was expected to be read
/// under. `rvn` is deliberately not compared (volume sets are a non-goal).
/// Offsets are word-granular (`idoffset`, `mpoffset`, `acoffset`,
/// `rsoffset`), not byte-granular.
pub fn is_used_fh2(raw: &[u8], fh2: &Fh2, expected: &Fid) -> Result<()> {
    let checksum = word_sum(&raw[0..FH2_CHECKSUM_OFFSET]);
    let stored_checksum = fh2.checksum;
    if checksum != stored_checksum {
        return Err(Ods5Error::Invalid);
    }

    let idoffset = fh2.idoffset;
    let mpoffset = fh2.mpoffset;
    let acoffset = fh2.acoffset;
    let rsoffset = fh2.rsoffset;
    // idoffset == 0 is a sentinel for "no ident area" and is exempt from the
    // highwater-offset floor below (the inode materialiser falls back to a
    // host-supplied wall-clock time in that case).
    if idoffset != 0 && idoffset < FH2_HIGHWATER_WORD_OFFSET {
        return Err(Ods5Error::Invalid);
    }
    if idoffset > mpoffset || mpoffset > acoffset || acoffset > rsoffset {
        return Err(Ods5Error::Invalid);
    }

    let major = fh2.struclev_major();
    let minor = fh2.struclev_minor();
    let struclev_ok = matches!(major, 2 | 5) && minor >= 1;
    if !struclev_ok {
        return Err(Ods5Error::Invalid);
    }

    let map_inuse = fh2.map_inuse;
    if map_inuse > acoffset - mpoffset {
        return Err(Ods5Error::Invalid);
    }

    let fid = fh2.fid;
    if !fid.matches(expected) {
        return Err(Ods5Error::Invalid);
    }

    Ok(())
}

/// Reads and validates the header for file number `fnum`. For
/// `fnum <= ODS5_LAST_FIXED_FH` the header sits at a fixed LBN in INDEXF.SYS;
/// otherwise it must be located via the mapping engine on INDEXF.SYS's own
/// inode, which `index_fh` supplies (the index file itself never needs this
/// path, since file #1 is always within the fixed region).
pub fn read_fh<D: BlockDevice>(
    reader: &BlockReader<D>,
    geometry: &VolumeGeometry,
    index_fh: Option<&FhInfo>,
    fnum: u32,
    expected: Fid,
) -> Result<([u8; layout::FH2_SIZE], Fh2)> {
    let raw = if fnum <= layout::ODS5_LAST_FIXED_FH as u32 {
        let lbn = geometry.indexflbn + (fnum - 1);
        reader.read_block(lbn)?
    } else {
        let index_fh = index_fh.ok_or(Ods5Error::Invalid)?;
        let vbn = 4 * geometry.cluster as u32 + geometry.ibmapsize + fnum;
        let (lbn, _extent) = mapping::map_vbn(reader, geometry, index_fh, vbn)?;
        reader.read_block(lbn)?
    };

    let fh2: Fh2 = layout::decode(&raw)?;
    is_used_fh2(&raw, &fh2, &expected)?;

    let mut buf = [0u8; layout::FH2_SIZE];
    buf.copy_from_slice(&raw[..layout::FH2_SIZE]);
    Ok((buf, fh2))
}

/// Builds the in-memory `FhInfo` for a freshly-read, already-validated
/// header: decodes the primary retrieval-pointer slice out of the raw
/// bytes at word offset `mpoffset`, length `map_inuse` words.
pub fn build_fh_info(raw: &[u8], fh2: &Fh2) -> Result<FhInfo> {
    let mpoffset = fh2.mpoffset as usize;
    let map_inuse = fh2.map_inuse as usize;
    let start = mpoffset * 2;
    let end = start + map_inuse * 2;
    if end > raw.len() {
        return Err(Ods5Error::Invalid);
    }
    let primary_map = mapping::decode_fm2_words(&raw[start..end])?;

    Ok(FhInfo {
        fid: fh2.fid,
        recattr: fh2.recattr,
        filechar: fh2.filechar(),
        linkcount: fh2.linkcount,
        fileprot: fh2.fileprot,
        fileowner: fh2.fileowner,
        primary_map,
        primary_ext_fid: fh2.ext_fid,
        chain: RwLock::new(Vec::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Fat, FileChar, Uic};
    use alloc::vec;

    fn sample_fh2_bytes(fid: Fid, ext_fid: Fid) -> Vec<u8> {
        let mut buf = vec![0u8; layout::FH2_SIZE];
        // idoffset = mpoffset = acoffset = rsoffset = FH2_HIGHWATER_WORD_OFFSET
        // (no ident area, no map, no access area, no reserved area): valid.
        let off = FH2_HIGHWATER_WORD_OFFSET;
        buf[0] = off;
        buf[1] = off;
        buf[2] = off;
        buf[3] = off;
        // struclev: major=5 (low byte), minor=1 (high byte) -> 0x0105
        buf[6..8].copy_from_slice(&0x0105u16.to_le_bytes());
        // fid at offset 8 (num,seq,rvn,nmx)
        buf[8..10].copy_from_slice(&fid.num.to_le_bytes());
        buf[10..12].copy_from_slice(&fid.seq.to_le_bytes());
        buf[12] = fid.rvn;
        buf[13] = fid.nmx;
        // ext_fid at offset 14
        buf[14..16].copy_from_slice(&ext_fid.num.to_le_bytes());
        buf[16..18].copy_from_slice(&ext_fid.seq.to_le_bytes());
        buf[18] = ext_fid.rvn;
        buf[19] = ext_fid.nmx;
        // map_inuse = 0 at offset 58
        buf[58] = 0;

        let checksum = word_sum(&buf[0..FH2_CHECKSUM_OFFSET]);
        buf[510..512].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    #[test]
    fn valid_header_passes_and_matches_fid() {
        let fid = Fid { num: 10, seq: 1, rvn: 0, nmx: 0 };
        let buf = sample_fh2_bytes(fid, Fid { num: 0, seq: 0, rvn: 0, nmx: 0 });
        let fh2: Fh2 = layout::decode(&buf).unwrap();
        assert!(is_used_fh2(&buf, &fh2, &fid).is_ok());
    }

    #[test]
    fn mismatched_fid_rejected() {
        let fid = Fid { num: 10, seq: 1, rvn: 0, nmx: 0 };
        let other = Fid { num: 11, seq: 1, rvn: 0, nmx: 0 };
        let buf = sample_fh2_bytes(fid, Fid { num: 0, seq: 0, rvn: 0, nmx: 0 });
        let fh2: Fh2 = layout::decode(&buf).unwrap();
        assert!(is_used_fh2(&buf, &fh2, &other).is_err());
    }

    #[test]
    fn struclev_minor_zero_is_rejected_strictly() {
        let fid = Fid { num: 10, seq: 1, rvn: 0, nmx: 0 };
        let mut buf = sample_fh2_bytes(fid, Fid { num: 0, seq: 0, rvn: 0, nmx: 0 });
        buf[6..8].copy_from_slice(&0x0005u16.to_le_bytes()); // major=5,minor=0
        let checksum = word_sum(&buf[0..FH2_CHECKSUM_OFFSET]);
        buf[510..512].copy_from_slice(&checksum.to_le_bytes());
        let fh2: Fh2 = layout::decode(&buf).unwrap();
        assert!(is_used_fh2(&buf, &fh2, &fid).is_err());
    }
}
