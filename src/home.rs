//! Home block validation (C4): structural checks plus the split two-field
//! checksum accumulator, and the derived volume geometry used by every
//! other component.

use log::{info, warn};

use crate::checksum::word_sum;
use crate::error::{Ods5Error, Result};
use crate::layout::{self, Home, ODS5_MAGIC_FORMAT, VOLCHAR_MASK_ODS2, VOLCHAR_MASK_ODS5};

/// Byte offset of `checksum1` within the home block.
const CHECKSUM1_OFFSET: usize = 58;
/// Byte offset of `checksum2` within the home block.
const CHECKSUM2_OFFSET: usize = 510;

/// Geometry derived from a validated home block, handed to every component
/// that needs cluster factor / index-file location / file-count limits.
#[derive(Debug, Clone, Copy)]
pub struct VolumeGeometry {
    pub cluster: u16,
    pub maxfiles: u32,
    pub resfiles: u32,
    pub ibmaplbn: u32,
    pub ibmapsize: u32,
    /// `ibmaplbn + ibmapsize`: LBN of the first block of INDEXF.SYS's fixed
    /// header region.
    pub indexflbn: u32,
    pub is_ods5: bool,
}

/// Validates a raw 512-byte home block, in the order the reference
/// implementation performs its checks, and derives volume geometry on
/// success.
pub fn validate(raw: &[u8]) -> Result<VolumeGeometry> {
    let home: Home = layout::decode(raw)?;

    if home.homelbn == 0 || home.alhomelbn == 0 || home.altidxlbn == 0 || home.ibmaplbn == 0 {
        warn!("ods5: home block has a zero-valued volume-copy LBN");
        return Err(Ods5Error::Invalid);
    }

    let k = home.cluster as u32;
    if k == 0 {
        warn!("ods5: home block cluster factor is zero");
        return Err(Ods5Error::Invalid);
    }
    let alhomevbn = home.alhomevbn as u32;
    let altidxvbn = home.altidxvbn as u32;
    let ibmapvbn = home.ibmapvbn as u32;
    if !(2 * k + 1..=3 * k).contains(&alhomevbn) {
        warn!("ods5: alhomevbn {} out of range for cluster {}", alhomevbn, k);
        return Err(Ods5Error::Invalid);
    }
    if !(3 * k + 1..=4 * k).contains(&altidxvbn) {
        warn!("ods5: altidxvbn {} out of range for cluster {}", altidxvbn, k);
        return Err(Ods5Error::Invalid);
    }
    if !(4 * k + 1..=5 * k).contains(&ibmapvbn) {
        warn!("ods5: ibmapvbn {} out of range for cluster {}", ibmapvbn, k);
        return Err(Ods5Error::Invalid);
    }

    if home.resfiles as u32 >= home.maxfiles || home.maxfiles >= (1 << 24) {
        warn!("ods5: resfiles/maxfiles out of range");
        return Err(Ods5Error::Invalid);
    }
    if home.ibmapsize == 0 {
        warn!("ods5: ibmapsize is zero");
        return Err(Ods5Error::Invalid);
    }
    if home.rvn != 0 {
        warn!("ods5: relative volume number is nonzero; volume sets unsupported");
        return Err(Ods5Error::Invalid);
    }

    let major = home.struclev_major();
    let minor = home.struclev_minor();
    let is_ods5 = match major {
        2 => false,
        5 => true,
        _ => {
            warn!("ods5: unrecognised struclev major {}", major);
            return Err(Ods5Error::Invalid);
        }
    };
    // The reference implementation tolerates a subversion of 0 here,
    // logging it rather than rejecting the mount; VMS itself never checks
    // it, neither on mount nor on ANALYZE/DISK. This leniency is home-block
    // specific: the file header's own struclev check (see `fh.rs`) is
    // strict about minor >= 1.
    if minor == 0 {
        info!("ods5: home block struclev subversion is 0 (unexpected but tolerated)");
    }

    let mask = if is_ods5 { VOLCHAR_MASK_ODS5 } else { VOLCHAR_MASK_ODS2 };
    if home.volchar & !mask != 0 {
        warn!("ods5: volchar has bits outside the defined mask");
        return Err(Ods5Error::Invalid);
    }

    if &home.format != ODS5_MAGIC_FORMAT {
        warn!("ods5: home block format field is not DECFILE11B");
        return Err(Ods5Error::Invalid);
    }

    let checksum1 = word_sum(&raw[0..CHECKSUM1_OFFSET]);
    if checksum1 != home.checksum1 {
        warn!("ods5: home block checksum1 mismatch");
        return Err(Ods5Error::Invalid);
    }
    // checksum2 continues the *same* running accumulator up through its own
    // offset, rather than restarting after checksum1.
    let checksum2 = word_sum(&raw[0..CHECKSUM2_OFFSET]);
    if checksum2 != home.checksum2 {
        warn!("ods5: home block checksum2 mismatch");
        return Err(Ods5Error::Invalid);
    }

    let maxfiles = home.maxfiles;
    info!(
        "ods5: mounted {} volume, cluster={}, maxfiles={}",
        if is_ods5 { "ODS-5" } else { "ODS-2" },
        k,
        maxfiles
    );

    Ok(VolumeGeometry {
        cluster: home.cluster,
        maxfiles: home.maxfiles,
        resfiles: home.resfiles as u32,
        ibmaplbn: home.ibmaplbn,
        ibmapsize: home.ibmapsize as u32,
        indexflbn: home.ibmaplbn + home.ibmapsize as u32,
        is_ods5,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    /// Builds a minimal valid home block matching spec scenario S1:
    /// `homelbn=1, alhomelbn=2, altidxlbn=14, cluster=1, struclev=0x0501,
    /// maxfiles=16, resfiles=5, ibmapsize=1, ibmaplbn=15`.
    fn sample_home_bytes() -> alloc::vec::Vec<u8> {
        let mut buf = vec![0u8; 512];
        buf[0..4].copy_from_slice(&1u32.to_le_bytes()); // homelbn
        buf[4..8].copy_from_slice(&2u32.to_le_bytes()); // alhomelbn
        buf[8..12].copy_from_slice(&14u32.to_le_bytes()); // altidxlbn
        buf[12..14].copy_from_slice(&0x0501u16.to_le_bytes()); // struclev (major=1? )
        // struclev byte layout: low byte = major, high byte = minor per
        // struclev_major/minor helpers (major = val & 0xFF). We want
        // major=5, minor=1: encode as 0x0105 so low byte=5, high byte=1.
        buf[12..14].copy_from_slice(&0x0105u16.to_le_bytes());
        buf[14..16].copy_from_slice(&1u16.to_le_bytes()); // cluster = 1 (K)
        buf[16..18].copy_from_slice(&0u16.to_le_bytes()); // homevbn
        buf[18..20].copy_from_slice(&3u16.to_le_bytes()); // alhomevbn in [3,3]
        buf[20..22].copy_from_slice(&4u16.to_le_bytes()); // altidxvbn in [4,4]
        buf[22..24].copy_from_slice(&5u16.to_le_bytes()); // ibmapvbn in [5,5]
        buf[24..28].copy_from_slice(&15u32.to_le_bytes()); // ibmaplbn
        buf[28..32].copy_from_slice(&16u32.to_le_bytes()); // maxfiles
        buf[32..34].copy_from_slice(&1u16.to_le_bytes()); // ibmapsize
        buf[34..36].copy_from_slice(&5u16.to_le_bytes()); // resfiles
        // volchar = 0 leaves rvn/volchar checks trivially satisfied.
        buf[496..508].copy_from_slice(ODS5_MAGIC_FORMAT);

        let checksum1 = word_sum(&buf[0..CHECKSUM1_OFFSET]);
        buf[58..60].copy_from_slice(&checksum1.to_le_bytes());
        let checksum2 = word_sum(&buf[0..CHECKSUM2_OFFSET]);
        buf[510..512].copy_from_slice(&checksum2.to_le_bytes());
        buf
    }

    #[test]
    fn valid_home_parses_geometry() {
        let buf = sample_home_bytes();
        let geom = validate(&buf).unwrap();
        assert_eq!(geom.cluster, 1);
        assert_eq!(geom.maxfiles, 16);
        assert_eq!(geom.resfiles, 5);
        assert_eq!(geom.indexflbn, 16);
        assert!(geom.is_ods5);
    }

    #[test]
    fn flipping_a_byte_breaks_checksum() {
        let mut buf = sample_home_bytes();
        buf[100] ^= 0xFF;
        assert!(validate(&buf).is_err());
    }

    #[test]
    fn zero_homelbn_rejected() {
        let mut buf = sample_home_bytes();
        buf[0..4].copy_from_slice(&0u32.to_le_bytes());
        assert!(validate(&buf).is_err());
    }
}
