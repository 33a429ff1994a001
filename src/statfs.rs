//! Volume statistics (C10): SCB read, storage-bitmap / index-bitmap
//! popcounts, cached after the first call.

use alloc::vec::Vec;
use spin::Once;

use crate::block::{BlockDevice, BlockReader};
use crate::checksum::popcount_bytes;
use crate::error::Result;
use crate::fh::FhInfo;
use crate::home::VolumeGeometry;
use crate::layout::{self, Scb};
use crate::mapping;

/// Volume-wide statistics, computed once per mount and cached.
#[derive(Debug, Clone, Copy)]
pub struct VolumeStats {
    /// Total blocks on the volume, from the SCB.
    pub volsize: u32,
    /// `maxfiles` from the home block: the file-ID ceiling.
    pub total_fids: u32,
    /// Popcount of the index-file header bitmap: file IDs currently in use.
    pub used_fids: u64,
    /// Popcount of the storage bitmap: free clusters.
    pub free_clusters: u64,
    pub cluster: u16,
}

impl VolumeStats {
    /// Free blocks, not clusters: `free_clusters * cluster`.
    pub fn free_blocks(&self) -> u64 {
        self.free_clusters * self.cluster as u64
    }
}

/// Once-initialised cache: concurrent callers racing to compute the same
/// value is fine (the double-check simply keeps the first winner), per the
/// volume-stats concurrency contract.
pub struct StatfsCache {
    inner: Once<VolumeStats>,
}

impl StatfsCache {
    pub const fn new() -> Self {
        Self { inner: Once::new() }
    }

    /// Returns the cached stats, computing and publishing them on first
    /// call. `bitmap_fh` is BITMAP.SYS's (file #2) materialised header.
    pub fn get_or_compute<D: BlockDevice>(
        &self,
        reader: &BlockReader<D>,
        geometry: &VolumeGeometry,
        bitmap_fh: &FhInfo,
    ) -> Result<VolumeStats> {
        if let Some(stats) = self.inner.get() {
            return Ok(*stats);
        }
        let stats = compute(reader, geometry, bitmap_fh)?;
        Ok(*self.inner.call_once(|| stats))
    }
}

impl Default for StatfsCache {
    fn default() -> Self {
        Self::new()
    }
}

fn index_bitmap_popcount<D: BlockDevice>(reader: &BlockReader<D>, geometry: &VolumeGeometry) -> Result<u64> {
    let raw = reader.read_blocks(geometry.ibmaplbn, geometry.ibmapsize)?;
    Ok(popcount_bytes(&raw))
}

/// Reads the SCB (VBN 1 of BITMAP.SYS) and popcounts exactly as many
/// trailing storage-bitmap bytes as `volsize`/`cluster` calls for (the bit
/// table owes one bit per cluster; any padding bits past the last real
/// cluster are excluded rather than trusted to be pre-zeroed).
fn storage_bitmap_popcount<D: BlockDevice>(
    reader: &BlockReader<D>,
    geometry: &VolumeGeometry,
    bitmap_fh: &FhInfo,
) -> Result<(u32, u64, u16)> {
    let (scb_lbn, _) = mapping::map_vbn(reader, geometry, bitmap_fh, 1)?;
    let scb_bytes = reader.read_block(scb_lbn)?;
    let scb: Scb = layout::decode(&scb_bytes)?;
    let volsize = scb.volsize;
    let cluster = scb.cluster;

    let total_clusters = (volsize as u64 + cluster as u64 - 1) / cluster as u64;
    let bitmap_bytes = ((total_clusters + 7) / 8) as usize;
    let blocks_needed = ((bitmap_bytes + 511) / 512) as u32;

    let mut bytes = Vec::with_capacity(bitmap_bytes);
    let mut remaining = bitmap_bytes;
    for i in 0..blocks_needed {
        let vbn = 2 + i;
        let (lbn, _) = mapping::map_vbn(reader, geometry, bitmap_fh, vbn)?;
        let block = reader.read_block(lbn)?;
        let take = remaining.min(block.len());
        bytes.extend_from_slice(&block[..take]);
        remaining -= take;
    }

    Ok((volsize, popcount_bytes(&bytes), cluster))
}

fn compute<D: BlockDevice>(
    reader: &BlockReader<D>,
    geometry: &VolumeGeometry,
    bitmap_fh: &FhInfo,
) -> Result<VolumeStats> {
    let used_fids = index_bitmap_popcount(reader, geometry)?;
    let (volsize, free_clusters, cluster) = storage_bitmap_popcount(reader, geometry, bitmap_fh)?;
    Ok(VolumeStats {
        volsize,
        total_fids: geometry.maxfiles,
        used_fids,
        free_clusters,
        cluster,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec;
    use spin::Mutex;

    struct MemDevice(Mutex<Vec<u8>>);
    impl BlockDevice for Arc<MemDevice> {
        fn block_size(&self) -> usize {
            512
        }
        fn read_blocks(&self, block: u64, buffer: &mut [u8]) -> core::result::Result<(), ()> {
            let data = self.0.lock();
            let start = block as usize * 512;
            buffer.copy_from_slice(&data[start..start + buffer.len()]);
            Ok(())
        }
    }

    fn direct_map_fh(lbn: u32) -> FhInfo {
        let mut bytes = [0u8; layout::FH2_SIZE];
        let w0: u16 = (2u16 << 14) | 1; // count = 2 words worth of VBNs
        bytes[0..2].copy_from_slice(&w0.to_le_bytes());
        bytes[2..4].copy_from_slice(&((lbn & 0xFFFF) as u16).to_le_bytes());
        bytes[4..6].copy_from_slice(&((lbn >> 16) as u16).to_le_bytes());
        bytes[58] = 3;
        let fh2: layout::Fh2 = layout::decode(&bytes).unwrap();
        crate::fh::build_fh_info(&bytes, &fh2).unwrap()
    }

    #[test]
    fn statfs_combines_index_and_storage_bitmaps() {
        // 3 blocks: index bitmap region (fixed LBN 10, 1 block), SCB at LBN
        // 0 (VBN 1 of BITMAP.SYS), storage bitmap at LBN 1 (VBN 2).
        let mut data = vec![0u8; 512 * 11];

        // SCB: volsize=16, cluster=1.
        let mut scb = vec![0u8; 512];
        scb[4..8].copy_from_slice(&16u32.to_le_bytes());
        scb[2..4].copy_from_slice(&1u16.to_le_bytes());
        data[0..512].copy_from_slice(&scb);

        // Storage bitmap: 2 bytes of real bits (16 clusters / 8), rest
        // unused. 0b0000_1111 then 0b1111_0000 -> 8 set bits.
        data[512] = 0b0000_1111;
        data[513] = 0b1111_0000;

        // Index bitmap at fixed LBN 10: one block, 3 bits set.
        data[10 * 512] = 0b0000_0111;

        let dev = Arc::new(MemDevice(Mutex::new(data)));
        let reader = BlockReader::new(dev).unwrap();
        let geometry = VolumeGeometry {
            cluster: 1,
            maxfiles: 16,
            resfiles: 5,
            ibmaplbn: 10,
            ibmapsize: 1,
            indexflbn: 11,
            is_ods5: true,
        };
        let bitmap_fh = direct_map_fh(0);
        let cache = StatfsCache::new();
        let stats = cache.get_or_compute(&reader, &geometry, &bitmap_fh).unwrap();
        assert_eq!(stats.volsize, 16);
        assert_eq!(stats.used_fids, 3);
        assert_eq!(stats.free_clusters, 8);
        assert_eq!(stats.free_blocks(), 8);
        assert_eq!(stats.total_fids, 16);
    }
}
