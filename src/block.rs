//! Block device abstraction and ODS LBN → host-sector scaling (C3).

use crate::error::{Ods5Error, Result};
use alloc::vec;
use alloc::vec::Vec;

/// Size of one ODS-5/ODS-2 logical block, fixed by the on-disk format.
pub const ODS5_BLOCK_SIZE: usize = 512;

/// Abstraction over whatever sector-addressable device backs the volume.
///
/// Deliberately narrow: the decoder only ever reads. A host embedding this
/// crate over a richer block layer adapts that layer to this trait.
pub trait BlockDevice: Send + Sync {
    /// Size of one device sector/block, in bytes. Must be a power of two
    /// multiple of [`ODS5_BLOCK_SIZE`] (512, 1024, 2048 or 4096).
    fn block_size(&self) -> usize;

    /// Reads `buffer.len()` bytes starting at device block `block`.
    /// `buffer.len()` must be a multiple of `block_size()`.
    fn read_blocks(&self, block: u64, buffer: &mut [u8]) -> core::result::Result<(), ()>;
}

/// Scales 512-byte ODS logical block numbers onto a device's native block
/// size, fixed once at mount (`ioshifts = log2(device_blocksize / 512)`).
pub struct BlockReader<D: BlockDevice> {
    device: D,
    ioshifts: u32,
}

impl<D: BlockDevice> BlockReader<D> {
    pub fn new(device: D) -> Result<Self> {
        let bs = device.block_size();
        if bs < ODS5_BLOCK_SIZE || !bs.is_power_of_two() {
            return Err(Ods5Error::Invalid);
        }
        let ioshifts = (bs / ODS5_BLOCK_SIZE).trailing_zeros();
        Ok(Self { device, ioshifts })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Reads the single 512-byte ODS block `lbn`, returning a fresh buffer
    /// holding exactly that block's bytes (the containing, possibly larger,
    /// device block is read and the requested slice copied out).
    pub fn read_block(&self, lbn: u32) -> Result<Vec<u8>> {
        let dev_bs = self.device.block_size();
        let n = (lbn as u64) >> self.ioshifts;
        let o = (lbn as u64) - (n << self.ioshifts);
        let offset = (o as usize) * ODS5_BLOCK_SIZE;

        let mut host_block = vec![0u8; dev_bs];
        self.device
            .read_blocks(n, &mut host_block)
            .map_err(|_| Ods5Error::Io)?;

        Ok(host_block[offset..offset + ODS5_BLOCK_SIZE].to_vec())
    }

    /// Reads `count` consecutive ODS blocks starting at `lbn` into one
    /// contiguous buffer. Used by callers that need a run of blocks (e.g.
    /// the bitmap scan) without paying per-block device round trips when the
    /// run happens to align to the device block size.
    pub fn read_blocks(&self, lbn: u32, count: u32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(count as usize * ODS5_BLOCK_SIZE);
        for i in 0..count {
            out.extend_from_slice(&self.read_block(lbn + i)?);
        }
        Ok(out)
    }
}
