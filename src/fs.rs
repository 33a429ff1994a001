//! Orchestrator: wires home/fh/mapping/dir/lookup/inode/statfs/xattr together
//! behind the [`crate::vfs::Filesystem`] trait, grounded on the teacher's
//! `Ext4Fs` (mount-time bootstrap, an inode cache keyed by inode number, and
//! every mutating trait method rejecting with a read-only error).

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::RwLock;

use crate::block::{BlockDevice, BlockReader, ODS5_BLOCK_SIZE};
use crate::charset;
use crate::dir;
use crate::error::Result;
use crate::fh::{self, FhInfo};
use crate::home::{self, VolumeGeometry};
use crate::inode::{self, FileKind};
use crate::layout::{self, Fid, Home, VolChar};
use crate::lookup::{self, LookupResult};
use crate::mapping;
use crate::options::{Charset, MountOptions};
use crate::statfs::StatfsCache;
use crate::time::UnixTime;
use crate::vfs::{Filesystem, InodeNum, VfsAttr, VfsDirEntry, VfsError, VfsFileType, VfsStatFs};
use crate::xattr;

/// FID of a fixed system file (INDEXF.SYS, BITMAP.SYS, the MFD): by
/// convention the reference implementation's bootstrap always passes
/// `seq == ino` for these (`ods5_iget(sb, ODS5_INDEXF_INO, ODS5_INDEXF_INO)`
/// and friends in `super.c`), since there is no parent directory entry to
/// read a real sequence number from.
fn system_fid(ino: u64) -> Fid {
    Fid {
        num: (ino & 0xFFFF) as u16,
        seq: (ino & 0xFFFF) as u16,
        rvn: 0,
        nmx: (ino >> 16) as u8,
    }
}

fn fnum_of(fid: Fid) -> u32 {
    fid.num as u32 | ((fid.nmx as u32) << 16)
}

/// Cached per-inode state: the mapping-engine handle plus the POSIX
/// attributes derived once at `iget` time.
struct Inode {
    fh: FhInfo,
    attr: inode::Attr,
}

/// A mounted ODS-5/ODS-2 volume, read-only.
pub struct Ods5Fs<D: BlockDevice> {
    reader: BlockReader<D>,
    geometry: VolumeGeometry,
    options: MountOptions,
    hardlinks: bool,
    index_fh: FhInfo,
    bitmap_fh: FhInfo,
    cache: RwLock<BTreeMap<u64, Arc<Inode>>>,
    stats: StatfsCache,
    now: UnixTime,
}

impl<D: BlockDevice> Ods5Fs<D> {
    /// Validates the home block, bootstraps INDEXF.SYS and BITMAP.SYS (the
    /// only two files whose headers must be read before the mapping engine
    /// can resolve anything else), and pre-caches the MFD (root directory).
    /// `now` stands in for a wall clock: this crate has no clock of its own,
    /// and it's used only as a fallback for headers with no ident area.
    pub fn mount(device: D, options: MountOptions, now: UnixTime) -> Result<Self> {
        let reader = BlockReader::new(device)?;
        let home_raw = reader.read_block(options.home_lbn)?;
        let geometry = home::validate(&home_raw)?;
        let home: Home = layout::decode(&home_raw)?;
        let hardlinks = geometry.is_ods5 && (home.volchar & VolChar::HARDLINKS.bits() != 0);

        let index_fid = system_fid(layout::ODS5_INDEXF_INO);
        let (index_raw, index_fh2) = fh::read_fh(&reader, &geometry, None, layout::ODS5_INDEXF_INO as u32, index_fid)?;
        let index_fh = fh::build_fh_info(&index_raw, &index_fh2)?;

        let bitmap_fid = system_fid(layout::ODS5_BITMAP_INO);
        let (bitmap_raw, bitmap_fh2) = fh::read_fh(&reader, &geometry, None, layout::ODS5_BITMAP_INO as u32, bitmap_fid)?;
        let bitmap_fh = fh::build_fh_info(&bitmap_raw, &bitmap_fh2)?;

        let fs = Self {
            reader,
            geometry,
            options,
            hardlinks,
            index_fh,
            bitmap_fh,
            cache: RwLock::new(BTreeMap::new()),
            stats: StatfsCache::new(),
            now,
        };
        fs.fetch_and_cache(system_fid(layout::ODS5_MFD_INO), layout::ODS5_MFD_INO as u32)?;
        Ok(fs)
    }

    fn get_cached(&self, ino: u64) -> Option<Arc<Inode>> {
        self.cache.read().get(&ino).cloned()
    }

    /// Reads, validates and materialises the header for `fid`, caching the
    /// result under its POSIX inode number. A cache hit for the same inode
    /// number short-circuits the read entirely (it can only have been
    /// populated by a prior `fetch_and_cache` for this same `fid`, since
    /// sequence numbers are immutable once assigned on a read-only volume).
    fn fetch_and_cache(&self, fid: Fid, fnum: u32) -> Result<Arc<Inode>> {
        let ino = fid.ino();
        if let Some(hit) = self.get_cached(ino) {
            return Ok(hit);
        }

        let index_fh_ref = if fnum > layout::ODS5_LAST_FIXED_FH as u32 {
            Some(&self.index_fh)
        } else {
            None
        };
        let (raw, fh2) = fh::read_fh(&self.reader, &self.geometry, index_fh_ref, fnum, fid)?;
        let fh = fh::build_fh_info(&raw, &fh2)?;

        let kind = inode::file_kind(&fh2);
        let link_content = if kind == FileKind::Symlink && self.options.charset == Charset::Utf8 {
            let raw_size = inode::raw_size_from_fat(&fh.recattr) as usize;
            Some(self.read_range(&fh, 0, raw_size)?)
        } else {
            None
        };
        let attr = inode::derive_attr(
            &raw,
            &fh2,
            self.geometry.is_ods5,
            self.hardlinks,
            &self.options,
            link_content.as_deref(),
            self.now,
        )?;

        let inode = Arc::new(Inode { fh, attr });
        self.cache.write().insert(ino, inode.clone());
        Ok(inode)
    }

    /// Reads `len` bytes starting at byte `offset` of `fh`'s content,
    /// walking VBNs through the mapping engine one block at a time.
    fn read_range(&self, fh: &FhInfo, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        if len == 0 {
            return Ok(out);
        }
        let block_size = ODS5_BLOCK_SIZE as u64;
        let mut vbn = (offset / block_size) as u32 + 1;
        let mut skip = (offset % block_size) as usize;
        while out.len() < len {
            let (lbn, _extent) = mapping::map_vbn(&self.reader, &self.geometry, fh, vbn)?;
            let block = self.reader.read_block(lbn)?;
            let take = (block.len() - skip).min(len - out.len());
            out.extend_from_slice(&block[skip..skip + take]);
            skip = 0;
            vbn += 1;
        }
        Ok(out)
    }
}

impl<D: BlockDevice> Filesystem for Ods5Fs<D> {
    fn name(&self) -> &'static str {
        "ods5"
    }

    fn lookup(&self, parent: InodeNum, name: &str) -> core::result::Result<InodeNum, VfsError> {
        let parent_inode = self.get_cached(parent).ok_or(VfsError::NotFound)?;
        if parent_inode.attr.kind != FileKind::Directory {
            return Err(VfsError::NotADirectory);
        }
        let result = lookup::lookup(
            &self.reader,
            &self.geometry,
            &parent_inode.fh,
            &self.options,
            parent_inode.attr.size,
            name,
        )?;
        match result {
            LookupResult::Found(fid) => {
                let child = self.fetch_and_cache(fid, fnum_of(fid))?;
                Ok(child.fh.fid.ino())
            }
            LookupResult::NotFound => Err(VfsError::NotFound),
        }
    }

    fn getattr(&self, ino: InodeNum) -> core::result::Result<VfsAttr, VfsError> {
        let inode = self.get_cached(ino).ok_or(VfsError::NotFound)?;
        Ok(inode.attr.into())
    }

    fn readdir(&self, ino: InodeNum) -> core::result::Result<Vec<VfsDirEntry>, VfsError> {
        let dir_inode = self.get_cached(ino).ok_or(VfsError::NotFound)?;
        if dir_inode.attr.kind != FileKind::Directory {
            return Err(VfsError::NotADirectory);
        }
        let entries = dir::read_all(&self.reader, &self.geometry, &dir_inode.fh, &self.options, dir_inode.attr.size)?;

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            // Populate the cache now so a following lookup()/getattr() for
            // this child doesn't re-scan the directory to recover its seq.
            let child = self.fetch_and_cache(entry.fid, fnum_of(entry.fid))?;
            out.push(VfsDirEntry {
                name: entry.name,
                ino: entry.fid.ino(),
                file_type: child.attr.kind.into(),
            });
        }
        Ok(out)
    }

    fn read(&self, ino: InodeNum, offset: u64, size: usize) -> core::result::Result<Vec<u8>, VfsError> {
        let file_inode = self.get_cached(ino).ok_or(VfsError::NotFound)?;
        if file_inode.attr.kind == FileKind::Directory {
            return Err(VfsError::IsADirectory);
        }
        if offset >= file_inode.attr.size {
            return Ok(Vec::new());
        }
        let want = (size as u64).min(file_inode.attr.size - offset) as usize;
        Ok(self.read_range(&file_inode.fh, offset, want)?)
    }

    fn readlink(&self, ino: InodeNum) -> core::result::Result<String, VfsError> {
        let file_inode = self.get_cached(ino).ok_or(VfsError::NotFound)?;
        if file_inode.attr.kind != FileKind::Symlink {
            return Err(VfsError::NotAFile);
        }
        // The on-disk target is plain ISO-Latin-1, regardless of mount
        // charset mode; `attr.size` may already include UTF-8 growth, so the
        // byte count to read back is recomputed from the raw `fat`, not
        // taken from `attr.size`.
        let raw_size = inode::raw_size_from_fat(&file_inode.fh.recattr) as usize;
        let raw = self.read_range(&file_inode.fh, 0, raw_size)?;
        Ok(charset::isl1_to_utf8(&raw))
    }

    fn getxattr(&self, ino: InodeNum, name: &str, buffer: &mut [u8]) -> core::result::Result<usize, VfsError> {
        let file_inode = self.get_cached(ino).ok_or(VfsError::NotFound)?;
        match name {
            "user.fat" => {
                let bytes = xattr::fat_bytes(&file_inode.fh);
                Ok(xattr::read_attr(&bytes, buffer)?)
            }
            "user.fh" => {
                let fid = file_inode.fh.fid;
                let fnum = fnum_of(fid);
                let index_fh_ref = if fnum > layout::ODS5_LAST_FIXED_FH as u32 {
                    Some(&self.index_fh)
                } else {
                    None
                };
                let bytes = xattr::fh_bytes(&self.reader, &self.geometry, index_fh_ref, fnum, fid)?;
                Ok(xattr::read_attr(&bytes, buffer)?)
            }
            _ => Err(VfsError::NotSupported),
        }
    }

    fn statfs(&self) -> core::result::Result<VfsStatFs, VfsError> {
        let stats = self.stats.get_or_compute(&self.reader, &self.geometry, &self.bitmap_fh)?;
        Ok(VfsStatFs {
            blocks: stats.volsize as u64,
            bfree: stats.free_blocks(),
            bavail: stats.free_blocks(),
            files: stats.total_fids as u64,
            ffree: (stats.total_fids as u64).saturating_sub(stats.used_fids),
            bsize: ODS5_BLOCK_SIZE as u32,
            namelen: layout::ODS5_FILENAME_LEN as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    /// Writes a direct-mapped `fh2` for file number `fnum`/FID `fid` at LBN
    /// `header_lbn`, pointing its single retrieval pointer at `data_lbn`.
    fn put_fh(data: &mut [u8], header_lbn: u32, fid: Fid, data_lbn: u32, filechar: u32, recattr: &[u8; 32]) {
        let off = header_lbn as usize * 512;
        let buf = &mut data[off..off + 512];
        for b in buf.iter_mut() {
            *b = 0;
        }
        buf[20..52].copy_from_slice(recattr);
        buf[52..56].copy_from_slice(&filechar.to_le_bytes());

        let mpoffset = layout::FH2_HIGHWATER_WORD_OFFSET;
        let acoffset = mpoffset + 3; // map_inuse words follow immediately
        buf[0] = 0; // idoffset = 0: no ident area
        buf[1] = mpoffset;
        buf[6..8].copy_from_slice(&0x0105u16.to_le_bytes()); // struclev 5.1
        buf[8..10].copy_from_slice(&fid.num.to_le_bytes());
        buf[10..12].copy_from_slice(&fid.seq.to_le_bytes());
        buf[12] = fid.rvn;
        buf[13] = fid.nmx;

        // single format-2 pointer at word offset mpoffset
        let mp_byte = mpoffset as usize * 2;
        let w0: u16 = (2u16 << 14) | 0;
        buf[mp_byte..mp_byte + 2].copy_from_slice(&w0.to_le_bytes());
        buf[mp_byte + 2..mp_byte + 4].copy_from_slice(&((data_lbn & 0xFFFF) as u16).to_le_bytes());
        buf[mp_byte + 4..mp_byte + 6].copy_from_slice(&((data_lbn >> 16) as u16).to_le_bytes());
        buf[2] = acoffset;
        buf[3] = acoffset; // rsoffset
        buf[58] = 3; // map_inuse = 3 words

        let checksum = crate::checksum::word_sum(&buf[0..510]);
        buf[510..512].copy_from_slice(&checksum.to_le_bytes());
    }

    fn put_dir_record(block: &mut [u8], offset: usize, name: &[u8], versions: &[(u16, Fid)]) -> usize {
        let namecount = name.len() as u8;
        let padded = (name.len() + 1) & !1;
        let value_bytes = versions.len() * 8;
        let size = (layout::DIR_HEADER_SIZE - 2 + padded + value_bytes) as u16;
        block[offset..offset + 2].copy_from_slice(&size.to_le_bytes());
        let flags = layout::DIR_ISL1 << 3;
        block[offset + 4] = flags;
        block[offset + 5] = namecount;
        let name_start = offset + 8;
        block[name_start..name_start + name.len()].copy_from_slice(name);
        let value_start = name_start + padded;
        for (i, (ver, fid)) in versions.iter().enumerate() {
            let vo = value_start + i * 8;
            block[vo..vo + 2].copy_from_slice(&ver.to_le_bytes());
            block[vo + 2..vo + 4].copy_from_slice(&fid.num.to_le_bytes());
            block[vo + 4..vo + 6].copy_from_slice(&fid.seq.to_le_bytes());
            block[vo + 6] = fid.rvn;
            block[vo + 7] = fid.nmx;
        }
        offset + 2 + size as usize
    }

    fn sample_geometry() -> VolumeGeometry {
        VolumeGeometry {
            cluster: 1,
            maxfiles: 64,
            resfiles: 5,
            ibmaplbn: 2,
            ibmapsize: 1,
            indexflbn: 3,
            is_ods5: true,
        }
    }

    /// Builds a tiny 14-block image. `fnum`s 1/2/4/10 all sit within the
    /// fixed INDEXF.SYS header region (`fnum <= ODS5_LAST_FIXED_FH`), so
    /// none of them needs a working mapping-engine walk over INDEXF.SYS
    /// itself to be located: INDEXF.SYS header at fixed LBN 3 (file #1),
    /// BITMAP.SYS header at LBN 4 (file #2), MFD header at LBN 6 (file #4)
    /// whose data block (LBN 7) holds one directory record "FOO.;1"
    /// pointing at a regular file (fnum 10, header at the fixed LBN for
    /// that slot) whose data block holds "hello".
    fn build_image() -> Vec<u8> {
        let mut data = vec![0u8; 512 * 14];

        let empty_recattr = [0u8; 32];
        put_fh(&mut data, 3, system_fid(layout::ODS5_INDEXF_INO), 3, 0, &empty_recattr);
        put_fh(&mut data, 4, system_fid(layout::ODS5_BITMAP_INO), 4, 0, &empty_recattr);

        // MFD: directory, 1 block long (efblk=2, ffbyte=0 -> size=512).
        // efblk is {hi, lo} words: hi at local offset 8, lo at local offset 10.
        let mut mfd_recattr = [0u8; 32];
        mfd_recattr[10..12].copy_from_slice(&2u16.to_le_bytes()); // efblk lo
        let filechar_directory = layout::FileChar::DIRECTORY.bits();
        put_fh(&mut data, 6, system_fid(layout::ODS5_MFD_INO), 7, filechar_directory, &mfd_recattr);

        let foo_fid = Fid { num: 10, seq: 1, rvn: 0, nmx: 0 };
        let mut dirblock = vec![0u8; 512];
        let end = put_dir_record(&mut dirblock, 0, b"FOO.", &[(1, foo_fid)]);
        dirblock[end..end + 2].copy_from_slice(&layout::NO_MORE_RECORDS.to_le_bytes());
        data[7 * 512..8 * 512].copy_from_slice(&dirblock);

        // FOO.;1: regular file, 5 bytes long (efblk=1, ffbyte=5). Header at
        // the fixed slot for fnum 10: indexflbn + (10-1) = 12.
        let mut foo_recattr = [0u8; 32];
        foo_recattr[10..12].copy_from_slice(&1u16.to_le_bytes()); // efblk lo = 1
        foo_recattr[12..14].copy_from_slice(&5u16.to_le_bytes()); // ffbyte = 5
        put_fh(&mut data, 12, foo_fid, 13, 0, &foo_recattr);
        data[13 * 512..13 * 512 + 5].copy_from_slice(b"hello");

        data
    }

    fn mount_sample() -> Ods5Fs<Arc<MemDevice>> {
        let data = build_image();
        let dev = Arc::new(MemDevice(Mutex::new(data)));
        let reader = BlockReader::new(dev).unwrap();
        // `mount()` normally validates its own home block; this test wires
        // geometry directly to isolate the orchestration logic from C4.
        let geometry = sample_geometry();
        let index_fid = system_fid(layout::ODS5_INDEXF_INO);
        let (index_raw, index_fh2) = fh::read_fh(&reader, &geometry, None, layout::ODS5_INDEXF_INO as u32, index_fid).unwrap();
        let index_fh = fh::build_fh_info(&index_raw, &index_fh2).unwrap();
        let bitmap_fid = system_fid(layout::ODS5_BITMAP_INO);
        let (bitmap_raw, bitmap_fh2) = fh::read_fh(&reader, &geometry, None, layout::ODS5_BITMAP_INO as u32, bitmap_fid).unwrap();
        let bitmap_fh = fh::build_fh_info(&bitmap_raw, &bitmap_fh2).unwrap();

        let fs = Ods5Fs {
            reader,
            geometry,
            options: MountOptions::default(),
            hardlinks: false,
            index_fh,
            bitmap_fh,
            cache: RwLock::new(BTreeMap::new()),
            stats: StatfsCache::new(),
            now: UnixTime { sec: 0, nsec: 0 },
        };
        fs.fetch_and_cache(system_fid(layout::ODS5_MFD_INO), layout::ODS5_MFD_INO as u32).unwrap();
        fs
    }

    #[test]
    fn lookup_readdir_and_read_round_trip() {
        let fs = mount_sample();
        let root = layout::ODS5_MFD_INO;

        let entries = fs.readdir(root).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "FOO.;1");

        let ino = fs.lookup(root, "FOO.;1").unwrap();
        assert_eq!(ino, entries[0].ino);

        let attr = fs.getattr(ino).unwrap();
        assert_eq!(attr.file_type, VfsFileType::Regular);
        assert_eq!(attr.size, 5);

        let content = fs.read(ino, 0, 1024).unwrap();
        assert_eq!(&content, b"hello");

        let partial = fs.read(ino, 2, 2).unwrap();
        assert_eq!(&partial, b"ll");
    }

    #[test]
    fn lookup_of_missing_name_fails() {
        let fs = mount_sample();
        assert!(matches!(fs.lookup(layout::ODS5_MFD_INO, "BAR.;1"), Err(VfsError::NotFound)));
    }

    #[test]
    fn read_on_directory_is_rejected() {
        let fs = mount_sample();
        assert!(matches!(fs.read(layout::ODS5_MFD_INO, 0, 10), Err(VfsError::IsADirectory)));
    }
}
