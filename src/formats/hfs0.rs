//! HFS0 (Hierarchical FileSystem 0 / SHA-256 FileSystem) - hashed archive.
//!
//! Used inside XCI game cards. Same header and string table as
//! [`super::pfs0`]; only the entry differs.
//!
//! ## File Entry (0x40 bytes)
//! ```text
//! [0x00] DataOffset - relative to the data section start (u64 LE)
//! [0x08] DataSize   - in bytes (u64 LE)
//! [0x10] NameOffset - byte offset into the string table (u32 LE)
//! [0x14] HashedRegionSize - number of leading bytes covered by the hash (u32 LE)
//! [0x18] Reserved   (8 bytes)
//! [0x20] SHA-256 hash of the first HashedRegionSize bytes (32 bytes)
//! ```
//!
//! The builder hashes the first `min(size, 0x200)` bytes of each file and
//! aligns the data section to 0x200.

use super::pfs0::{PartitionEntry, hash_head};
use crate::Result;
use crate::utils::{bytesa, le_u32, le_u64};

/// HFS0 entry-table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hfs0Entry {
    pub offset: u64,
    pub size: u64,
    pub name_offset: u32,
    /// Number of leading bytes covered by `sha256`.
    pub hashed_region_size: u32,
    pub sha256: [u8; 32],
}

impl PartitionEntry for Hfs0Entry {
    const MAGIC: &'static [u8; 4] = b"HFS0";
    const SIZE: usize = 0x40;
    const METADATA_ALIGNMENT: u64 = 0x200;
    const HASH_TARGET_SIZE: u64 = 0x200;

    fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            offset: le_u64(buf, 0)?,
            size: le_u64(buf, 8)?,
            name_offset: le_u32(buf, 0x10)?,
            hashed_region_size: le_u32(buf, 0x14)?,
            sha256: bytesa::<32>(buf, 0x20)?,
        })
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.name_offset.to_le_bytes());
        buf[20..24].copy_from_slice(&self.hashed_region_size.to_le_bytes());
        buf[24..32].fill(0);
        buf[32..64].copy_from_slice(&self.sha256);
    }

    fn new(offset: u64, size: u64, name_offset: u32, head: &[u8]) -> Self {
        Self {
            offset,
            size,
            name_offset,
            hashed_region_size: head.len() as u32,
            sha256: hash_head(head),
        }
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn name_offset(&self) -> u32 {
        self.name_offset
    }

    fn hashed_region(&self) -> Option<(u64, [u8; 32])> {
        Some((u64::from(self.hashed_region_size), self.sha256))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::hash::sha256;
    use crate::formats::pfs0::{PartitionFsBuilder, PartitionMetadata};
    use crate::storage::{MemoryStorage, Storage};

    #[test]
    fn builder_hashes_leading_region() {
        let big: Vec<u8> = (0..0x300u32).map(|i| i as u8).collect();
        let mut builder = PartitionFsBuilder::new();
        builder
            .add_file("secure", Arc::new(MemoryStorage::new(big.clone())))
            .add_file("tiny", Arc::new(MemoryStorage::new(vec![1, 2, 3])));
        let image = builder.build::<Hfs0Entry>().unwrap();

        let meta = PartitionMetadata::<Hfs0Entry>::read(&image).unwrap();
        assert_eq!(meta.data_offset % 0x200, 0);
        let secure = &meta.find("secure").unwrap().entry;
        assert_eq!(secure.hashed_region_size, 0x200);
        assert_eq!(secure.sha256, sha256(&big[..0x200]));
        let tiny = &meta.find("tiny").unwrap().entry;
        assert_eq!(tiny.hashed_region_size, 3);
        assert_eq!(tiny.offset, 0x300);
        assert_eq!(image.size().unwrap(), meta.data_offset + 0x303);
    }
}
