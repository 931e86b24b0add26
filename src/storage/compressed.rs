//! Bucket-tree indexed compressed regions (requires the `compression`
//! feature).
//!
//! ## Entry layout (0x18 bytes)
//! ```text
//! [0x00] Virtual offset   (i64 LE)
//! [0x08] Physical offset  (i64 LE)
//! [0x10] Compression type (u8)   0 = none, 1 = zeros, 3 = LZ4
//! [0x11] Level            (i8)
//! [0x12] Reserved         (2 bytes)
//! [0x14] Physical size    (u32 LE)
//! ```

use tracing::trace;

use super::bucket_tree::{BucketTree, BucketTreeEntry, for_each_entry};
use super::{SharedStorage, Storage, StorageExt};
use crate::compression::lz4::decompress_block;
use crate::utils::{le_i64, le_u32};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Zeros,
    Lz4,
    Unknown(u8),
}

impl From<u8> for CompressionType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Zeros,
            3 => Self::Lz4,
            other => Self::Unknown(other),
        }
    }
}

impl From<CompressionType> for u8 {
    fn from(t: CompressionType) -> Self {
        match t {
            CompressionType::None => 0,
            CompressionType::Zeros => 1,
            CompressionType::Lz4 => 3,
            CompressionType::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionEntry {
    pub virtual_offset: u64,
    pub physical_offset: u64,
    pub compression_type: CompressionType,
    pub level: i8,
    pub physical_size: u32,
}

impl BucketTreeEntry for CompressionEntry {
    const SIZE: usize = 0x18;

    fn offset(&self) -> u64 {
        self.virtual_offset
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let virtual_offset = le_i64(buf, 0)?;
        let physical_offset = le_i64(buf, 8)?;
        if virtual_offset < 0 || physical_offset < 0 {
            return Err(Error::Parse("negative compression entry offset"));
        }
        Ok(Self {
            virtual_offset: virtual_offset as u64,
            physical_offset: physical_offset as u64,
            compression_type: buf[0x10].into(),
            level: buf[0x11] as i8,
            physical_size: le_u32(buf, 0x14)?,
        })
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&(self.virtual_offset as i64).to_le_bytes());
        buf[8..16].copy_from_slice(&(self.physical_offset as i64).to_le_bytes());
        buf[0x10] = self.compression_type.into();
        buf[0x11] = self.level as u8;
        buf[0x12..0x14].fill(0);
        buf[0x14..0x18].copy_from_slice(&self.physical_size.to_le_bytes());
    }
}

/// Read-only storage decompressing regions of `base` on demand.
pub struct CompressedStorage {
    base: SharedStorage,
    table: BucketTree<CompressionEntry>,
}

impl CompressedStorage {
    pub fn new(base: SharedStorage, table: BucketTree<CompressionEntry>) -> Self {
        Self { base, table }
    }

    pub fn from_table_storage(base: SharedStorage, table: &dyn Storage) -> Result<Self> {
        Ok(Self::new(base, BucketTree::load(table)?))
    }
}

impl Storage for CompressedStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        for_each_entry(&self.table, offset, buf.len(), |entry, start, pos, range| {
            let chunk = &mut buf[range];
            let within = pos - start;
            match entry.compression_type {
                CompressionType::None => {
                    self.base.read(entry.physical_offset + within, chunk)
                }
                CompressionType::Zeros => {
                    chunk.fill(0);
                    Ok(())
                }
                CompressionType::Lz4 => {
                    let cursor = self.table.find(start)?;
                    let (_, end) = cursor.range();
                    let virtual_size = usize::try_from(end - start).map_err(|_| Error::InvalidSize)?;
                    trace!(offset = start, virtual_size, physical_size = entry.physical_size, "lz4 region");
                    let packed = self
                        .base
                        .read_vec(entry.physical_offset, entry.physical_size as usize)?;
                    let unpacked = decompress_block(&packed, virtual_size)?;
                    let at = within as usize;
                    chunk.copy_from_slice(&unpacked[at..at + chunk.len()]);
                    Ok(())
                }
                CompressionType::Unknown(_) => {
                    Err(Error::UnsupportedOperation("unknown compression type"))
                }
            }
        })
    }

    fn write(&self, _offset: u64, _buf: &[u8]) -> Result<()> {
        Err(Error::UnsupportedOperation("compressed storage is read-only"))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.table.end_offset())
    }
}
