//! Relocation of virtual ranges onto several source storages.
//!
//! ## Entry layout (0x14 bytes)
//! ```text
//! [0x00] Virtual offset (i64 LE)
//! [0x08] Source offset  (i64 LE)
//! [0x10] Source index   (i32 LE)
//! ```

use tracing::trace;

use super::bucket_tree::{BucketTree, BucketTreeEntry, for_each_entry};
use super::{SharedStorage, Storage};
use crate::utils::{le_i32, le_i64};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    pub offset: u64,
    pub source_offset: u64,
    pub source_index: u32,
}

impl BucketTreeEntry for RelocationEntry {
    const SIZE: usize = 0x14;

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let offset = le_i64(buf, 0)?;
        let source_offset = le_i64(buf, 8)?;
        let source_index = le_i32(buf, 0x10)?;
        if offset < 0 || source_offset < 0 || source_index < 0 {
            return Err(Error::Parse("negative relocation entry field"));
        }
        Ok(Self {
            offset: offset as u64,
            source_offset: source_offset as u64,
            source_index: source_index as u32,
        })
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&(self.offset as i64).to_le_bytes());
        buf[8..16].copy_from_slice(&(self.source_offset as i64).to_le_bytes());
        buf[16..20].copy_from_slice(&(self.source_index as i32).to_le_bytes());
    }
}

/// Read-only storage that redirects each virtual range to
/// `sources[entry.source_index]` at `entry.source_offset`.
pub struct IndirectStorage {
    table: BucketTree<RelocationEntry>,
    sources: Vec<SharedStorage>,
}

impl IndirectStorage {
    pub fn new(table: BucketTree<RelocationEntry>, sources: Vec<SharedStorage>) -> Result<Self> {
        if table
            .entries()
            .iter()
            .any(|e| e.source_index as usize >= sources.len())
        {
            return Err(Error::Parse("relocation entry names a missing source"));
        }
        Ok(Self { table, sources })
    }

    /// Load the relocation table from its serialized form.
    pub fn from_table_storage(table: &dyn Storage, sources: Vec<SharedStorage>) -> Result<Self> {
        Self::new(BucketTree::load(table)?, sources)
    }

    pub fn table(&self) -> &BucketTree<RelocationEntry> {
        &self.table
    }
}

impl Storage for IndirectStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        for_each_entry(&self.table, offset, buf.len(), |entry, start, pos, range| {
            let source_pos = entry
                .source_offset
                .checked_add(pos - start)
                .ok_or_else(|| Error::out_of_range(pos, range.len()))?;
            trace!(
                source = entry.source_index,
                offset = source_pos,
                len = range.len(),
                "relocated read"
            );
            self.sources[entry.source_index as usize].read(source_pos, &mut buf[range])
        })
    }

    fn write(&self, _offset: u64, _buf: &[u8]) -> Result<()> {
        Err(Error::UnsupportedOperation("indirect storage is read-only"))
    }

    fn flush(&self) -> Result<()> {
        for source in &self.sources {
            source.flush()?;
        }
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.table.end_offset())
    }
}
