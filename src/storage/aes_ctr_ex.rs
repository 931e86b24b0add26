//! AES-128-CTR with per-subsection counters, as used by patch sections.
//!
//! A bucket tree of [`AesSubsectionEntry`] splits the storage into ranges;
//! each range substitutes its own generation value into counter bytes 4..8
//! before the usual offset-derived low half.
//!
//! ## Entry layout (0x10 bytes)
//! ```text
//! [0x00] Offset    (i64 LE)
//! [0x08] Reserved  (u32)
//! [0x0C] Counter   (u32 LE)
//! ```

use parking_lot::Mutex;
use tracing::trace;

use super::aes_ctr::apply_keystream;
use super::bucket_tree::{BucketTree, BucketTreeEntry, for_each_entry};
use super::{Aes128CtrStorage, SharedStorage, Storage};
use crate::utils::{le_i64, le_u32};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesSubsectionEntry {
    pub offset: u64,
    pub counter: u32,
}

impl BucketTreeEntry for AesSubsectionEntry {
    const SIZE: usize = 0x10;

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let offset = le_i64(buf, 0)?;
        if offset < 0 {
            return Err(Error::Parse("negative subsection offset"));
        }
        Ok(Self {
            offset: offset as u64,
            counter: le_u32(buf, 0x0C)?,
        })
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&(self.offset as i64).to_le_bytes());
        buf[8..12].fill(0);
        buf[12..16].copy_from_slice(&self.counter.to_le_bytes());
    }
}

/// Read-only CTR layer whose counter generation varies by subsection.
pub struct Aes128CtrExStorage {
    inner: Aes128CtrStorage,
    table: BucketTree<AesSubsectionEntry>,
    /// Working counter; bytes 4..8 are patched per subsection.
    counter: Mutex<[u8; 16]>,
}

impl Aes128CtrExStorage {
    pub fn new(
        base: SharedStorage,
        table: BucketTree<AesSubsectionEntry>,
        key: &[u8; 16],
        counter_offset: u64,
        counter_hi: u64,
    ) -> Self {
        let inner = Aes128CtrStorage::new(base, key, counter_offset, counter_hi);
        let counter = *inner.counter();
        Self {
            inner,
            table,
            counter: Mutex::new(counter),
        }
    }

    /// Load the subsection table from its serialized form.
    pub fn from_table_storage(
        base: SharedStorage,
        table: &dyn Storage,
        key: &[u8; 16],
        counter_offset: u64,
        counter_hi: u64,
    ) -> Result<Self> {
        Ok(Self::new(base, BucketTree::load(table)?, key, counter_offset, counter_hi))
    }

    pub fn table(&self) -> &BucketTree<AesSubsectionEntry> {
        &self.table
    }
}

impl Storage for Aes128CtrExStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        for_each_entry(&self.table, offset, buf.len(), |entry, _, pos, range| {
            let chunk = &mut buf[range];
            self.inner.base().read(pos, chunk)?;
            trace!(offset = pos, len = chunk.len(), generation = entry.counter, "subsection read");
            let abs = self
                .inner
                .counter_offset()
                .checked_add(pos)
                .ok_or_else(|| Error::out_of_range(pos, chunk.len()))?;
            let mut counter = self.counter.lock();
            counter[4..8].copy_from_slice(&entry.counter.to_be_bytes());
            apply_keystream(self.inner.cipher(), &counter, abs, chunk);
            Ok(())
        })
    }

    fn write(&self, _offset: u64, _buf: &[u8]) -> Result<()> {
        Err(Error::UnsupportedOperation("subsection CTR storage is read-only"))
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn size(&self) -> Result<u64> {
        self.inner.size()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::testing::pattern;
    use crate::storage::{CachedStorage, MemoryStorage, StorageExt};

    const KEY: [u8; 16] = [0x42; 16];

    /// Encrypt `plain` the way a producer would: one plain CTR pass per
    /// subsection with the generation patched in.
    fn encrypt(plain: &[u8], subsections: &[AesSubsectionEntry], counter_hi: u64) -> Vec<u8> {
        let mut out = plain.to_vec();
        let cipher = crate::crypto::Aes128Ctr::new(&KEY);
        for (i, sub) in subsections.iter().enumerate() {
            let end = subsections
                .get(i + 1)
                .map_or(plain.len() as u64, |n| n.offset);
            let mut counter = [0u8; 16];
            counter[..8].copy_from_slice(&counter_hi.to_be_bytes());
            counter[4..8].copy_from_slice(&sub.counter.to_be_bytes());
            apply_keystream(&cipher, &counter, sub.offset, &mut out[sub.offset as usize..end as usize]);
        }
        out
    }

    #[test]
    fn each_subsection_uses_its_generation() {
        let plain = pattern(0x300);
        let subsections = vec![
            AesSubsectionEntry { offset: 0, counter: 1 },
            AesSubsectionEntry { offset: 0x100, counter: 9 },
            AesSubsectionEntry { offset: 0x1F0, counter: 3 },
        ];
        let cipher_text = encrypt(&plain, &subsections, 0x0102_0304_0000_0000);
        let table = BucketTree::from_entries(subsections, 0x300).unwrap();
        let storage = Aes128CtrExStorage::new(
            Arc::new(MemoryStorage::new(cipher_text)),
            table,
            &KEY,
            0,
            0x0102_0304_0000_0000,
        );

        let mut all = vec![0u8; 0x300];
        storage.read(0, &mut all).unwrap();
        assert_eq!(all, plain);

        let mut straddle = [0u8; 0x30];
        storage.read(0xE8, &mut straddle).unwrap();
        assert_eq!(&straddle[..], &plain[0xE8..0x118]);
    }

    #[test]
    fn table_round_trips_through_storage_and_rejects_writes() {
        let entries = vec![
            AesSubsectionEntry { offset: 0, counter: 5 },
            AesSubsectionEntry { offset: 0x40, counter: 6 },
        ];
        let bytes = BucketTree::from_entries(entries.clone(), 0x80)
            .unwrap()
            .to_bytes()
            .unwrap();
        let storage = Aes128CtrExStorage::from_table_storage(
            Arc::new(MemoryStorage::with_size(0x80)),
            &MemoryStorage::new(bytes),
            &KEY,
            0,
            0,
        )
        .unwrap();
        assert_eq!(storage.table().entries(), &entries[..]);
        assert!(storage.write(0, &[0]).is_err());
    }

    #[test]
    fn flush_reaches_the_base() {
        let leaf = Arc::new(MemoryStorage::with_size(0x100));
        let cache = Arc::new(CachedStorage::new(leaf.clone(), 0x40, 2).unwrap());
        cache.write(0x10, b"pending").unwrap();
        let table = BucketTree::from_entries(vec![AesSubsectionEntry { offset: 0, counter: 0 }], 0x100).unwrap();
        let storage = Aes128CtrExStorage::new(cache, table, &KEY, 0, 0);

        assert_eq!(leaf.read_vec(0x10, 7).unwrap(), vec![0; 7]);
        storage.flush().unwrap();
        assert_eq!(leaf.read_vec(0x10, 7).unwrap(), b"pending".to_vec());
    }

    #[test]
    fn counter_overflow_is_out_of_range() {
        let table = BucketTree::from_entries(vec![AesSubsectionEntry { offset: 0, counter: 0 }], 0x20).unwrap();
        let storage = Aes128CtrExStorage::new(Arc::new(MemoryStorage::with_size(0x20)), table, &KEY, u64::MAX - 4, 0);
        let mut buf = [0u8; 0x10];
        assert!(matches!(storage.read(0x10, &mut buf), Err(Error::OutOfRange { .. })));
    }
}
