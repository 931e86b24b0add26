//! SHA-256 block verification.
//!
//! [`IntegrityVerificationStorage`] pairs a data storage with a hash storage
//! holding one 32-byte digest per data block. Reads verify every touched
//! block and fail hard on mismatch; writes update the digests.
//!
//! [`HierarchicalIntegrityVerificationStorage`] chains these levels so each
//! hash level is itself verified by the level above, up to a single master
//! hash:
//!
//! ```text
//! master hash ──> level 0 ──> level 1 ──> ... ──> data
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use super::{MemoryStorage, SharedStorage, Storage, UNBOUNDED_SIZE, check_range};
use crate::crypto::hash::{SHA256_SIZE, sha256};
use crate::{Error, Result};

/// Verifies `data` in `block_size` blocks against digests stored in
/// `hashes`.
pub struct IntegrityVerificationStorage {
    data: SharedStorage,
    hashes: SharedStorage,
    block_size: usize,
}

impl IntegrityVerificationStorage {
    pub fn new(data: SharedStorage, hashes: SharedStorage, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::InvalidArgument("block size must be non-zero"));
        }
        let size = data.size()?;
        if size == UNBOUNDED_SIZE {
            return Err(Error::InvalidSize);
        }
        let blocks = size.div_ceil(block_size as u64);
        if hashes.size()? < blocks * SHA256_SIZE as u64 {
            return Err(Error::Parse("hash storage is too small for its data"));
        }
        Ok(Self {
            data,
            hashes,
            block_size,
        })
    }

    /// Length of block `index`, shorter for the final block.
    fn block_len(&self, index: u64, size: u64) -> usize {
        let start = index * self.block_size as u64;
        (size - start).min(self.block_size as u64) as usize
    }

    /// Read and verify block `index` into `block[..len]`.
    fn read_block(&self, index: u64, size: u64, block: &mut [u8]) -> Result<usize> {
        let len = self.block_len(index, size);
        let offset = index * self.block_size as u64;
        self.data.read(offset, &mut block[..len])?;
        let mut expected = [0u8; SHA256_SIZE];
        self.hashes.read(index * SHA256_SIZE as u64, &mut expected)?;
        if sha256(&block[..len]) != expected {
            warn!(offset, len, "hash mismatch");
            return Err(Error::IntegrityVerificationFailed { offset });
        }
        Ok(len)
    }
}

impl Storage for IntegrityVerificationStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let size = self.data.size()?;
        check_range(offset, buf.len(), size)?;
        let bs = self.block_size as u64;
        let mut block = vec![0u8; self.block_size];
        let mut pos = offset;
        let mut done = 0usize;
        while done < buf.len() {
            let index = pos / bs;
            let at = (pos % bs) as usize;
            let len = self.read_block(index, size, &mut block)?;
            let piece = (len - at).min(buf.len() - done);
            buf[done..done + piece].copy_from_slice(&block[at..at + piece]);
            done += piece;
            pos += piece as u64;
        }
        Ok(())
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let size = self.data.size()?;
        check_range(offset, buf.len(), size)?;
        let bs = self.block_size as u64;
        let mut block = vec![0u8; self.block_size];
        let mut pos = offset;
        let mut done = 0usize;
        while done < buf.len() {
            let index = pos / bs;
            let at = (pos % bs) as usize;
            let len = self.block_len(index, size);
            let piece = (len - at).min(buf.len() - done);
            if piece != len {
                self.read_block(index, size, &mut block)?;
            }
            block[at..at + piece].copy_from_slice(&buf[done..done + piece]);
            self.data.write(index * bs, &block[..len])?;
            self.hashes
                .write(index * SHA256_SIZE as u64, &sha256(&block[..len]))?;
            done += piece;
            pos += piece as u64;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.hashes.flush()?;
        self.data.flush()
    }

    fn size(&self) -> Result<u64> {
        self.data.size()
    }
}

/// A chain of [`IntegrityVerificationStorage`] levels rooted at a master
/// hash. Reads and writes address the data level.
pub struct HierarchicalIntegrityVerificationStorage {
    data: SharedStorage,
    levels: usize,
}

impl HierarchicalIntegrityVerificationStorage {
    /// `levels` runs top-down: `levels[0]` is the smallest hash level (it
    /// must fit in one block, verified by `master_hash`), the last entry is
    /// the data.
    pub fn new(master_hash: [u8; SHA256_SIZE], levels: Vec<SharedStorage>, block_size: usize) -> Result<Self> {
        if levels.is_empty() {
            return Err(Error::InvalidArgument("at least one level is required"));
        }
        let count = levels.len();
        let mut hashes: SharedStorage = Arc::new(MemoryStorage::new(master_hash.to_vec()));
        for level in levels {
            hashes = Arc::new(IntegrityVerificationStorage::new(level, hashes, block_size)?);
        }
        debug!(levels = count, block_size, "built hash hierarchy");
        Ok(Self {
            data: hashes,
            levels: count,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels
    }

    /// Compute the hash levels for `data`.
    ///
    /// Returns the master hash and the hash levels in top-down order
    /// (excluding the data itself), ready to pass to [`new`](Self::new)
    /// followed by the data storage.
    pub fn build_levels(data: &[u8], block_size: usize) -> ([u8; SHA256_SIZE], Vec<Vec<u8>>) {
        let hash_blocks = |bytes: &[u8]| -> Vec<u8> {
            bytes
                .chunks(block_size)
                .flat_map(|chunk| sha256(chunk))
                .collect()
        };
        let mut levels = Vec::new();
        let mut current = hash_blocks(data);
        while current.len() > block_size {
            let next = hash_blocks(&current);
            levels.push(current);
            current = next;
        }
        levels.push(current);
        levels.reverse();
        let master = sha256(&levels[0]);
        (master, levels)
    }
}

impl Storage for HierarchicalIntegrityVerificationStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.data.read(offset, buf)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.data.write(offset, buf)
    }

    fn flush(&self) -> Result<()> {
        self.data.flush()
    }

    fn size(&self) -> Result<u64> {
        self.data.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::pattern;

    fn single_level(data: Vec<u8>, block_size: usize) -> (Arc<MemoryStorage>, IntegrityVerificationStorage) {
        let hashes: Vec<u8> = data.chunks(block_size).flat_map(sha256).collect();
        let data = Arc::new(MemoryStorage::new(data));
        let ivs = IntegrityVerificationStorage::new(
            data.clone(),
            Arc::new(MemoryStorage::new(hashes)),
            block_size,
        )
        .unwrap();
        (data, ivs)
    }

    #[test]
    fn verified_read_returns_data() {
        let (_, ivs) = single_level(pattern(100), 32);
        let mut buf = [0u8; 40];
        ivs.read(50, &mut buf).unwrap();
        assert_eq!(&buf[..], &pattern(100)[50..90]);
    }

    #[test]
    fn corruption_fails_hard() {
        let (data, ivs) = single_level(pattern(100), 32);
        data.write(70, &[0xFF]).unwrap();
        let mut buf = [0u8; 4];
        ivs.read(0, &mut buf).unwrap();
        assert!(matches!(
            ivs.read(66, &mut buf),
            Err(Error::IntegrityVerificationFailed { offset: 64 })
        ));
    }

    #[test]
    fn writes_keep_hashes_consistent() {
        let (_, ivs) = single_level(pattern(100), 32);
        ivs.write(30, &[1, 2, 3, 4, 5]).unwrap();
        let mut buf = [0u8; 5];
        ivs.read(30, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn hierarchy_verifies_every_level() {
        let data = pattern(5000);
        let (master, levels) = HierarchicalIntegrityVerificationStorage::build_levels(&data, 64);
        assert!(levels.len() >= 2);
        assert!(levels[0].len() <= 64);

        let level_storages: Vec<Arc<MemoryStorage>> = levels
            .into_iter()
            .map(|l| Arc::new(MemoryStorage::new(l)))
            .collect();
        let data_storage = Arc::new(MemoryStorage::new(data.clone()));
        let mut chain: Vec<SharedStorage> = level_storages.iter().map(|l| l.clone() as SharedStorage).collect();
        chain.push(data_storage.clone());

        let tree = HierarchicalIntegrityVerificationStorage::new(master, chain, 64).unwrap();
        let mut buf = vec![0u8; 300];
        tree.read(1234, &mut buf).unwrap();
        assert_eq!(&buf[..], &data[1234..1534]);

        tree.write(10, b"update").unwrap();
        let mut back = [0u8; 6];
        tree.read(10, &mut back).unwrap();
        assert_eq!(&back, b"update");

        // Tamper with a middle hash level.
        level_storages[1].write(0, &[0u8; 4]).unwrap();
        assert!(matches!(
            tree.read(0, &mut back),
            Err(Error::IntegrityVerificationFailed { .. })
        ));
    }

    #[test]
    fn wrong_master_hash_is_rejected() {
        let data = pattern(256);
        let (mut master, levels) = HierarchicalIntegrityVerificationStorage::build_levels(&data, 64);
        master[0] ^= 1;
        let mut chain: Vec<SharedStorage> = levels
            .into_iter()
            .map(|l| Arc::new(MemoryStorage::new(l)) as SharedStorage)
            .collect();
        chain.push(Arc::new(MemoryStorage::new(data)));
        let tree = HierarchicalIntegrityVerificationStorage::new(master, chain, 64).unwrap();
        let mut buf = [0u8; 1];
        assert!(tree.read(0, &mut buf).is_err());
    }
}
