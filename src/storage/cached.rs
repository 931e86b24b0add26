//! Fixed-capacity LRU block cache over a base storage.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{SharedStorage, Storage, UNBOUNDED_SIZE, check_range};
use crate::{Error, Result};

struct CacheBlock {
    index: Option<u64>,
    buffer: Vec<u8>,
    len: usize,
    dirty: bool,
}

struct CacheState {
    /// Front is most recently used.
    blocks: VecDeque<CacheBlock>,
    size: u64,
}

/// Caches `block_size` blocks of its base, up to `capacity` of them.
///
/// Writes land in the cache and reach the base when the block is evicted or
/// on [`Storage::flush`]. The final block may be shorter than `block_size`.
pub struct CachedStorage {
    base: SharedStorage,
    block_size: usize,
    state: Mutex<CacheState>,
}

impl CachedStorage {
    pub fn new(base: SharedStorage, block_size: usize, capacity: usize) -> Result<Self> {
        if block_size == 0 || capacity == 0 {
            return Err(Error::InvalidArgument("cache block size and capacity must be non-zero"));
        }
        let size = base.size()?;
        if size == UNBOUNDED_SIZE {
            return Err(Error::InvalidSize);
        }
        let blocks = (0..capacity)
            .map(|_| CacheBlock {
                index: None,
                buffer: vec![0u8; block_size],
                len: 0,
                dirty: false,
            })
            .collect();
        Ok(Self {
            base,
            block_size,
            state: Mutex::new(CacheState { blocks, size }),
        })
    }

    fn write_back(&self, block: &mut CacheBlock) -> Result<()> {
        if let (Some(index), true) = (block.index, block.dirty) {
            trace!(block = index, "writing back cache block");
            self.base
                .write(index * self.block_size as u64, &block.buffer[..block.len])?;
            block.dirty = false;
        }
        Ok(())
    }

    /// Bring block `index` to the front of the list. When `load` is false
    /// the caller overwrites the whole block and the base is not read.
    fn promote(&self, state: &mut CacheState, index: u64, load: bool) -> Result<()> {
        if let Some(pos) = state.blocks.iter().position(|b| b.index == Some(index)) {
            if pos != 0 {
                if let Some(block) = state.blocks.remove(pos) {
                    state.blocks.push_front(block);
                }
            }
            return Ok(());
        }

        let Some(mut block) = state.blocks.pop_back() else {
            return Err(Error::InvalidArgument("cache has no blocks"));
        };
        if let Err(e) = self.write_back(&mut block) {
            state.blocks.push_back(block);
            return Err(e);
        }

        let start = index * self.block_size as u64;
        let len = (state.size - start).min(self.block_size as u64) as usize;
        block.index = None;
        block.len = len;
        if load {
            if let Err(e) = self.base.read(start, &mut block.buffer[..len]) {
                state.blocks.push_back(block);
                return Err(e);
            }
        }
        block.index = Some(index);
        state.blocks.push_front(block);
        Ok(())
    }

    fn for_each_block(
        &self,
        offset: u64,
        len: usize,
        mut f: impl FnMut(&mut CacheBlock, usize, std::ops::Range<usize>),
        writing: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        check_range(offset, len, state.size)?;
        let block_size = self.block_size as u64;
        let mut pos = offset;
        let mut done = 0usize;
        while done < len {
            let index = pos / block_size;
            let in_block = (pos % block_size) as usize;
            let piece = (self.block_size - in_block).min(len - done);
            let block_len = (state.size - index * block_size).min(block_size) as usize;
            let whole = in_block == 0 && piece == block_len;
            self.promote(&mut state, index, !(writing && whole))?;
            let block = &mut state.blocks[0];
            f(block, in_block, done..done + piece);
            if writing {
                block.dirty = true;
            }
            done += piece;
            pos += piece as u64;
        }
        Ok(())
    }
}

impl Storage for CachedStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.for_each_block(
            offset,
            buf.len(),
            |block, at, range| {
                let n = range.len();
                buf[range].copy_from_slice(&block.buffer[at..at + n]);
            },
            false,
        )
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.for_each_block(
            offset,
            buf.len(),
            |block, at, range| {
                let n = range.len();
                block.buffer[at..at + n].copy_from_slice(&buf[range]);
            },
            true,
        )
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        for block in state.blocks.iter_mut() {
            self.write_back(block)?;
        }
        self.base.flush()
    }

    fn size(&self) -> Result<u64> {
        Ok(self.state.lock().size)
    }

    fn set_size(&self, size: u64) -> Result<()> {
        let mut state = self.state.lock();
        for block in state.blocks.iter_mut() {
            self.write_back(block)?;
        }
        self.base.set_size(size)?;
        for block in state.blocks.iter_mut() {
            block.index = None;
        }
        debug!(old = state.size, new = size, "cached storage resized");
        state.size = size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::storage::{MemoryStorage, StorageExt};
    use crate::storage::testing::{RecordingStorage, pattern};

    #[test]
    fn reads_hit_the_cache() {
        let base = Arc::new(RecordingStorage::new(Arc::new(MemoryStorage::new(pattern(64)))));
        let cache = CachedStorage::new(base.clone(), 16, 2).unwrap();
        let mut buf = [0u8; 4];
        cache.read(0, &mut buf).unwrap();
        cache.read(4, &mut buf).unwrap();
        assert_eq!(&buf, &pattern(8)[4..8]);
        assert_eq!(*base.reads.lock(), vec![(0, 16)]);
    }

    #[test]
    fn least_recently_used_block_is_evicted() {
        let base = Arc::new(RecordingStorage::new(Arc::new(MemoryStorage::new(pattern(64)))));
        let cache = CachedStorage::new(base.clone(), 16, 2).unwrap();
        let mut buf = [0u8; 1];
        for offset in [0, 16, 0, 32, 0, 16] {
            cache.read(offset, &mut buf).unwrap();
        }
        // 0 and 16 load, 0 hits, 32 evicts 16, 0 hits, 16 reloads evicting 32.
        assert_eq!(*base.reads.lock(), vec![(0, 16), (16, 16), (32, 16), (16, 16)]);
    }

    #[test]
    fn dirty_blocks_reach_base_on_eviction_and_flush() {
        let mem = Arc::new(MemoryStorage::with_size(48));
        let cache = CachedStorage::new(mem.clone(), 16, 1).unwrap();
        cache.write(2, &[7, 7]).unwrap();
        assert_eq!(mem.to_vec()[2], 0);
        let mut buf = [0u8; 1];
        cache.read(20, &mut buf).unwrap();
        assert_eq!(&mem.to_vec()[2..4], &[7, 7]);

        cache.write(20, &[5]).unwrap();
        cache.flush().unwrap();
        assert_eq!(mem.to_vec()[20], 5);
    }

    #[test]
    fn short_tail_block() {
        let mem = Arc::new(MemoryStorage::new(pattern(20)));
        let cache = CachedStorage::new(mem.clone(), 16, 2).unwrap();
        let mut buf = [0u8; 4];
        cache.read(16, &mut buf).unwrap();
        assert_eq!(&buf, &pattern(20)[16..]);
        assert!(cache.read(17, &mut buf).is_err());
        cache.write(16, &[1, 2, 3, 4]).unwrap();
        cache.flush().unwrap();
        assert_eq!(&mem.to_vec()[16..], &[1, 2, 3, 4]);
    }

    #[test]
    fn whole_block_writes_skip_the_base_read() {
        let base = Arc::new(RecordingStorage::new(Arc::new(MemoryStorage::with_size(32))));
        let cache = CachedStorage::new(base.clone(), 16, 2).unwrap();
        cache.write(0, &[1u8; 16]).unwrap();
        assert!(base.reads.lock().is_empty());
    }

    #[test]
    fn resize_invalidates_blocks() {
        let mem = Arc::new(MemoryStorage::growable(pattern(16)));
        let cache = CachedStorage::new(mem.clone(), 16, 2).unwrap();
        cache.write(0, &[0xEE]).unwrap();
        cache.set_size(40).unwrap();
        assert_eq!(mem.size().unwrap(), 40);
        assert_eq!(mem.to_vec()[0], 0xEE);
        let mut buf = [0xFFu8; 8];
        cache.read(32, &mut buf).unwrap();
        assert_eq!(buf, [0; 8]);
    }

    proptest! {
        #[test]
        fn cache_matches_uncached_view(
            ops in prop::collection::vec((0u64..200, prop::collection::vec(any::<u8>(), 1..40), any::<bool>()), 1..40)
        ) {
            let plain = MemoryStorage::new(vec![0u8; 256]);
            let cache = CachedStorage::new(Arc::new(MemoryStorage::new(vec![0u8; 256])), 32, 3).unwrap();
            for (offset, data, is_write) in ops {
                let len = data.len().min((256 - offset) as usize);
                if is_write {
                    plain.write(offset, &data[..len]).unwrap();
                    cache.write(offset, &data[..len]).unwrap();
                } else {
                    let mut a = vec![0u8; len];
                    let mut b = vec![0u8; len];
                    plain.read(offset, &mut a).unwrap();
                    cache.read(offset, &mut b).unwrap();
                    prop_assert_eq!(a, b);
                }
            }
            cache.flush().unwrap();
            prop_assert_eq!(plain.read_all().unwrap(), cache.read_all().unwrap());
        }
    }
}
