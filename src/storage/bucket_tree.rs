//! Offset-indexed entry tables ("bucket trees").
//!
//! A bucket tree maps every virtual offset in `[0, end_offset)` to the entry
//! whose range contains it. Entry `i` covers `[entry[i].offset,
//! entry[i + 1].offset)`; the last entry runs to `end_offset`.
//!
//! ## Serialized layout
//! ```text
//! node 0      offset node
//!   [0x00] index        (i32 LE)
//!   [0x04] bucket count (i32 LE)
//!   [0x08] end offset   (i64 LE)
//!   [0x10] first virtual offset of each bucket (i64 LE × count)
//! node 1..=n  buckets, one per node
//!   [0x00] index        (i32 LE)
//!   [0x04] entry count  (i32 LE)
//!   [0x08] end offset of this bucket (i64 LE)
//!   [0x10] entries      (E::SIZE × count)
//! ```
//! Every node is [`BUCKET_TREE_NODE_SIZE`] bytes.

use tracing::debug;

use super::{Storage, StorageExt};
use crate::utils::{le_i32, le_i64};
use crate::{Error, Result};

/// Size of every node in a serialized tree.
pub const BUCKET_TREE_NODE_SIZE: usize = 0x4000;

const NODE_HEADER_SIZE: usize = 0x10;

/// A fixed-size record stored in a bucket tree.
pub trait BucketTreeEntry: Clone + Send + Sync {
    /// Serialized size in bytes.
    const SIZE: usize;

    /// Virtual offset where this entry's range starts.
    fn offset(&self) -> u64;

    fn decode(buf: &[u8]) -> Result<Self>;

    /// Write `Self::SIZE` bytes into `buf`.
    fn encode(&self, buf: &mut [u8]);
}

/// A loaded bucket tree: entries sorted by offset, covering
/// `[0, end_offset)` without gaps.
#[derive(Debug, Clone)]
pub struct BucketTree<E> {
    entries: Vec<E>,
    end_offset: u64,
}

impl<E: BucketTreeEntry> BucketTree<E> {
    /// Build a tree from already-decoded entries.
    pub fn from_entries(entries: Vec<E>, end_offset: u64) -> Result<Self> {
        if let Some(first) = entries.first() {
            if first.offset() != 0 {
                return Err(Error::Parse("bucket tree does not start at offset 0"));
            }
        }
        for pair in entries.windows(2) {
            if pair[1].offset() <= pair[0].offset() {
                return Err(Error::Parse("bucket tree entries are not strictly increasing"));
            }
        }
        if entries.last().is_some_and(|e| e.offset() >= end_offset) {
            return Err(Error::Parse("bucket tree entry starts past the end offset"));
        }
        Ok(Self {
            entries,
            end_offset,
        })
    }

    /// Parse a serialized tree.
    pub fn load(storage: &dyn Storage) -> Result<Self> {
        let node = storage.read_vec(0, BUCKET_TREE_NODE_SIZE)?;
        let bucket_count = le_i32(&node, 4)?;
        let end_offset = le_i64(&node, 8)?;
        if bucket_count < 0 || end_offset < 0 {
            return Err(Error::Parse("negative bucket tree header field"));
        }
        let bucket_count = bucket_count as usize;
        if NODE_HEADER_SIZE + bucket_count * 8 > BUCKET_TREE_NODE_SIZE {
            return Err(Error::Parse("bucket tree offset node overflows"));
        }

        let mut entries = Vec::new();
        let mut bucket = vec![0u8; BUCKET_TREE_NODE_SIZE];
        for i in 0..bucket_count {
            storage.read(((i + 1) * BUCKET_TREE_NODE_SIZE) as u64, &mut bucket)?;
            let count = le_i32(&bucket, 4)?;
            if count < 0 || NODE_HEADER_SIZE + count as usize * E::SIZE > BUCKET_TREE_NODE_SIZE {
                return Err(Error::Parse("bucket entry count overflows its node"));
            }
            for j in 0..count as usize {
                let at = NODE_HEADER_SIZE + j * E::SIZE;
                entries.push(E::decode(&bucket[at..at + E::SIZE])?);
            }
        }
        debug!(buckets = bucket_count, entries = entries.len(), end_offset, "loaded bucket tree");
        Self::from_entries(entries, end_offset as u64)
    }

    /// Serialize into the node layout [`load`](Self::load) reads.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let per_bucket = (BUCKET_TREE_NODE_SIZE - NODE_HEADER_SIZE) / E::SIZE;
        let buckets: Vec<&[E]> = self.entries.chunks(per_bucket).collect();
        if NODE_HEADER_SIZE + buckets.len() * 8 > BUCKET_TREE_NODE_SIZE {
            return Err(Error::InvalidArgument("too many entries for a single offset node"));
        }
        let end = i64::try_from(self.end_offset).map_err(|_| Error::InvalidSize)?;
        let mut out = vec![0u8; (buckets.len() + 1) * BUCKET_TREE_NODE_SIZE];

        out[4..8].copy_from_slice(&(buckets.len() as i32).to_le_bytes());
        out[8..16].copy_from_slice(&end.to_le_bytes());
        for (i, bucket) in buckets.iter().enumerate() {
            let at = NODE_HEADER_SIZE + i * 8;
            out[at..at + 8].copy_from_slice(&(bucket[0].offset() as i64).to_le_bytes());
        }

        for (i, bucket) in buckets.iter().enumerate() {
            let node = &mut out[(i + 1) * BUCKET_TREE_NODE_SIZE..(i + 2) * BUCKET_TREE_NODE_SIZE];
            let bucket_end = buckets
                .get(i + 1)
                .map_or(self.end_offset, |next| next[0].offset());
            node[0..4].copy_from_slice(&(i as i32).to_le_bytes());
            node[4..8].copy_from_slice(&(bucket.len() as i32).to_le_bytes());
            node[8..16].copy_from_slice(&(bucket_end as i64).to_le_bytes());
            for (j, entry) in bucket.iter().enumerate() {
                let at = NODE_HEADER_SIZE + j * E::SIZE;
                entry.encode(&mut node[at..at + E::SIZE]);
            }
        }
        Ok(out)
    }

    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    /// End of the range covered by entry `index`.
    pub fn entry_end(&self, index: usize) -> u64 {
        self.entries
            .get(index + 1)
            .map_or(self.end_offset, |next| next.offset())
    }

    /// Position a cursor at the entry containing `offset`.
    pub fn find(&self, offset: u64) -> Result<BucketTreeCursor<'_, E>> {
        if offset >= self.end_offset || self.entries.is_empty() {
            return Err(Error::OutOfRange { offset, len: 0 });
        }
        let index = match self.entries.binary_search_by_key(&offset, |e| e.offset()) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Ok(BucketTreeCursor { tree: self, index })
    }
}

/// Position within a [`BucketTree`], advanced with
/// [`move_next`](Self::move_next).
pub struct BucketTreeCursor<'a, E> {
    tree: &'a BucketTree<E>,
    index: usize,
}

impl<E: BucketTreeEntry> BucketTreeCursor<'_, E> {
    pub fn entry(&self) -> &E {
        &self.tree.entries[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Virtual range `[start, end)` of the current entry.
    pub fn range(&self) -> (u64, u64) {
        (self.entry().offset(), self.tree.entry_end(self.index))
    }

    /// Step to the following entry; `false` at the last one.
    pub fn move_next(&mut self) -> bool {
        if self.index + 1 < self.tree.entries.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }
}

/// Walk `[offset, offset + len)` entry by entry, calling
/// `f(entry, entry_start, virtual_pos, range_in_request)`.
pub(crate) fn for_each_entry<E: BucketTreeEntry>(
    tree: &BucketTree<E>,
    offset: u64,
    len: usize,
    mut f: impl FnMut(&E, u64, u64, std::ops::Range<usize>) -> Result<()>,
) -> Result<()> {
    super::check_range(offset, len, tree.end_offset())?;
    if len == 0 {
        return Ok(());
    }
    let mut cursor = tree.find(offset)?;
    let mut pos = offset;
    let mut done = 0usize;
    loop {
        let (start, end) = cursor.range();
        let piece = (end - pos).min((len - done) as u64) as usize;
        f(cursor.entry(), start, pos, done..done + piece)?;
        done += piece;
        pos += piece as u64;
        if done == len {
            return Ok(());
        }
        if !cursor.move_next() {
            return Err(Error::out_of_range(pos, len - done));
        }
    }
}
