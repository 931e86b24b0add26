//! Random-access byte sources and the transform layers composed over them.
//!
//! Every layer implements [`Storage`]: a byte-addressable region with
//! positional `read`/`write`, `flush`, and a (possibly unknown) size. Layers
//! hold their children as [`SharedStorage`] so one base can back several
//! views, and a stack is released when its last owner is dropped.
//!
//! | Module | Layer |
//! |--------|-------|
//! | [`memory`] | in-memory leaf |
//! | [`stream`] | `Read + Write + Seek` leaf (host files, cursors) |
//! | [`null`] | zero-filling leaf |
//! | [`file`] | a [`crate::fs::File`] viewed as a storage |
//! | [`sub`] | bounded window into a base |
//! | [`concat`] | several storages presented end to end |
//! | [`cached`] | LRU block cache |
//! | [`alignment`] | arbitrary access over sector-granular storages |
//! | [`aes_ctr`] / [`aes_ctr_ex`] / [`aes_xts`] | cipher transforms |
//! | [`bucket_tree`] | offset-indexed entry tables |
//! | [`indirect`] | relocation over several sources |
//! | [`integrity`] | SHA-256 block verification, single and hierarchical |
//! | [`delta`] | NDV0 patch reconstruction |
//! | `compressed` | bucket-tree indexed LZ4 regions (`compression` feature) |
//!
//! ## Bounds
//!
//! Public entry points validate `offset` and `len` before any work: the end
//! of the request must not overflow and must not pass [`Storage::size`]
//! unless the storage documents that it grows on write. A size of
//! [`UNBOUNDED_SIZE`] means the storage has no known end; layers that need a
//! real length (concatenation, caching) reject such children.

use std::sync::Arc;

use crate::{Error, Result};

pub mod aes_ctr;
pub mod aes_ctr_ex;
pub mod aes_xts;
pub mod alignment;
pub mod bucket_tree;
pub mod cached;
#[cfg(feature = "compression")]
pub mod compressed;
pub mod concat;
pub mod delta;
pub mod file;
pub mod indirect;
pub mod integrity;
pub mod memory;
pub mod null;
pub mod stream;
pub mod sub;

pub use aes_ctr::Aes128CtrStorage;
pub use aes_ctr_ex::Aes128CtrExStorage;
pub use aes_xts::Aes128XtsStorage;
pub use alignment::AlignmentMatchingStorage;
pub use bucket_tree::{BucketTree, BucketTreeEntry};
pub use cached::CachedStorage;
#[cfg(feature = "compression")]
pub use compressed::CompressedStorage;
pub use concat::ConcatenationStorage;
pub use delta::DeltaFragment;
pub use file::FileStorage;
pub use indirect::IndirectStorage;
pub use integrity::{HierarchicalIntegrityVerificationStorage, IntegrityVerificationStorage};
pub use memory::MemoryStorage;
pub use null::NullStorage;
pub use stream::StreamStorage;
pub use sub::{Access, SubStorage};

/// Size reported by storages with no known end.
pub const UNBOUNDED_SIZE: u64 = u64::MAX;

/// A random-access byte source.
///
/// Methods take `&self`; implementations with mutable state synchronize
/// internally. `read` fills the whole buffer or fails - there are no short
/// reads at this level.
pub trait Storage: Send + Sync {
    /// Fill `buf` from `[offset, offset + buf.len())`.
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `buf` at `offset`.
    fn write(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Push buffered data down to the base, recursively.
    fn flush(&self) -> Result<()>;

    /// Logical length, or [`UNBOUNDED_SIZE`].
    fn size(&self) -> Result<u64>;

    /// Resize the storage. Most layers are fixed-size.
    fn set_size(&self, _size: u64) -> Result<()> {
        Err(Error::UnsupportedOperation("storage cannot be resized"))
    }
}

/// Reference-counted storage handle used to compose layers.
pub type SharedStorage = Arc<dyn Storage>;

/// Convenience methods available on every [`Storage`].
pub trait StorageExt: Storage {
    /// Read `len` bytes at `offset` into a new `Vec`.
    fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(offset, &mut buf)?;
        Ok(buf)
    }

    /// Read the whole storage into memory.
    fn read_all(&self) -> Result<Vec<u8>> {
        let size = self.size()?;
        if size == UNBOUNDED_SIZE {
            return Err(Error::InvalidSize);
        }
        let len = usize::try_from(size).map_err(|_| Error::InvalidSize)?;
        self.read_vec(0, len)
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

/// Check that `offset + len` neither overflows nor passes `size`.
///
/// `size == UNBOUNDED_SIZE` only rejects overflow.
#[inline]
pub fn check_range(offset: u64, len: usize, size: u64) -> Result<()> {
    let end = offset
        .checked_add(len as u64)
        .ok_or_else(|| Error::out_of_range(offset, len))?;
    if size != UNBOUNDED_SIZE && end > size {
        return Err(Error::out_of_range(offset, len));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_checks() {
        assert!(check_range(0, 10, 10).is_ok());
        assert!(check_range(10, 0, 10).is_ok());
        assert!(matches!(
            check_range(5, 6, 10),
            Err(Error::OutOfRange { offset: 5, len: 6 })
        ));
        assert!(check_range(u64::MAX - 1, 1, UNBOUNDED_SIZE).is_ok());
        assert!(check_range(u64::MAX, 1, UNBOUNDED_SIZE).is_err());
    }

    #[test]
    fn read_all_requires_known_size() {
        let null = NullStorage::new();
        assert!(matches!(null.read_all(), Err(Error::InvalidSize)));
        let mem = MemoryStorage::new(vec![1, 2, 3]);
        assert_eq!(mem.read_all().unwrap(), vec![1, 2, 3]);
    }
}
