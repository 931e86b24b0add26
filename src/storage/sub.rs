//! A bounded window into a base storage.

use std::sync::atomic::{AtomicU64, Ordering};

use super::{SharedStorage, Storage, UNBOUNDED_SIZE, check_range};
use crate::{Error, Result};

/// Access allowed through a [`SubStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Exposes `[offset, offset + size)` of a base storage as its own
/// zero-based storage.
///
/// A window that ends exactly at the end of its base may be made resizable;
/// resizing it resizes the base.
pub struct SubStorage {
    base: SharedStorage,
    offset: u64,
    size: AtomicU64,
    access: Access,
    resizable: bool,
}

impl SubStorage {
    /// Read-write window. The range must fit inside the base.
    pub fn new(base: SharedStorage, offset: u64, size: u64) -> Result<Self> {
        Self::with_access(base, offset, size, Access::ReadWrite)
    }

    pub fn read_only(base: SharedStorage, offset: u64, size: u64) -> Result<Self> {
        Self::with_access(base, offset, size, Access::ReadOnly)
    }

    pub fn with_access(base: SharedStorage, offset: u64, size: u64, access: Access) -> Result<Self> {
        let base_size = base.size()?;
        let end = offset.checked_add(size).ok_or(Error::InvalidSize)?;
        if base_size != UNBOUNDED_SIZE && end > base_size {
            return Err(Error::OutOfRange {
                offset,
                len: size,
            });
        }
        Ok(Self {
            base,
            offset,
            size: AtomicU64::new(size),
            access,
            resizable: false,
        })
    }

    /// Allow [`Storage::set_size`] to resize the base.
    pub fn resizable(mut self) -> Self {
        self.resizable = true;
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Storage for SubStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.size.load(Ordering::Acquire))?;
        self.base.read(self.offset + offset, buf)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.access == Access::ReadOnly {
            return Err(Error::WriteNotPermitted);
        }
        check_range(offset, buf.len(), self.size.load(Ordering::Acquire))?;
        self.base.write(self.offset + offset, buf)
    }

    fn flush(&self) -> Result<()> {
        self.base.flush()
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size.load(Ordering::Acquire))
    }

    fn set_size(&self, size: u64) -> Result<()> {
        if !self.resizable {
            return Err(Error::UnsupportedOperation("sub storage is not resizable"));
        }
        let current = self.size.load(Ordering::Acquire);
        if self.base.size()? != self.offset + current {
            return Err(Error::UnsupportedOperation(
                "only a window at the end of its base can be resized",
            ));
        }
        let end = self.offset.checked_add(size).ok_or(Error::InvalidSize)?;
        self.base.set_size(end)?;
        self.size.store(size, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn window_translates_offsets() {
        let base = Arc::new(MemoryStorage::new((0u8..16).collect()));
        let sub = SubStorage::new(base.clone(), 4, 8).unwrap();
        let mut buf = [0u8; 3];
        sub.read(1, &mut buf).unwrap();
        assert_eq!(buf, [5, 6, 7]);
        sub.write(0, &[0xFF]).unwrap();
        assert_eq!(base.to_vec()[4], 0xFF);
        assert!(sub.read(6, &mut buf).is_err());
    }

    #[test]
    fn window_must_fit_base() {
        let base = Arc::new(MemoryStorage::with_size(8));
        assert!(SubStorage::new(base.clone(), 4, 5).is_err());
        assert!(SubStorage::new(base, u64::MAX, 2).is_err());
    }

    #[test]
    fn read_only_rejects_writes() {
        let base = Arc::new(MemoryStorage::with_size(8));
        let sub = SubStorage::read_only(base, 0, 8).unwrap();
        assert!(matches!(sub.write(0, &[1]), Err(Error::WriteNotPermitted)));
    }

    #[test]
    fn tail_window_resizes_base() {
        let base = Arc::new(MemoryStorage::growable(vec![0; 8]));
        let sub = SubStorage::new(base.clone(), 4, 4).unwrap().resizable();
        sub.set_size(12).unwrap();
        assert_eq!(base.size().unwrap(), 16);
        assert_eq!(sub.size().unwrap(), 12);

        let fixed = SubStorage::new(base, 0, 4).unwrap();
        assert!(fixed.set_size(2).is_err());
    }
}
