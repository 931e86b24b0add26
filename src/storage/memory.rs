//! In-memory storage.

use parking_lot::RwLock;

use super::{Storage, check_range};
use crate::{Error, Result};

/// A storage backed by a `Vec<u8>`.
///
/// The fixed variant rejects writes past the end; [`MemoryStorage::growable`]
/// extends itself instead.
#[derive(Debug)]
pub struct MemoryStorage {
    data: RwLock<Vec<u8>>,
    growable: bool,
}

impl MemoryStorage {
    /// Fixed-size storage over `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
            growable: false,
        }
    }

    /// Fixed-size storage of `size` zero bytes.
    pub fn with_size(size: usize) -> Self {
        Self::new(vec![0u8; size])
    }

    /// Storage that grows when written past its end.
    pub fn growable(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
            growable: true,
        }
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.data.read();
        check_range(offset, buf.len(), data.len() as u64)?;
        if buf.is_empty() {
            return Ok(());
        }
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut data = self.data.write();
        if self.growable {
            let end = offset
                .checked_add(buf.len() as u64)
                .ok_or_else(|| Error::out_of_range(offset, buf.len()))?;
            let end = usize::try_from(end).map_err(|_| Error::out_of_range(offset, buf.len()))?;
            if end > data.len() {
                data.resize(end, 0);
            }
        } else {
            check_range(offset, buf.len(), data.len() as u64)?;
        }
        if buf.is_empty() {
            return Ok(());
        }
        let start = offset as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn set_size(&self, size: u64) -> Result<()> {
        if !self.growable {
            return Err(Error::UnsupportedOperation(
                "fixed memory storage cannot be resized",
            ));
        }
        let size = usize::try_from(size).map_err(|_| Error::InvalidSize)?;
        self.data.write().resize(size, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_storage_rejects_out_of_bounds() {
        let s = MemoryStorage::new(vec![0; 8]);
        s.write(4, &[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            s.write(6, &[1, 2, 3]),
            Err(Error::OutOfRange { .. })
        ));
        let mut buf = [0u8; 4];
        s.read(4, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert!(s.read(5, &mut buf).is_err());
        assert!(s.set_size(16).is_err());
    }

    #[test]
    fn growable_storage_extends_on_write() {
        let s = MemoryStorage::growable(Vec::new());
        s.write(4, &[9, 9]).unwrap();
        assert_eq!(s.size().unwrap(), 6);
        assert_eq!(s.to_vec(), vec![0, 0, 0, 0, 9, 9]);
        s.set_size(2).unwrap();
        assert_eq!(s.to_vec(), vec![0, 0]);
    }

    #[test]
    fn empty_request_at_end_succeeds() {
        let s = MemoryStorage::new(vec![1, 2]);
        s.read(2, &mut []).unwrap();
        s.write(2, &[]).unwrap();
    }
}
