//! A [`Storage`] presented as a [`File`].

use super::{File, OpenMode, WriteOption, validate_read, validate_set_size, validate_write};
use crate::Result;
use crate::storage::SharedStorage;

/// File handle over a storage. Appending writes resize the storage first.
pub struct StorageFile {
    storage: SharedStorage,
    mode: OpenMode,
}

impl StorageFile {
    pub fn new(storage: SharedStorage, mode: OpenMode) -> Self {
        Self { storage, mode }
    }
}

impl File for StorageFile {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let n = validate_read(self.mode, offset, buf.len(), self.storage.size()?)?;
        self.storage.read(offset, &mut buf[..n])?;
        Ok(n)
    }

    fn write(&mut self, offset: u64, buf: &[u8], option: WriteOption) -> Result<()> {
        if validate_write(self.mode, offset, buf.len(), self.storage.size()?)? {
            self.storage.set_size(offset + buf.len() as u64)?;
        }
        self.storage.write(offset, buf)?;
        if option.contains(WriteOption::FLUSH) {
            self.storage.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.mode.contains(OpenMode::WRITE) {
            return Ok(());
        }
        self.storage.flush()
    }

    fn size(&mut self) -> Result<u64> {
        self.storage.size()
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        validate_set_size(self.mode)?;
        self.storage.set_size(size)
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}
