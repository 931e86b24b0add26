//! A filesystem [`File`] viewed as a [`Storage`].

use parking_lot::Mutex;

use super::{Storage, check_range};
use crate::fs::{File, WriteOption};
use crate::{Error, Result};

/// Adapts an open file to the storage interface so storage layers can be
/// stacked on files (NAX0 payloads, nested archives).
pub struct FileStorage {
    file: Mutex<Box<dyn File>>,
}

impl FileStorage {
    pub fn new(file: Box<dyn File>) -> Self {
        Self {
            file: Mutex::new(file),
        }
    }

    pub fn into_inner(self) -> Box<dyn File> {
        self.file.into_inner()
    }
}

impl Storage for FileStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        check_range(offset, buf.len(), file.size()?)?;
        let n = file.read(offset, buf)?;
        if n != buf.len() {
            return Err(Error::out_of_range(offset, buf.len()));
        }
        Ok(())
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.lock().write(offset, buf, WriteOption::empty())
    }

    fn flush(&self) -> Result<()> {
        self.file.lock().flush()
    }

    fn size(&self) -> Result<u64> {
        self.file.lock().size()
    }

    fn set_size(&self, size: u64) -> Result<()> {
        self.file.lock().set_size(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{CreateOptions, FileSystem, InMemoryFileSystem, OpenMode};

    #[test]
    fn file_backed_storage() {
        let fs = InMemoryFileSystem::new();
        fs.create_file("/f", 8, CreateOptions::empty()).unwrap();
        let file = fs.open_file("/f", OpenMode::ALL).unwrap();
        let storage = FileStorage::new(file);
        storage.write(2, b"hi").unwrap();
        let mut buf = [0u8; 4];
        storage.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"\0\0hi");
        assert!(storage.read(6, &mut buf).is_err());
        storage.set_size(16).unwrap();
        assert_eq!(storage.size().unwrap(), 16);
    }
}
