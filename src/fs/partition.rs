//! PFS0 / HFS0 archives as a flat, single-directory filesystem.

use std::sync::Arc;

use tracing::warn;

use super::{
    Directory, DirectoryEntry, EntryListDirectory, EntryType, File, FileSystem, OpenDirectoryMode,
    OpenMode, WriteOption, validate_read, validate_set_size, validate_write,
};
use crate::crypto::hash::sha256;
use crate::formats::hfs0::Hfs0Entry;
use crate::formats::pfs0::{PartitionEntry, PartitionFile, PartitionMetadata, Pfs0Entry};
use crate::path;
use crate::storage::{SharedStorage, StorageExt, SubStorage};
use crate::{Error, Result};

/// A partition archive read from a storage.
///
/// Files can be opened for writing in place; they can never change size,
/// and nothing can be created, deleted or renamed.
pub struct PartitionFileSystem<E> {
    base: SharedStorage,
    metadata: PartitionMetadata<E>,
}

pub type Pfs0FileSystem = PartitionFileSystem<Pfs0Entry>;
pub type Hfs0FileSystem = PartitionFileSystem<Hfs0Entry>;

impl<E: PartitionEntry> PartitionFileSystem<E> {
    pub fn new(base: SharedStorage) -> Result<Self> {
        let metadata = PartitionMetadata::read(base.as_ref())?;
        Ok(Self { base, metadata })
    }

    pub fn files(&self) -> &[PartitionFile<E>] {
        &self.metadata.files
    }

    fn lookup(&self, path: &str) -> Result<&PartitionFile<E>> {
        let path = path::normalize(path)?;
        let name = path.strip_prefix('/').unwrap_or(&path);
        if name.is_empty() || name.contains('/') {
            return Err(Error::PathNotFound);
        }
        self.metadata.find(name).ok_or(Error::PathNotFound)
    }
}

impl<E: PartitionEntry> FileSystem for PartitionFileSystem<E> {
    fn entry_type(&self, path: &str) -> Result<EntryType> {
        if path::normalize(path)? == "/" {
            return Ok(EntryType::Directory);
        }
        self.lookup(path).map(|_| EntryType::File)
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        let file = self.lookup(path)?;
        let storage = SubStorage::new(
            self.base.clone(),
            self.metadata.data_offset + file.entry.offset(),
            file.entry.size(),
        )?;
        Ok(Box::new(PartitionFileHandle {
            storage: Arc::new(storage),
            hashed_region: file.entry.hashed_region(),
            mode,
        }))
    }

    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>> {
        if path::normalize(path)? != "/" {
            return Err(Error::PathNotFound);
        }
        let entries = self
            .metadata
            .files
            .iter()
            .map(|f| DirectoryEntry::file(f.name.clone(), f.entry.size()))
            .collect();
        Ok(Box::new(EntryListDirectory::new(entries, mode)))
    }
}

struct PartitionFileHandle {
    storage: SharedStorage,
    hashed_region: Option<(u64, [u8; 32])>,
    mode: OpenMode,
}

impl PartitionFileHandle {
    /// Verify the hashed leading region if `[offset, offset + len)` touches
    /// it.
    fn verify(&self, offset: u64, len: usize) -> Result<()> {
        let Some((hashed, expected)) = self.hashed_region else {
            return Ok(());
        };
        if len == 0 || offset >= hashed {
            return Ok(());
        }
        let region = self.storage.read_vec(0, hashed as usize)?;
        if sha256(&region) != expected {
            warn!(hashed, "partition file hash mismatch");
            return Err(Error::IntegrityVerificationFailed { offset: 0 });
        }
        Ok(())
    }
}

impl File for PartitionFileHandle {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let n = validate_read(self.mode, offset, buf.len(), self.storage.size()?)?;
        self.verify(offset, n)?;
        self.storage.read(offset, &mut buf[..n])?;
        Ok(n)
    }

    fn write(&mut self, offset: u64, buf: &[u8], option: WriteOption) -> Result<()> {
        if validate_write(self.mode, offset, buf.len(), self.storage.size()?)? {
            return Err(Error::UnsupportedOperation("partition files cannot grow"));
        }
        if self
            .hashed_region
            .is_some_and(|(hashed, _)| offset < hashed && !buf.is_empty())
        {
            return Err(Error::UnsupportedOperation(
                "the hashed region of a partition file is immutable",
            ));
        }
        self.storage.write(offset, buf)?;
        if option.contains(WriteOption::FLUSH) {
            self.storage.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.mode.contains(OpenMode::WRITE) {
            self.storage.flush()?;
        }
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        self.storage.size()
    }

    fn set_size(&mut self, _size: u64) -> Result<()> {
        validate_set_size(self.mode)?;
        Err(Error::UnsupportedOperation("partition files cannot be resized"))
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::pfs0::PartitionFsBuilder;
    use crate::fs::{CreateOptions, FileSystemExt};
    use crate::storage::MemoryStorage;

    fn image<E: PartitionEntry>(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = PartitionFsBuilder::new();
        for (name, data) in files {
            builder.add_file(*name, Arc::new(MemoryStorage::new(data.to_vec())));
        }
        builder.build::<E>().unwrap().read_all().unwrap()
    }

    #[test]
    fn lists_and_reads_files() {
        let bytes = image::<Pfs0Entry>(&[("a.nca", b"AAAA"), ("b.tik", b"BB")]);
        let fs = Pfs0FileSystem::new(Arc::new(MemoryStorage::new(bytes))).unwrap();
        let names: Vec<_> = fs
            .read_dir("/", OpenDirectoryMode::ALL)
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.size))
            .collect();
        assert_eq!(names, vec![("a.nca".to_string(), 4), ("b.tik".to_string(), 2)]);
        assert_eq!(fs.read_file("/b.tik").unwrap(), b"BB".to_vec());
        assert_eq!(fs.entry_type("/").unwrap(), EntryType::Directory);
        assert!(matches!(fs.entry_type("/c"), Err(Error::PathNotFound)));
        assert!(matches!(
            fs.open_directory("/a.nca", OpenDirectoryMode::ALL),
            Err(Error::PathNotFound)
        ));
    }

    #[test]
    fn in_place_writes_only() {
        let base = Arc::new(MemoryStorage::new(image::<Pfs0Entry>(&[("f", b"0123")])));
        let fs = Pfs0FileSystem::new(base.clone()).unwrap();
        let mut f = fs.open_file("/f", OpenMode::ALL).unwrap();
        f.write(1, b"xy", WriteOption::empty()).unwrap();
        assert_eq!(fs.read_file("/f").unwrap(), b"0xy3".to_vec());
        assert!(f.write(3, b"zz", WriteOption::empty()).is_err());
        assert!(f.set_size(8).is_err());
        assert!(matches!(
            fs.create_file("/g", 1, CreateOptions::empty()),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn hashed_region_is_verified() {
        let mut bytes = image::<Hfs0Entry>(&[("secure", &[7u8; 0x280])]);
        let fs = Hfs0FileSystem::new(Arc::new(MemoryStorage::new(bytes.clone()))).unwrap();
        assert_eq!(fs.read_file("/secure").unwrap(), vec![7u8; 0x280]);
        let data_offset = PartitionMetadata::<Hfs0Entry>::read(&MemoryStorage::new(bytes.clone()))
            .unwrap()
            .data_offset as usize;

        bytes[data_offset + 0x10] ^= 0xFF;
        let fs = Hfs0FileSystem::new(Arc::new(MemoryStorage::new(bytes))).unwrap();
        let mut f = fs.open_file("/secure", OpenMode::READ).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            f.read(0x100, &mut buf),
            Err(Error::IntegrityVerificationFailed { .. })
        ));
        // Past the hashed region the corruption is not detected.
        assert_eq!(f.read(0x200, &mut buf).unwrap(), 4);
    }
}
