//! Read-only filesystem over a RomFS image.

use std::sync::Arc;

use super::{
    Directory, DirectoryEntry, EntryListDirectory, EntryType, File, FileSystem, OpenDirectoryMode,
    OpenMode, StorageFile,
};
use crate::formats::romfs::{RomFsEntry, RomFsTables};
use crate::storage::{SharedStorage, SubStorage};
use crate::{Error, Result};

pub struct RomFsFileSystem {
    base: SharedStorage,
    tables: RomFsTables,
}

impl RomFsFileSystem {
    /// Load the image metadata from `base`.
    pub fn new(base: SharedStorage) -> Result<Self> {
        let tables = RomFsTables::read(base.as_ref())?;
        Ok(Self { base, tables })
    }

    pub fn tables(&self) -> &RomFsTables {
        &self.tables
    }
}

impl FileSystem for RomFsFileSystem {
    fn entry_type(&self, path: &str) -> Result<EntryType> {
        Ok(match self.tables.lookup(path)? {
            RomFsEntry::Directory(_) => EntryType::Directory,
            RomFsEntry::File(_) => EntryType::File,
        })
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        if mode.contains(OpenMode::WRITE) {
            return Err(Error::InvalidArgument("RomFS files can only be opened for reading"));
        }
        let RomFsEntry::File(offset) = self.tables.lookup(path)? else {
            return Err(Error::PathNotFound);
        };
        let entry = self.tables.file(offset)?;
        let start = self
            .tables
            .header
            .data_offset
            .checked_add(entry.data_offset)
            .ok_or(Error::InvalidRange)?;
        let storage = SubStorage::read_only(self.base.clone(), start, entry.data_size)?;
        Ok(Box::new(StorageFile::new(Arc::new(storage), mode)))
    }

    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>> {
        let RomFsEntry::Directory(offset) = self.tables.lookup(path)? else {
            return Err(Error::PathNotFound);
        };
        let mut entries: Vec<DirectoryEntry> = self
            .tables
            .child_directories(offset)?
            .into_iter()
            .map(|d| DirectoryEntry::directory(d.name))
            .collect();
        entries.extend(
            self.tables
                .child_files(offset)?
                .into_iter()
                .map(|f| DirectoryEntry::file(f.name, f.data_size)),
        );
        Ok(Box::new(EntryListDirectory::new(entries, mode)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::romfs::RomFsBuilder;
    use crate::fs::{CreateOptions, FileSystemExt};
    use crate::storage::{MemoryStorage, StorageExt};

    fn romfs() -> RomFsFileSystem {
        let mut builder = RomFsBuilder::new();
        builder
            .add_file("/data/level1.bin", Arc::new(MemoryStorage::new(vec![1; 40])))
            .unwrap()
            .add_file("/data/sub/level2.bin", Arc::new(MemoryStorage::new(vec![2; 3])))
            .unwrap()
            .add_file("/readme", Arc::new(MemoryStorage::new(b"read me".to_vec())))
            .unwrap();
        let image = builder.build().unwrap().read_all().unwrap();
        RomFsFileSystem::new(Arc::new(MemoryStorage::new(image))).unwrap()
    }

    #[test]
    fn reads_nested_files() {
        let fs = romfs();
        assert_eq!(fs.read_file("/readme").unwrap(), b"read me".to_vec());
        assert_eq!(fs.read_file("/data/sub/level2.bin").unwrap(), vec![2; 3]);
        assert_eq!(fs.read_file("data/./level1.bin").unwrap(), vec![1; 40]);
        assert_eq!(fs.entry_type("/data/sub").unwrap(), EntryType::Directory);
        assert!(matches!(fs.entry_type("/nope"), Err(Error::PathNotFound)));
    }

    #[test]
    fn lists_directories_then_files() {
        let fs = romfs();
        let entries = fs.read_dir("/data", OpenDirectoryMode::ALL).unwrap();
        assert_eq!(
            entries,
            vec![
                DirectoryEntry::directory("sub"),
                DirectoryEntry::file("level1.bin", 40),
            ]
        );
        let files = fs.read_dir("/", OpenDirectoryMode::FILE).unwrap();
        assert_eq!(files, vec![DirectoryEntry::file("readme", 7)]);
    }

    #[test]
    fn is_read_only() {
        let fs = romfs();
        assert!(matches!(
            fs.open_file("/readme", OpenMode::READ_WRITE),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            fs.create_file("/new", 0, CreateOptions::empty()),
            Err(Error::UnsupportedOperation(_))
        ));
        assert!(matches!(
            fs.open_file("/data", OpenMode::READ),
            Err(Error::PathNotFound)
        ));
        assert!(matches!(
            fs.open_directory("/readme", OpenDirectoryMode::ALL),
            Err(Error::PathNotFound)
        ));
    }
}
