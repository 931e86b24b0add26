//! Hierarchical filesystem abstraction and its implementations.
//!
//! A [`FileSystem`] exposes named files and directories under `/`-separated
//! paths. Files are byte-addressable handles opened with an [`OpenMode`];
//! directories enumerate [`DirectoryEntry`] records.
//!
//! | Module | Filesystem |
//! |--------|-----------|
//! | [`memory`] | in-memory tree with attributes |
//! | [`local`] | a host directory |
//! | [`partition`] | PFS0 / HFS0 archives over a storage |
//! | [`romfs`] | read-only RomFS images |
//! | [`concatenation`] | large files split into numbered chunks |
//! | [`layered`] | read-only union of several filesystems |
//! | [`subdirectory`] | a subtree presented as the root |
//! | [`read_only`] | write-rejecting wrapper |
//! | [`aes_xts`] | NAX0 encrypted files |
//! | [`copy`] | file and directory copies with progress reporting |
//!
//! Implementations normalize their path arguments with
//! [`crate::path::normalize`] before doing anything else, and validate
//! file-handle requests with [`validate_read`] / [`validate_write`] so every
//! filesystem reports permission and range errors identically.

use bitflags::bitflags;

use crate::{Error, Result};

pub mod aes_xts;
pub mod concatenation;
pub mod copy;
pub mod layered;
pub mod local;
pub mod memory;
pub mod partition;
pub mod read_only;
pub mod romfs;
pub mod storage_file;
pub mod subdirectory;

pub use aes_xts::AesXtsFileSystem;
pub use concatenation::ConcatenationFileSystem;
pub use layered::LayeredFileSystem;
pub use local::LocalFileSystem;
pub use memory::InMemoryFileSystem;
pub use partition::{Hfs0FileSystem, PartitionFileSystem, Pfs0FileSystem};
pub use read_only::ReadOnlyFileSystem;
pub use romfs::RomFsFileSystem;
pub use storage_file::StorageFile;
pub use subdirectory::SubdirectoryFileSystem;

bitflags! {
    /// Access requested when opening a file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenMode: u32 {
        const READ = 1;
        const WRITE = 1 << 1;
        /// Writes past the end grow the file.
        const ALLOW_APPEND = 1 << 2;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
        const ALL = Self::READ_WRITE.bits() | Self::ALLOW_APPEND.bits();
    }

    /// Entry kinds returned when enumerating a directory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenDirectoryMode: u32 {
        const DIRECTORY = 1;
        const FILE = 1 << 1;
        const ALL = Self::DIRECTORY.bits() | Self::FILE.bits();
        /// Report every file size as zero instead of computing it.
        const NO_FILE_SIZE = 1 << 31;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteOption: u32 {
        /// Flush after the write completes.
        const FLUSH = 1;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreateOptions: u32 {
        /// Create the file as a chunked concatenation file.
        const CONCATENATION_FILE = 1;
    }

    /// Attribute bits of an entry, as stored by [`AttributeFileSystem`]s.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAttributes: u32 {
        const READ_ONLY = 1;
        const HIDDEN = 1 << 1;
        const SYSTEM = 1 << 2;
        const DIRECTORY = 1 << 4;
        /// On a directory: the directory is a concatenation file.
        const ARCHIVE = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryType {
    #[default]
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    pub name: String,
    pub entry_type: EntryType,
    /// Zero for directories.
    pub size: u64,
}

impl DirectoryEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::File,
            size,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Directory,
            size: 0,
        }
    }
}

/// An open file.
pub trait File: Send {
    /// Read up to `buf.len()` bytes at `offset`, returning how many were
    /// read. Reads stop at the end of the file.
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, offset: u64, buf: &[u8], option: WriteOption) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn size(&mut self) -> Result<u64>;

    fn set_size(&mut self, size: u64) -> Result<()>;

    fn mode(&self) -> OpenMode;
}

/// An open directory enumeration.
pub trait Directory: Send {
    /// Fill `entries` from the current position, returning how many were
    /// written. Zero means the enumeration is exhausted.
    fn read(&mut self, entries: &mut [DirectoryEntry]) -> Result<usize>;

    /// Total number of entries this enumeration yields.
    fn entry_count(&mut self) -> Result<u64>;
}

/// A hierarchical filesystem.
///
/// Mutating operations default to [`Error::UnsupportedOperation`] and
/// `commit` to success, which is what read-only filesystems want.
pub trait FileSystem: Send + Sync {
    fn create_file(&self, _path: &str, _size: u64, _options: CreateOptions) -> Result<()> {
        Err(Error::UnsupportedOperation("create_file"))
    }

    fn delete_file(&self, _path: &str) -> Result<()> {
        Err(Error::UnsupportedOperation("delete_file"))
    }

    fn create_directory(&self, _path: &str) -> Result<()> {
        Err(Error::UnsupportedOperation("create_directory"))
    }

    fn delete_directory(&self, _path: &str) -> Result<()> {
        Err(Error::UnsupportedOperation("delete_directory"))
    }

    fn delete_directory_recursively(&self, _path: &str) -> Result<()> {
        Err(Error::UnsupportedOperation("delete_directory_recursively"))
    }

    /// Delete everything inside the directory but keep the directory.
    fn clean_directory_recursively(&self, _path: &str) -> Result<()> {
        Err(Error::UnsupportedOperation("clean_directory_recursively"))
    }

    fn rename_file(&self, _old_path: &str, _new_path: &str) -> Result<()> {
        Err(Error::UnsupportedOperation("rename_file"))
    }

    fn rename_directory(&self, _old_path: &str, _new_path: &str) -> Result<()> {
        Err(Error::UnsupportedOperation("rename_directory"))
    }

    fn entry_type(&self, path: &str) -> Result<EntryType>;

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>>;

    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>>;

    fn commit(&self) -> Result<()> {
        Ok(())
    }
}

/// A filesystem that stores [`FileAttributes`] per entry.
pub trait AttributeFileSystem: FileSystem {
    fn create_directory_with_attributes(&self, path: &str, attributes: FileAttributes) -> Result<()>;

    /// Attributes of the entry; directories always include
    /// [`FileAttributes::DIRECTORY`].
    fn file_attributes(&self, path: &str) -> Result<FileAttributes>;

    fn set_file_attributes(&self, path: &str, attributes: FileAttributes) -> Result<()>;

    fn file_size(&self, path: &str) -> Result<u64>;
}

/// Convenience methods available on every [`FileSystem`].
pub trait FileSystemExt: FileSystem {
    fn exists(&self, path: &str) -> bool {
        self.entry_type(path).is_ok()
    }

    /// Read a whole file into memory.
    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self.open_file(path, OpenMode::READ)?;
        let size = usize::try_from(file.size()?).map_err(|_| Error::InvalidSize)?;
        let mut buf = vec![0u8; size];
        let n = file.read(0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// All entries of a directory.
    fn read_dir(&self, path: &str, mode: OpenDirectoryMode) -> Result<Vec<DirectoryEntry>> {
        read_all_entries(self.open_directory(path, mode)?.as_mut())
    }
}

impl<F: FileSystem + ?Sized> FileSystemExt for F {}

/// Drain a directory enumeration.
pub fn read_all_entries(directory: &mut dyn Directory) -> Result<Vec<DirectoryEntry>> {
    let mut out = Vec::new();
    let mut batch = vec![DirectoryEntry::default(); 32];
    loop {
        let n = directory.read(&mut batch)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend(batch[..n].iter().cloned());
    }
}

/// Check a read against `mode` and the current file size, returning the
/// number of bytes that can be read.
pub fn validate_read(mode: OpenMode, offset: u64, len: usize, size: u64) -> Result<usize> {
    if !mode.contains(OpenMode::READ) {
        return Err(Error::ReadNotPermitted);
    }
    if offset > size {
        return Err(Error::out_of_range(offset, len));
    }
    Ok((size - offset).min(len as u64) as usize)
}

/// Check a write against `mode` and the current file size.
///
/// Returns `true` when the write ends past `size` and the file has to grow
/// first.
pub fn validate_write(mode: OpenMode, offset: u64, len: usize, size: u64) -> Result<bool> {
    if !mode.contains(OpenMode::WRITE) {
        return Err(Error::WriteNotPermitted);
    }
    let end = offset
        .checked_add(len as u64)
        .ok_or_else(|| Error::out_of_range(offset, len))?;
    if end > size {
        if !mode.contains(OpenMode::ALLOW_APPEND) {
            return Err(Error::AppendNotPermitted);
        }
        return Ok(true);
    }
    Ok(false)
}

pub fn validate_set_size(mode: OpenMode) -> Result<()> {
    if !mode.contains(OpenMode::WRITE) {
        return Err(Error::WriteNotPermitted);
    }
    Ok(())
}

/// A directory enumeration over a list computed when it was opened.
pub(crate) struct EntryListDirectory {
    entries: Vec<DirectoryEntry>,
    position: usize,
}

impl EntryListDirectory {
    /// Keep only the entry kinds `mode` asks for.
    pub(crate) fn new(mut entries: Vec<DirectoryEntry>, mode: OpenDirectoryMode) -> Self {
        entries.retain(|e| match e.entry_type {
            EntryType::Directory => mode.contains(OpenDirectoryMode::DIRECTORY),
            EntryType::File => mode.contains(OpenDirectoryMode::FILE),
        });
        if mode.contains(OpenDirectoryMode::NO_FILE_SIZE) {
            for entry in &mut entries {
                entry.size = 0;
            }
        }
        Self {
            entries,
            position: 0,
        }
    }
}

impl Directory for EntryListDirectory {
    fn read(&mut self, entries: &mut [DirectoryEntry]) -> Result<usize> {
        let remaining = &self.entries[self.position..];
        let n = remaining.len().min(entries.len());
        entries[..n].clone_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }

    fn entry_count(&mut self) -> Result<u64> {
        Ok(self.entries.len() as u64)
    }
}
