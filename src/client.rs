//! The entry point for mount-addressed filesystem access.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hakkit_fs::client::FsClient;
//! use hakkit_fs::fs::{InMemoryFileSystem, OpenMode, WriteOption, CreateOptions};
//!
//! # fn main() -> hakkit_fs::Result<()> {
//! let client = FsClient::new();
//! client.mount("save", Arc::new(InMemoryFileSystem::new()))?;
//! client.create_file("save:/slot0", 0, CreateOptions::empty())?;
//! let mut file = client.open_file("save:/slot0", OpenMode::ALL)?;
//! file.write(0, b"progress", WriteOption::FLUSH)?;
//! drop(file);
//! client.commit("save")?;
//! # Ok(())
//! # }
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::accessor::{DirectoryAccessor, FileAccessor, FileSystemAccessor, MountTable};
use crate::fs::{CreateOptions, DirectoryEntry, EntryType, FileSystem, OpenDirectoryMode, OpenMode};
use crate::path;
use crate::{Error, Result};

/// A file opened through an [`FsClient`].
pub struct FileHandle(FileAccessor);

impl FileHandle {
    /// Read the whole file from the start.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let size = usize::try_from(self.0.size()?).map_err(|_| Error::InvalidSize)?;
        let mut buf = vec![0u8; size];
        let n = self.0.read(0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl Deref for FileHandle {
    type Target = FileAccessor;

    fn deref(&self) -> &FileAccessor {
        &self.0
    }
}

impl DerefMut for FileHandle {
    fn deref_mut(&mut self) -> &mut FileAccessor {
        &mut self.0
    }
}

/// A directory opened through an [`FsClient`].
pub struct DirectoryHandle(DirectoryAccessor);

impl Deref for DirectoryHandle {
    type Target = DirectoryAccessor;

    fn deref(&self) -> &DirectoryAccessor {
        &self.0
    }
}

impl DerefMut for DirectoryHandle {
    fn deref_mut(&mut self) -> &mut DirectoryAccessor {
        &mut self.0
    }
}

/// Owns a mount table and routes `mount:/path` requests to it.
///
/// Each client is independent; there is no process-wide state.
#[derive(Default)]
pub struct FsClient {
    mounts: MountTable,
}

impl FsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&self, name: &str, fs: Arc<dyn FileSystem>) -> Result<()> {
        self.mounts.mount(FileSystemAccessor::new(name, fs))
    }

    /// # Panics
    /// If handles opened under `name` are still alive.
    pub fn unmount(&self, name: &str) -> Result<()> {
        self.mounts.unmount(name)
    }

    pub fn is_mounted(&self, name: &str) -> bool {
        self.mounts.is_mounted(name)
    }

    pub fn mount_table(&self) -> &MountTable {
        &self.mounts
    }

    fn resolve<'p>(&self, path: &'p str) -> Result<(Arc<FileSystemAccessor>, &'p str)> {
        let (name, sub_path) = path::split_mount_name(path)?;
        Ok((self.mounts.find(name)?, sub_path))
    }

    /// Resolve two paths that must live on the same mount.
    fn resolve_pair<'p>(
        &self,
        old_path: &'p str,
        new_path: &'p str,
    ) -> Result<(Arc<FileSystemAccessor>, &'p str, &'p str)> {
        let (old_name, old_sub) = path::split_mount_name(old_path)?;
        let (new_name, new_sub) = path::split_mount_name(new_path)?;
        if old_name != new_name {
            return Err(Error::InvalidArgument("rename across mounts"));
        }
        Ok((self.mounts.find(old_name)?, old_sub, new_sub))
    }

    pub fn create_file(&self, path: &str, size: u64, options: CreateOptions) -> Result<()> {
        let (fs, path) = self.resolve(path)?;
        fs.create_file(path, size, options)
    }

    pub fn delete_file(&self, path: &str) -> Result<()> {
        let (fs, path) = self.resolve(path)?;
        fs.delete_file(path)
    }

    pub fn create_directory(&self, path: &str) -> Result<()> {
        let (fs, path) = self.resolve(path)?;
        fs.create_directory(path)
    }

    pub fn delete_directory(&self, path: &str) -> Result<()> {
        let (fs, path) = self.resolve(path)?;
        fs.delete_directory(path)
    }

    pub fn delete_directory_recursively(&self, path: &str) -> Result<()> {
        let (fs, path) = self.resolve(path)?;
        fs.delete_directory_recursively(path)
    }

    pub fn clean_directory_recursively(&self, path: &str) -> Result<()> {
        let (fs, path) = self.resolve(path)?;
        fs.clean_directory_recursively(path)
    }

    pub fn rename_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        let (fs, old_path, new_path) = self.resolve_pair(old_path, new_path)?;
        fs.rename_file(old_path, new_path)
    }

    pub fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<()> {
        let (fs, old_path, new_path) = self.resolve_pair(old_path, new_path)?;
        fs.rename_directory(old_path, new_path)
    }

    pub fn entry_type(&self, path: &str) -> Result<EntryType> {
        let (fs, path) = self.resolve(path)?;
        fs.entry_type(path)
    }

    pub fn open_file(&self, path: &str, mode: OpenMode) -> Result<FileHandle> {
        let (fs, path) = self.resolve(path)?;
        fs.open_file(path, mode).map(FileHandle)
    }

    pub fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<DirectoryHandle> {
        let (fs, path) = self.resolve(path)?;
        fs.open_directory(path, mode).map(DirectoryHandle)
    }

    /// List a directory in one call.
    pub fn read_dir(&self, path: &str, mode: OpenDirectoryMode) -> Result<Vec<DirectoryEntry>> {
        self.open_directory(path, mode)?.read_all()
    }

    pub fn commit(&self, name: &str) -> Result<()> {
        self.mounts.find(name)?.commit()
    }
}
