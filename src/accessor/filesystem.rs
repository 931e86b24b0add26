use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{DirectoryAccessor, FileAccessor};
use crate::fs::{CreateOptions, EntryType, FileSystem, OpenDirectoryMode, OpenMode};
use crate::{Error, Result};

/// Handles currently open through one [`FileSystemAccessor`].
#[derive(Debug, Default)]
pub(crate) struct OpenHandles {
    next_id: u64,
    files: HashMap<u64, OpenMode>,
    directories: HashSet<u64>,
}

impl OpenHandles {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn close_file(&mut self, id: u64) {
        self.files.remove(&id);
    }

    pub(crate) fn close_directory(&mut self, id: u64) {
        self.directories.remove(&id);
    }
}

pub(crate) type SharedHandles = Arc<Mutex<OpenHandles>>;

/// A mounted filesystem together with the accounting of every file and
/// directory opened through it.
pub struct FileSystemAccessor {
    name: String,
    fs: Arc<dyn FileSystem>,
    handles: SharedHandles,
}

impl FileSystemAccessor {
    pub fn new(name: impl Into<String>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            name: name.into(),
            fs,
            handles: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn create_file(&self, path: &str, size: u64, options: CreateOptions) -> Result<()> {
        self.fs.create_file(path, size, options)
    }

    pub fn delete_file(&self, path: &str) -> Result<()> {
        self.fs.delete_file(path)
    }

    pub fn create_directory(&self, path: &str) -> Result<()> {
        self.fs.create_directory(path)
    }

    pub fn delete_directory(&self, path: &str) -> Result<()> {
        self.fs.delete_directory(path)
    }

    pub fn delete_directory_recursively(&self, path: &str) -> Result<()> {
        self.fs.delete_directory_recursively(path)
    }

    pub fn clean_directory_recursively(&self, path: &str) -> Result<()> {
        self.fs.clean_directory_recursively(path)
    }

    pub fn rename_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.fs.rename_file(old_path, new_path)
    }

    pub fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.fs.rename_directory(old_path, new_path)
    }

    pub fn entry_type(&self, path: &str) -> Result<EntryType> {
        self.fs.entry_type(path)
    }

    pub fn open_file(&self, path: &str, mode: OpenMode) -> Result<FileAccessor> {
        let file = self.fs.open_file(path, mode)?;
        let id = {
            let mut handles = self.handles.lock();
            let id = handles.next_id();
            handles.files.insert(id, mode);
            id
        };
        Ok(FileAccessor::new(
            file,
            mode,
            id,
            path,
            Arc::downgrade(&self.handles),
        ))
    }

    pub fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<DirectoryAccessor> {
        let directory = self.fs.open_directory(path, mode)?;
        let id = {
            let mut handles = self.handles.lock();
            let id = handles.next_id();
            handles.directories.insert(id);
            id
        };
        Ok(DirectoryAccessor::new(directory, id, Arc::downgrade(&self.handles)))
    }

    /// Commit the underlying filesystem.
    ///
    /// Fails with [`Error::WriteModeFileNotClosed`] while any file opened
    /// with write permission is still open.
    pub fn commit(&self) -> Result<()> {
        if self.has_open_write_files() {
            return Err(Error::WriteModeFileNotClosed);
        }
        debug!(mount = %self.name, "commit");
        self.fs.commit()
    }

    pub fn open_file_count(&self) -> usize {
        self.handles.lock().files.len()
    }

    pub fn open_directory_count(&self) -> usize {
        self.handles.lock().directories.len()
    }

    pub fn has_open_handles(&self) -> bool {
        let handles = self.handles.lock();
        !handles.files.is_empty() || !handles.directories.is_empty()
    }

    fn has_open_write_files(&self) -> bool {
        self.handles
            .lock()
            .files
            .values()
            .any(|mode| mode.contains(OpenMode::WRITE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{InMemoryFileSystem, WriteOption};

    fn accessor() -> FileSystemAccessor {
        let fs = InMemoryFileSystem::new();
        fs.create_directory("/d").unwrap();
        fs.create_file("/d/f", 4, CreateOptions::empty()).unwrap();
        FileSystemAccessor::new("sd", Arc::new(fs))
    }

    #[test]
    fn handles_are_counted_until_dropped() {
        let fs = accessor();
        let file = fs.open_file("/d/f", OpenMode::READ).unwrap();
        let dir = fs.open_directory("/d", OpenDirectoryMode::ALL).unwrap();
        assert_eq!((fs.open_file_count(), fs.open_directory_count()), (1, 1));
        drop(file);
        assert_eq!(fs.open_file_count(), 0);
        assert!(fs.has_open_handles());
        drop(dir);
        assert!(!fs.has_open_handles());

        assert!(matches!(fs.open_file("/missing", OpenMode::READ), Err(Error::PathNotFound)));
        assert_eq!(fs.open_file_count(), 0);
    }

    #[test]
    fn commit_waits_for_writers() {
        let fs = accessor();
        let reader = fs.open_file("/d/f", OpenMode::READ).unwrap();
        fs.commit().unwrap();

        let mut writer = fs.open_file("/d/f", OpenMode::WRITE).unwrap();
        assert!(matches!(fs.commit(), Err(Error::WriteModeFileNotClosed)));
        writer.write(0, b"abcd", WriteOption::FLUSH).unwrap();
        drop(writer);
        fs.commit().unwrap();
        drop(reader);
    }
}
