use std::sync::Weak;

use parking_lot::Mutex;

use super::filesystem::OpenHandles;
use crate::Result;
use crate::fs::{Directory, DirectoryEntry, read_all_entries};

/// An open directory enumeration tracked by its
/// [`super::FileSystemAccessor`].
pub struct DirectoryAccessor {
    directory: Box<dyn Directory>,
    id: u64,
    parent: Weak<Mutex<OpenHandles>>,
}

impl DirectoryAccessor {
    pub(crate) fn new(directory: Box<dyn Directory>, id: u64, parent: Weak<Mutex<OpenHandles>>) -> Self {
        Self {
            directory,
            id,
            parent,
        }
    }

    pub fn read(&mut self, entries: &mut [DirectoryEntry]) -> Result<usize> {
        self.directory.read(entries)
    }

    pub fn entry_count(&mut self) -> Result<u64> {
        self.directory.entry_count()
    }

    /// Every entry not yet read.
    pub fn read_all(&mut self) -> Result<Vec<DirectoryEntry>> {
        read_all_entries(self.directory.as_mut())
    }
}

impl Drop for DirectoryAccessor {
    fn drop(&mut self) {
        match self.parent.upgrade() {
            Some(handles) => handles.lock().close_directory(self.id),
            None if std::thread::panicking() => {}
            None => panic!("directory outlived its filesystem accessor"),
        }
    }
}
