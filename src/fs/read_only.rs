//! Write-rejecting wrapper.

use std::sync::Arc;

use super::{Directory, EntryType, File, FileSystem, OpenDirectoryMode, OpenMode};
use crate::{Error, Result};

/// Forwards lookups and reads to `base`; every mutation fails with
/// [`Error::UnsupportedOperation`] and opening a file for writing fails with
/// [`Error::WriteNotPermitted`].
pub struct ReadOnlyFileSystem {
    base: Arc<dyn FileSystem>,
}

impl ReadOnlyFileSystem {
    pub fn new(base: Arc<dyn FileSystem>) -> Self {
        Self { base }
    }
}

impl FileSystem for ReadOnlyFileSystem {
    fn entry_type(&self, path: &str) -> Result<EntryType> {
        self.base.entry_type(path)
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        if mode.intersects(OpenMode::WRITE | OpenMode::ALLOW_APPEND) {
            return Err(Error::WriteNotPermitted);
        }
        self.base.open_file(path, mode)
    }

    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>> {
        self.base.open_directory(path, mode)
    }
}
