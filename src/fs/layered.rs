//! Read-only union of several filesystems.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use super::{
    Directory, EntryListDirectory, EntryType, File, FileSystem, OpenDirectoryMode, OpenMode,
    read_all_entries,
};
use crate::path;
use crate::{Error, Result};

/// Probes its layers from the top (index 0) down.
///
/// The first layer that has an entry at a path decides what the path is: a
/// file in an upper layer hides a directory of the same name below it, and
/// vice versa. Directory listings merge every layer that has a directory at
/// the path, upper names shadowing lower ones. Mutations are unsupported.
pub struct LayeredFileSystem {
    layers: Vec<Arc<dyn FileSystem>>,
}

impl LayeredFileSystem {
    pub fn new(layers: Vec<Arc<dyn FileSystem>>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[Arc<dyn FileSystem>] {
        &self.layers
    }

    /// The topmost layer with an entry at `path`, and the entry's type.
    fn probe(&self, path: &str) -> Result<(usize, EntryType)> {
        for (index, layer) in self.layers.iter().enumerate() {
            match layer.entry_type(path) {
                Ok(kind) => return Ok((index, kind)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Err(Error::PathNotFound)
    }
}

impl FileSystem for LayeredFileSystem {
    fn entry_type(&self, path: &str) -> Result<EntryType> {
        let path = path::normalize(path)?;
        self.probe(&path).map(|(_, kind)| kind)
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        if mode.intersects(OpenMode::WRITE | OpenMode::ALLOW_APPEND) {
            return Err(Error::WriteNotPermitted);
        }
        let path = path::normalize(path)?;
        match self.probe(&path)? {
            (index, EntryType::File) => {
                trace!(path = %path, layer = index, "opening layered file");
                self.layers[index].open_file(&path, mode)
            }
            (_, EntryType::Directory) => Err(Error::PathNotFound),
        }
    }

    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>> {
        let path = path::normalize(path)?;
        let (top, kind) = self.probe(&path)?;
        if kind != EntryType::Directory {
            return Err(Error::PathNotFound);
        }
        let inner_mode = OpenDirectoryMode::ALL | (mode & OpenDirectoryMode::NO_FILE_SIZE);
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for layer in &self.layers[top..] {
            match layer.entry_type(&path) {
                Ok(EntryType::Directory) => {}
                Ok(EntryType::File) => continue,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
            let mut dir = layer.open_directory(&path, inner_mode)?;
            for entry in read_all_entries(dir.as_mut())? {
                if seen.insert(entry.name.clone()) {
                    entries.push(entry);
                }
            }
        }
        Ok(Box::new(EntryListDirectory::new(entries, mode)))
    }
}
