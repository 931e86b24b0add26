//! An in-memory filesystem with per-entry attributes.
//!
//! Serves as the base for [`super::ConcatenationFileSystem`] in tests and
//! tools, and as a scratch filesystem anywhere a host directory is not
//! wanted.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{
    AttributeFileSystem, CreateOptions, Directory, DirectoryEntry, EntryListDirectory, EntryType,
    File, FileAttributes, FileSystem, OpenDirectoryMode, OpenMode, WriteOption, validate_read,
    validate_set_size, validate_write,
};
use crate::path::{self, PathParser};
use crate::{Error, Result};

type FileData = Arc<RwLock<Vec<u8>>>;

enum Node {
    File {
        data: FileData,
        attributes: FileAttributes,
    },
    Directory {
        children: BTreeMap<String, Node>,
        attributes: FileAttributes,
    },
}

impl Node {
    fn empty_directory(attributes: FileAttributes) -> Self {
        Node::Directory {
            children: BTreeMap::new(),
            attributes,
        }
    }

    fn entry_type(&self) -> EntryType {
        match self {
            Node::File { .. } => EntryType::File,
            Node::Directory { .. } => EntryType::Directory,
        }
    }

    fn find(&self, path: &str) -> Result<&Node> {
        let mut node = self;
        for segment in PathParser::new(path) {
            node = match node {
                Node::Directory { children, .. } => {
                    children.get(segment).ok_or(Error::PathNotFound)?
                }
                Node::File { .. } => return Err(Error::PathNotFound),
            };
        }
        Ok(node)
    }

    fn find_mut(&mut self, path: &str) -> Result<&mut Node> {
        let mut node = self;
        for segment in PathParser::new(path) {
            node = match node {
                Node::Directory { children, .. } => {
                    children.get_mut(segment).ok_or(Error::PathNotFound)?
                }
                Node::File { .. } => return Err(Error::PathNotFound),
            };
        }
        Ok(node)
    }

    /// Children of the directory at `path`.
    fn children_mut(&mut self, path: &str) -> Result<&mut BTreeMap<String, Node>> {
        match self.find_mut(path)? {
            Node::Directory { children, .. } => Ok(children),
            Node::File { .. } => Err(Error::PathNotFound),
        }
    }
}

/// Split a normalized non-root path into its parent and final name.
fn split(path: &str) -> Result<(&str, &str)> {
    let parent = path::parent(path).ok_or(Error::PathAlreadyExists)?;
    Ok((parent, path::file_name(path)))
}

/// A filesystem held entirely in memory.
pub struct InMemoryFileSystem {
    root: RwLock<Node>,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Node::empty_directory(FileAttributes::DIRECTORY)),
        }
    }

    fn insert(&self, path: &str, node: Node) -> Result<()> {
        let path = path::normalize(path)?;
        let (parent, name) = split(&path)?;
        let mut root = self.root.write();
        let children = root.children_mut(parent)?;
        if children.contains_key(name) {
            return Err(Error::PathAlreadyExists);
        }
        children.insert(name.to_owned(), node);
        Ok(())
    }

    fn remove(&self, path: &str, kind: EntryType, require_empty: bool) -> Result<Node> {
        let path = path::normalize(path)?;
        if path == "/" {
            return Err(Error::InvalidPath("the root cannot be removed"));
        }
        let (parent, name) = split(&path)?;
        let mut root = self.root.write();
        let children = root.children_mut(parent)?;
        match children.get(name) {
            Some(node) if node.entry_type() == kind => {
                if let (true, Node::Directory { children, .. }) = (require_empty, node) {
                    if !children.is_empty() {
                        return Err(Error::DirectoryNotEmpty);
                    }
                }
            }
            _ => return Err(Error::PathNotFound),
        }
        children.remove(name).ok_or(Error::PathNotFound)
    }

    fn rename(&self, old_path: &str, new_path: &str, kind: EntryType) -> Result<()> {
        let old_path = path::normalize(old_path)?;
        let new_path = path::normalize(new_path)?;
        if kind == EntryType::Directory && path::is_sub_path(&old_path, &new_path) && old_path != new_path {
            return Err(Error::InvalidPath("a directory cannot move inside itself"));
        }
        let (old_parent, old_name) = split(&old_path)?;
        let (new_parent, new_name) = split(&new_path)?;
        let mut root = self.root.write();
        if root.find(&old_path)?.entry_type() != kind {
            return Err(Error::PathNotFound);
        }
        if old_path == new_path {
            return Ok(());
        }
        if root.children_mut(new_parent)?.contains_key(new_name) {
            return Err(Error::PathAlreadyExists);
        }
        let node = root
            .children_mut(old_parent)?
            .remove(old_name)
            .ok_or(Error::PathNotFound)?;
        root.children_mut(new_parent)?.insert(new_name.to_owned(), node);
        debug!(from = %old_path, to = %new_path, "renamed");
        Ok(())
    }
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for InMemoryFileSystem {
    fn create_file(&self, path: &str, size: u64, _options: CreateOptions) -> Result<()> {
        let size = usize::try_from(size).map_err(|_| Error::InvalidSize)?;
        self.insert(
            path,
            Node::File {
                data: Arc::new(RwLock::new(vec![0u8; size])),
                attributes: FileAttributes::empty(),
            },
        )
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        self.remove(path, EntryType::File, false).map(drop)
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        self.create_directory_with_attributes(path, FileAttributes::empty())
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        self.remove(path, EntryType::Directory, true).map(drop)
    }

    fn delete_directory_recursively(&self, path: &str) -> Result<()> {
        self.remove(path, EntryType::Directory, false).map(drop)
    }

    fn clean_directory_recursively(&self, path: &str) -> Result<()> {
        let path = path::normalize(path)?;
        self.root.write().children_mut(&path)?.clear();
        Ok(())
    }

    fn rename_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.rename(old_path, new_path, EntryType::File)
    }

    fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.rename(old_path, new_path, EntryType::Directory)
    }

    fn entry_type(&self, path: &str) -> Result<EntryType> {
        let path = path::normalize(path)?;
        Ok(self.root.read().find(&path)?.entry_type())
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        let path = path::normalize(path)?;
        match self.root.read().find(&path)? {
            Node::File { data, .. } => Ok(Box::new(MemoryFile {
                data: data.clone(),
                mode,
            })),
            Node::Directory { .. } => Err(Error::PathNotFound),
        }
    }

    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>> {
        let path = path::normalize(path)?;
        let root = self.root.read();
        let Node::Directory { children, .. } = root.find(&path)? else {
            return Err(Error::PathNotFound);
        };
        let entries = children
            .iter()
            .map(|(name, node)| match node {
                Node::File { data, .. } => DirectoryEntry::file(name.clone(), data.read().len() as u64),
                Node::Directory { .. } => DirectoryEntry::directory(name.clone()),
            })
            .collect();
        Ok(Box::new(EntryListDirectory::new(entries, mode)))
    }
}

impl AttributeFileSystem for InMemoryFileSystem {
    fn create_directory_with_attributes(&self, path: &str, attributes: FileAttributes) -> Result<()> {
        self.insert(path, Node::empty_directory(attributes | FileAttributes::DIRECTORY))
    }

    fn file_attributes(&self, path: &str) -> Result<FileAttributes> {
        let path = path::normalize(path)?;
        Ok(match self.root.read().find(&path)? {
            Node::File { attributes, .. } => *attributes,
            Node::Directory { attributes, .. } => *attributes | FileAttributes::DIRECTORY,
        })
    }

    fn set_file_attributes(&self, path: &str, new: FileAttributes) -> Result<()> {
        let path = path::normalize(path)?;
        match self.root.write().find_mut(&path)? {
            Node::File { attributes, .. } => *attributes = new - FileAttributes::DIRECTORY,
            Node::Directory { attributes, .. } => *attributes = new | FileAttributes::DIRECTORY,
        }
        Ok(())
    }

    fn file_size(&self, path: &str) -> Result<u64> {
        let path = path::normalize(path)?;
        match self.root.read().find(&path)? {
            Node::File { data, .. } => Ok(data.read().len() as u64),
            Node::Directory { .. } => Err(Error::PathNotFound),
        }
    }
}

/// Handle to an in-memory file. Stays valid after the file is deleted.
struct MemoryFile {
    data: FileData,
    mode: OpenMode,
}

impl File for MemoryFile {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let data = self.data.read();
        let n = validate_read(self.mode, offset, buf.len(), data.len() as u64)?;
        let start = offset as usize;
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, offset: u64, buf: &[u8], _option: WriteOption) -> Result<()> {
        let mut data = self.data.write();
        if validate_write(self.mode, offset, buf.len(), data.len() as u64)? {
            let end = usize::try_from(offset + buf.len() as u64).map_err(|_| Error::InvalidSize)?;
            data.resize(end, 0);
        }
        let start = offset as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        validate_set_size(self.mode)?;
        let size = usize::try_from(size).map_err(|_| Error::InvalidSize)?;
        self.data.write().resize(size, 0);
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}
