//! A directory of another filesystem presented as the root.

use std::sync::Arc;

use super::{CreateOptions, Directory, EntryType, File, FileSystem, OpenDirectoryMode, OpenMode};
use crate::path;
use crate::{Error, Result};

pub struct SubdirectoryFileSystem {
    base: Arc<dyn FileSystem>,
    root: String,
}

impl SubdirectoryFileSystem {
    /// `root` must name an existing directory of `base`.
    pub fn new(base: Arc<dyn FileSystem>, root: &str) -> Result<Self> {
        let root = path::normalize(root)?.into_owned();
        if base.entry_type(&root)? != EntryType::Directory {
            return Err(Error::PathNotFound);
        }
        Ok(Self { base, root })
    }

    /// Translate a path of this filesystem into one of the base.
    fn resolve(&self, path: &str) -> Result<String> {
        let path = path::normalize(path)?;
        Ok(match (self.root.as_str(), path.as_ref()) {
            ("/", inner) => inner.to_owned(),
            (root, "/") => root.to_owned(),
            (root, inner) => format!("{root}{inner}"),
        })
    }
}

impl FileSystem for SubdirectoryFileSystem {
    fn create_file(&self, path: &str, size: u64, options: CreateOptions) -> Result<()> {
        self.base.create_file(&self.resolve(path)?, size, options)
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        self.base.delete_file(&self.resolve(path)?)
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        self.base.create_directory(&self.resolve(path)?)
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        self.base.delete_directory(&self.resolve(path)?)
    }

    fn delete_directory_recursively(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        if resolved == self.root {
            return Err(Error::InvalidPath("the root cannot be removed"));
        }
        self.base.delete_directory_recursively(&resolved)
    }

    fn clean_directory_recursively(&self, path: &str) -> Result<()> {
        self.base.clean_directory_recursively(&self.resolve(path)?)
    }

    fn rename_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.base
            .rename_file(&self.resolve(old_path)?, &self.resolve(new_path)?)
    }

    fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.base
            .rename_directory(&self.resolve(old_path)?, &self.resolve(new_path)?)
    }

    fn entry_type(&self, path: &str) -> Result<EntryType> {
        self.base.entry_type(&self.resolve(path)?)
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        self.base.open_file(&self.resolve(path)?, mode)
    }

    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>> {
        self.base.open_directory(&self.resolve(path)?, mode)
    }

    fn commit(&self) -> Result<()> {
        self.base.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FileSystemExt, InMemoryFileSystem};

    #[test]
    fn paths_are_rerooted() {
        let base = Arc::new(InMemoryFileSystem::new());
        base.create_directory("/title").unwrap();
        base.create_directory("/title/save").unwrap();
        base.create_file("/outside", 1, CreateOptions::empty()).unwrap();

        let sub = SubdirectoryFileSystem::new(base.clone(), "/title/save").unwrap();
        sub.create_file("/data.bin", 3, CreateOptions::empty()).unwrap();
        assert_eq!(base.read_file("/title/save/data.bin").unwrap().len(), 3);
        assert_eq!(sub.entry_type("/").unwrap(), EntryType::Directory);
        assert!(matches!(sub.entry_type("/../outside"), Err(Error::DirectoryUnobtainable)));
        assert!(!sub.exists("/outside"));
        assert!(matches!(
            sub.delete_directory_recursively("/"),
            Err(Error::InvalidPath(_))
        ));
        sub.rename_file("/data.bin", "/renamed").unwrap();
        assert!(base.exists("/title/save/renamed"));
    }

    #[test]
    fn root_must_be_a_directory() {
        let base = Arc::new(InMemoryFileSystem::new());
        base.create_file("/f", 0, CreateOptions::empty()).unwrap();
        assert!(matches!(
            SubdirectoryFileSystem::new(base.clone(), "/f"),
            Err(Error::PathNotFound)
        ));
        assert!(matches!(
            SubdirectoryFileSystem::new(base, "/missing"),
            Err(Error::PathNotFound)
        ));
    }
}
