//! A host directory presented as a [`FileSystem`].

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{
    CreateOptions, Directory, DirectoryEntry, EntryListDirectory, EntryType, File, FileSystem,
    OpenDirectoryMode, OpenMode, WriteOption, validate_read, validate_set_size, validate_write,
};
use crate::path;
use crate::{Error, Result};

/// Map host errors onto the path taxonomy where one applies.
fn map_io(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::PathNotFound,
        io::ErrorKind::AlreadyExists => Error::PathAlreadyExists,
        io::ErrorKind::DirectoryNotEmpty => Error::DirectoryNotEmpty,
        _ => Error::Io(e),
    }
}

/// Every path is resolved relative to `root`; `..` cannot escape it because
/// paths are normalized first.
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// `root` must be an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !fs::metadata(&root).map_err(map_io)?.is_dir() {
            return Err(Error::PathNotFound);
        }
        debug!(root = %root.display(), "opened local filesystem");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf)> {
        let path = path::normalize(path)?.into_owned();
        let host = self.root.join(path.trim_start_matches('/'));
        Ok((path, host))
    }

    fn kind(host: &Path) -> Result<EntryType> {
        let meta = fs::metadata(host).map_err(map_io)?;
        Ok(if meta.is_dir() {
            EntryType::Directory
        } else {
            EntryType::File
        })
    }

    fn expect_kind(host: &Path, kind: EntryType) -> Result<()> {
        if Self::kind(host)? != kind {
            return Err(Error::PathNotFound);
        }
        Ok(())
    }

    fn rename(&self, old_path: &str, new_path: &str, kind: EntryType) -> Result<()> {
        let (old_path, old_host) = self.resolve(old_path)?;
        let (new_path, new_host) = self.resolve(new_path)?;
        Self::expect_kind(&old_host, kind)?;
        if old_path == new_path {
            return Ok(());
        }
        if kind == EntryType::Directory && path::is_sub_path(&old_path, &new_path) {
            return Err(Error::InvalidPath("a directory cannot move inside itself"));
        }
        if new_host.exists() {
            return Err(Error::PathAlreadyExists);
        }
        fs::rename(&old_host, &new_host).map_err(map_io)
    }
}

impl FileSystem for LocalFileSystem {
    fn create_file(&self, path: &str, size: u64, _options: CreateOptions) -> Result<()> {
        let (_, host) = self.resolve(path)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&host)
            .map_err(map_io)?;
        file.set_len(size)?;
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        let (_, host) = self.resolve(path)?;
        Self::expect_kind(&host, EntryType::File)?;
        fs::remove_file(&host).map_err(map_io)
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        let (_, host) = self.resolve(path)?;
        fs::create_dir(&host).map_err(map_io)
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let (path, host) = self.resolve(path)?;
        if path == "/" {
            return Err(Error::InvalidPath("the root cannot be removed"));
        }
        Self::expect_kind(&host, EntryType::Directory)?;
        fs::remove_dir(&host).map_err(map_io)
    }

    fn delete_directory_recursively(&self, path: &str) -> Result<()> {
        let (path, host) = self.resolve(path)?;
        if path == "/" {
            return Err(Error::InvalidPath("the root cannot be removed"));
        }
        Self::expect_kind(&host, EntryType::Directory)?;
        fs::remove_dir_all(&host).map_err(map_io)
    }

    fn clean_directory_recursively(&self, path: &str) -> Result<()> {
        let (_, host) = self.resolve(path)?;
        Self::expect_kind(&host, EntryType::Directory)?;
        for entry in fs::read_dir(&host).map_err(map_io)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path()).map_err(map_io)?;
            } else {
                fs::remove_file(entry.path()).map_err(map_io)?;
            }
        }
        Ok(())
    }

    fn rename_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.rename(old_path, new_path, EntryType::File)
    }

    fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.rename(old_path, new_path, EntryType::Directory)
    }

    fn entry_type(&self, path: &str) -> Result<EntryType> {
        let (_, host) = self.resolve(path)?;
        Self::kind(&host)
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        let (_, host) = self.resolve(path)?;
        Self::expect_kind(&host, EntryType::File)?;
        let file = OpenOptions::new()
            .read(true)
            .write(mode.contains(OpenMode::WRITE))
            .open(&host)
            .map_err(map_io)?;
        Ok(Box::new(LocalFile { file, mode }))
    }

    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>> {
        let (_, host) = self.resolve(path)?;
        Self::expect_kind(&host, EntryType::Directory)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&host).map_err(map_io)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "skipping non UTF-8 name");
                continue;
            };
            let meta = entry.metadata()?;
            entries.push(if meta.is_dir() {
                DirectoryEntry::directory(name)
            } else {
                DirectoryEntry::file(name, meta.len())
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Box::new(EntryListDirectory::new(entries, mode)))
    }
}

struct LocalFile {
    file: fs::File,
    mode: OpenMode,
}

impl File for LocalFile {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let size = self.file.metadata()?.len();
        let n = validate_read(self.mode, offset, buf.len(), size)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf[..n])?;
        Ok(n)
    }

    fn write(&mut self, offset: u64, buf: &[u8], option: WriteOption) -> Result<()> {
        let size = self.file.metadata()?.len();
        validate_write(self.mode, offset, buf.len(), size)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        if option.contains(WriteOption::FLUSH) {
            self.file.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.mode.contains(OpenMode::WRITE) {
            self.file.flush()?;
        }
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        validate_set_size(self.mode)?;
        self.file.set_len(size)?;
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}
