//! Files larger than the base filesystem allows, stored as numbered chunks.
//!
//! A concatenation file is a directory carrying [`FileAttributes::ARCHIVE`]
//! whose children `00`, `01`, ... hold consecutive slices of the content.
//! Every chunk but the last is exactly the sub-file size; a file of size `s`
//! has `s / sub_file_size + 1` chunks, so the last chunk may be empty.
//!
//! Outside of this module a concatenation file looks like a plain file:
//! [`FileSystem::entry_type`] reports [`EntryType::File`] and directory
//! listings report it as a file with the summed size.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    AttributeFileSystem, CreateOptions, Directory, DirectoryEntry, EntryType, File, FileAttributes,
    FileSystem, OpenDirectoryMode, OpenMode, WriteOption, validate_read, validate_set_size,
    validate_write,
};
use crate::path;
use crate::{Error, Result};

/// Chunk size used by [`ConcatenationFileSystem::new`].
pub const DEFAULT_SUB_FILE_SIZE: u64 = 0xFFFF_0000;

fn sub_file_path(path: &str, index: usize) -> String {
    path::combine(path, &format!("{index:02}"))
}

/// Size of chunk `index` of a file of `size` bytes.
fn chunk_size(size: u64, sub_file_size: u64, index: usize) -> u64 {
    let start = index as u64 * sub_file_size;
    size.saturating_sub(start).min(sub_file_size)
}

fn chunk_count(size: u64, sub_file_size: u64) -> usize {
    (size / sub_file_size) as usize + 1
}

pub struct ConcatenationFileSystem {
    base: Arc<dyn AttributeFileSystem>,
    sub_file_size: u64,
}

impl ConcatenationFileSystem {
    pub fn new(base: Arc<dyn AttributeFileSystem>) -> Self {
        Self {
            base,
            sub_file_size: DEFAULT_SUB_FILE_SIZE,
        }
    }

    pub fn with_sub_file_size(base: Arc<dyn AttributeFileSystem>, sub_file_size: u64) -> Result<Self> {
        if sub_file_size == 0 {
            return Err(Error::InvalidArgument("sub-file size must be non-zero"));
        }
        Ok(Self {
            base,
            sub_file_size,
        })
    }

    pub fn sub_file_size(&self) -> u64 {
        self.sub_file_size
    }

    /// `true` if `path` is a concatenation file. Missing paths are not.
    pub fn is_concatenation_file(&self, path: &str) -> bool {
        self.base.file_attributes(path).is_ok_and(|attributes| {
            attributes.contains(FileAttributes::DIRECTORY | FileAttributes::ARCHIVE)
        })
    }

    fn sub_file_count(&self, path: &str) -> usize {
        (0..)
            .take_while(|&i| {
                self.base.entry_type(&sub_file_path(path, i)).ok() == Some(EntryType::File)
            })
            .count()
    }

    fn concatenation_file_size(&self, path: &str) -> Result<u64> {
        (0..self.sub_file_count(path)).try_fold(0u64, |total, i| {
            Ok(total + self.base.file_size(&sub_file_path(path, i))?)
        })
    }

    /// Refuse to treat the inside of a concatenation file as a directory.
    fn check_parent(&self, path: &str) -> Result<()> {
        match path::parent(path) {
            Some(parent) if self.is_concatenation_file(parent) => Err(Error::PathNotFound),
            _ => Ok(()),
        }
    }

    fn create_chunks(&self, path: &str, size: u64) -> Result<()> {
        for i in 0..chunk_count(size, self.sub_file_size) {
            self.base.create_file(
                &sub_file_path(path, i),
                chunk_size(size, self.sub_file_size, i),
                CreateOptions::empty(),
            )?;
        }
        Ok(())
    }
}

impl FileSystem for ConcatenationFileSystem {
    fn create_file(&self, path: &str, size: u64, options: CreateOptions) -> Result<()> {
        let path = path::normalize(path)?;
        self.check_parent(&path)?;
        if !options.contains(CreateOptions::CONCATENATION_FILE) {
            return self.base.create_file(&path, size, options);
        }
        self.base
            .create_directory_with_attributes(&path, FileAttributes::ARCHIVE)?;
        if let Err(e) = self.create_chunks(&path, size) {
            // Leave nothing half-created behind.
            if let Err(cleanup) = self.base.delete_directory_recursively(&path) {
                warn!(path = %path, error = %cleanup, "failed to remove partial concatenation file");
            }
            return Err(e);
        }
        debug!(
            path = %path,
            size,
            chunks = chunk_count(size, self.sub_file_size),
            "created concatenation file"
        );
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        let path = path::normalize(path)?;
        if !self.is_concatenation_file(&path) {
            return self.base.delete_file(&path);
        }
        let count = self.sub_file_count(&path);
        for i in (0..count).rev() {
            self.base.delete_file(&sub_file_path(&path, i))?;
        }
        self.base.delete_directory(&path)?;
        debug!(path = %path, chunks = count, "deleted concatenation file");
        Ok(())
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        let path = path::normalize(path)?;
        self.check_parent(&path)?;
        self.base.create_directory(&path)
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let path = path::normalize(path)?;
        if self.is_concatenation_file(&path) {
            return Err(Error::PathNotFound);
        }
        self.base.delete_directory(&path)
    }

    fn delete_directory_recursively(&self, path: &str) -> Result<()> {
        let path = path::normalize(path)?;
        if self.is_concatenation_file(&path) {
            return Err(Error::PathNotFound);
        }
        self.base.delete_directory_recursively(&path)
    }

    fn clean_directory_recursively(&self, path: &str) -> Result<()> {
        let path = path::normalize(path)?;
        if self.is_concatenation_file(&path) {
            return Err(Error::PathNotFound);
        }
        self.base.clean_directory_recursively(&path)
    }

    fn rename_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = path::normalize(old_path)?;
        let new_path = path::normalize(new_path)?;
        self.check_parent(&new_path)?;
        if self.is_concatenation_file(&old_path) {
            self.base.rename_directory(&old_path, &new_path)
        } else {
            self.base.rename_file(&old_path, &new_path)
        }
    }

    fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = path::normalize(old_path)?;
        let new_path = path::normalize(new_path)?;
        if self.is_concatenation_file(&old_path) {
            return Err(Error::PathNotFound);
        }
        self.check_parent(&new_path)?;
        self.base.rename_directory(&old_path, &new_path)
    }

    fn entry_type(&self, path: &str) -> Result<EntryType> {
        let path = path::normalize(path)?;
        if self.is_concatenation_file(&path) {
            return Ok(EntryType::File);
        }
        self.base.entry_type(&path)
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        let path = path::normalize(path)?;
        if !self.is_concatenation_file(&path) {
            return self.base.open_file(&path, mode);
        }
        let files = (0..self.sub_file_count(&path))
            .map(|i| self.base.open_file(&sub_file_path(&path, i), mode))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(ConcatenationFile {
            base: self.base.clone(),
            path: path.into_owned(),
            files,
            sub_file_size: self.sub_file_size,
            mode,
        }))
    }

    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>> {
        let path = path::normalize(path)?;
        if self.is_concatenation_file(&path) {
            return Err(Error::PathNotFound);
        }
        let inner_mode = OpenDirectoryMode::ALL | (mode & OpenDirectoryMode::NO_FILE_SIZE);
        let inner = self.base.open_directory(&path, inner_mode)?;
        Ok(Box::new(ConcatenationDirectory {
            fs: Self {
                base: self.base.clone(),
                sub_file_size: self.sub_file_size,
            },
            path: path.into_owned(),
            inner,
            mode,
        }))
    }

    fn commit(&self) -> Result<()> {
        self.base.commit()
    }
}

/// An open concatenation file. Holds one handle per chunk.
pub struct ConcatenationFile {
    base: Arc<dyn AttributeFileSystem>,
    path: String,
    files: Vec<Box<dyn File>>,
    sub_file_size: u64,
    mode: OpenMode,
}

impl ConcatenationFile {
    /// Visit the chunk pieces of `[offset, offset + len)` as
    /// `(chunk index, offset in chunk, offset in request, piece length)`.
    fn pieces(&self, offset: u64, len: usize) -> impl Iterator<Item = (usize, u64, usize, usize)> {
        let sub = self.sub_file_size;
        let mut done = 0usize;
        std::iter::from_fn(move || {
            if done == len {
                return None;
            }
            let pos = offset + done as u64;
            let local = pos % sub;
            let piece = (sub - local).min((len - done) as u64) as usize;
            let item = ((pos / sub) as usize, local, done, piece);
            done += piece;
            Some(item)
        })
    }

    fn chunk(&mut self, index: usize) -> Result<&mut Box<dyn File>> {
        self.files.get_mut(index).ok_or(Error::InvalidSize)
    }
}

impl File for ConcatenationFile {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let n = validate_read(self.mode, offset, buf.len(), self.size()?)?;
        let pieces: Vec<_> = self.pieces(offset, n).collect();
        for (index, local, at, len) in pieces {
            let read = self.chunk(index)?.read(local, &mut buf[at..at + len])?;
            if read != len {
                return Err(Error::UnexpectedEof);
            }
        }
        Ok(n)
    }

    fn write(&mut self, offset: u64, buf: &[u8], option: WriteOption) -> Result<()> {
        if validate_write(self.mode, offset, buf.len(), self.size()?)? {
            self.set_size(offset + buf.len() as u64)?;
        }
        let pieces: Vec<_> = self.pieces(offset, buf.len()).collect();
        for (index, local, at, len) in pieces {
            self.chunk(index)?
                .write(local, &buf[at..at + len], WriteOption::empty())?;
        }
        if option.contains(WriteOption::FLUSH) {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.mode.contains(OpenMode::WRITE) {
            return Ok(());
        }
        for file in &mut self.files {
            file.flush()?;
        }
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        self.files
            .iter_mut()
            .try_fold(0u64, |total, file| Ok(total + file.size()?))
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        validate_set_size(self.mode)?;
        let sub = self.sub_file_size;
        let wanted = chunk_count(size, sub);

        while self.files.len() > wanted {
            let index = self.files.len() - 1;
            drop(self.files.pop());
            self.base.delete_file(&sub_file_path(&self.path, index))?;
            debug!(path = %self.path, index, "removed chunk");
        }
        for (i, file) in self.files.iter_mut().enumerate() {
            let target = chunk_size(size, sub, i);
            if file.size()? != target {
                file.set_size(target)?;
            }
        }
        while self.files.len() < wanted {
            let index = self.files.len();
            let chunk_path = sub_file_path(&self.path, index);
            self.base
                .create_file(&chunk_path, chunk_size(size, sub, index), CreateOptions::empty())?;
            self.files.push(self.base.open_file(&chunk_path, self.mode)?);
            debug!(path = %self.path, index, "added chunk");
        }
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}

/// Directory enumeration that reports concatenation files as files.
pub struct ConcatenationDirectory {
    fs: ConcatenationFileSystem,
    path: String,
    inner: Box<dyn Directory>,
    mode: OpenDirectoryMode,
}

impl ConcatenationDirectory {
    /// Map a base entry to what callers see, or `None` if `mode` filters it
    /// out.
    fn convert(&self, mut entry: DirectoryEntry) -> Result<Option<DirectoryEntry>> {
        if entry.entry_type == EntryType::Directory {
            let full = path::combine(&self.path, &entry.name);
            if self.fs.is_concatenation_file(&full) {
                entry.entry_type = EntryType::File;
                entry.size = if self.mode.contains(OpenDirectoryMode::NO_FILE_SIZE) {
                    0
                } else {
                    self.fs.concatenation_file_size(&full)?
                };
            }
        }
        let wanted = match entry.entry_type {
            EntryType::Directory => self.mode.contains(OpenDirectoryMode::DIRECTORY),
            EntryType::File => self.mode.contains(OpenDirectoryMode::FILE),
        };
        Ok(wanted.then_some(entry))
    }
}

impl Directory for ConcatenationDirectory {
    fn read(&mut self, entries: &mut [DirectoryEntry]) -> Result<usize> {
        let mut filled = 0;
        let mut one = [DirectoryEntry::default()];
        while filled < entries.len() {
            if self.inner.read(&mut one)? == 0 {
                break;
            }
            if let Some(entry) = self.convert(std::mem::take(&mut one[0]))? {
                entries[filled] = entry;
                filled += 1;
            }
        }
        Ok(filled)
    }

    fn entry_count(&mut self) -> Result<u64> {
        let mut fresh = self.fs.base.open_directory(&self.path, OpenDirectoryMode::ALL)?;
        let mut count = 0;
        for entry in super::read_all_entries(fresh.as_mut())? {
            if self.convert(entry)?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }
}
