//! Copying storages, files and directory trees between filesystems.

use tracing::debug;

use super::{
    CreateOptions, EntryType, FileSystem, OpenDirectoryMode, OpenMode, WriteOption,
    read_all_entries,
};
use crate::path;
use crate::storage::Storage;
use crate::{Error, Result};

/// Bytes moved per read/write round.
pub const COPY_BUFFER_SIZE: usize = 0x10000;

/// Receives progress from long-running copies.
///
/// `()` ignores everything.
pub trait ProgressReport {
    /// Total number of bytes the operation will copy.
    fn set_total(&mut self, _total: u64) {}

    /// `bytes` more have been copied.
    fn report_add(&mut self, bytes: u64);

    fn log_message(&mut self, _message: &str) {}
}

impl ProgressReport for () {
    fn report_add(&mut self, _bytes: u64) {}
}

/// Copy all of `src` to the start of `dst`, which must be at least as large.
pub fn copy_storage(
    src: &dyn Storage,
    dst: &dyn Storage,
    progress: &mut dyn ProgressReport,
) -> Result<()> {
    let size = src.size()?;
    if dst.size()? < size {
        return Err(Error::InvalidSize);
    }
    progress.set_total(size);
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut offset = 0;
    while offset < size {
        let n = (size - offset).min(buf.len() as u64) as usize;
        src.read(offset, &mut buf[..n])?;
        dst.write(offset, &buf[..n])?;
        offset += n as u64;
        progress.report_add(n as u64);
    }
    dst.flush()
}

/// Copy one file, creating `dst_path` with `options`.
pub fn copy_file(
    src_fs: &dyn FileSystem,
    src_path: &str,
    dst_fs: &dyn FileSystem,
    dst_path: &str,
    options: CreateOptions,
    progress: &mut dyn ProgressReport,
) -> Result<()> {
    let mut src = src_fs.open_file(src_path, OpenMode::READ)?;
    let size = src.size()?;
    dst_fs.create_file(dst_path, size, options)?;
    let mut dst = dst_fs.open_file(dst_path, OpenMode::WRITE)?;

    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut offset = 0;
    while offset < size {
        let n = src.read(offset, &mut buf)?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        dst.write(offset, &buf[..n], WriteOption::empty())?;
        offset += n as u64;
        progress.report_add(n as u64);
    }
    dst.flush()?;
    debug!(src = src_path, dst = dst_path, size, "copied file");
    Ok(())
}

/// Copy the contents of `src_path` into the existing directory `dst_path`,
/// recreating subdirectories and creating files with `options`.
pub fn copy_directory(
    src_fs: &dyn FileSystem,
    src_path: &str,
    dst_fs: &dyn FileSystem,
    dst_path: &str,
    options: CreateOptions,
    progress: &mut dyn ProgressReport,
) -> Result<()> {
    let src_path = path::normalize(src_path)?;
    let dst_path = path::normalize(dst_path)?;
    progress.set_total(total_size(src_fs, &src_path)?);
    copy_tree(src_fs, &src_path, dst_fs, &dst_path, options, progress)
}

/// Sum of the file sizes below `dir`.
pub fn total_size(fs: &dyn FileSystem, dir: &str) -> Result<u64> {
    let mut total = 0;
    let mut handle = fs.open_directory(dir, OpenDirectoryMode::ALL)?;
    for entry in read_all_entries(handle.as_mut())? {
        total += match entry.entry_type {
            EntryType::File => entry.size,
            EntryType::Directory => total_size(fs, &path::combine(dir, &entry.name))?,
        };
    }
    Ok(total)
}

fn copy_tree(
    src_fs: &dyn FileSystem,
    src_dir: &str,
    dst_fs: &dyn FileSystem,
    dst_dir: &str,
    options: CreateOptions,
    progress: &mut dyn ProgressReport,
) -> Result<()> {
    let mut handle = src_fs.open_directory(src_dir, OpenDirectoryMode::ALL)?;
    let entries = read_all_entries(handle.as_mut())?;
    drop(handle);
    for entry in entries {
        let src = path::combine(src_dir, &entry.name);
        let dst = path::combine(dst_dir, &entry.name);
        match entry.entry_type {
            EntryType::Directory => {
                dst_fs.create_directory(&dst)?;
                copy_tree(src_fs, &src, dst_fs, &dst, options, progress)?;
            }
            EntryType::File => {
                progress.log_message(&src);
                copy_file(src_fs, &src, dst_fs, &dst, options, progress)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fs::{ConcatenationFileSystem, FileSystemExt, InMemoryFileSystem};
    use crate::storage::MemoryStorage;
    use crate::storage::testing::pattern;

    #[derive(Default)]
    struct Counter {
        total: u64,
        done: u64,
        messages: Vec<String>,
    }

    impl ProgressReport for Counter {
        fn set_total(&mut self, total: u64) {
            self.total = total;
        }

        fn report_add(&mut self, bytes: u64) {
            self.done += bytes;
        }

        fn log_message(&mut self, message: &str) {
            self.messages.push(message.to_owned());
        }
    }

    fn put(fs: &dyn FileSystem, path: &str, data: &[u8]) {
        fs.create_file(path, data.len() as u64, CreateOptions::empty())
            .unwrap();
        fs.open_file(path, OpenMode::WRITE)
            .unwrap()
            .write(0, data, WriteOption::FLUSH)
            .unwrap();
    }

    #[test]
    fn storage_copy_spans_several_buffers() {
        let data = pattern(COPY_BUFFER_SIZE * 2 + 17);
        let src = MemoryStorage::new(data.clone());
        let dst = MemoryStorage::with_size(data.len() + 3);
        let mut counter = Counter::default();
        copy_storage(&src, &dst, &mut counter).unwrap();
        assert_eq!(&dst.to_vec()[..data.len()], &data[..]);
        assert_eq!((counter.total, counter.done), (data.len() as u64, data.len() as u64));

        let small = MemoryStorage::with_size(4);
        assert!(matches!(copy_storage(&src, &small, &mut ()), Err(Error::InvalidSize)));
    }

    #[test]
    fn directory_tree_is_recreated() {
        let src = InMemoryFileSystem::new();
        src.create_directory("/a").unwrap();
        src.create_directory("/a/b").unwrap();
        put(&src, "/a/one", b"first");
        put(&src, "/a/b/two", &pattern(0x12345));
        put(&src, "/top", b"");

        let dst = InMemoryFileSystem::new();
        let mut counter = Counter::default();
        copy_directory(&src, "/", &dst, "/", CreateOptions::empty(), &mut counter).unwrap();

        assert_eq!(dst.read_file("/a/one").unwrap(), b"first".to_vec());
        assert_eq!(dst.read_file("/a/b/two").unwrap(), pattern(0x12345));
        assert_eq!(dst.read_file("/top").unwrap(), Vec::<u8>::new());
        assert_eq!(counter.total, 5 + 0x12345);
        assert_eq!(counter.done, counter.total);
        assert_eq!(counter.messages.len(), 3);
    }

    #[test]
    fn copies_into_concatenation_files() {
        let src = InMemoryFileSystem::new();
        put(&src, "/big", &pattern(100));
        let base = Arc::new(InMemoryFileSystem::new());
        let dst = ConcatenationFileSystem::with_sub_file_size(base.clone(), 32).unwrap();
        copy_file(&src, "/big", &dst, "/big", CreateOptions::CONCATENATION_FILE, &mut ()).unwrap();

        assert_eq!(dst.read_file("/big").unwrap(), pattern(100));
        assert_eq!(base.read_dir("/big", OpenDirectoryMode::FILE).unwrap().len(), 4);
        assert!(matches!(
            copy_file(&src, "/big", &dst, "/big", CreateOptions::empty(), &mut ()),
            Err(Error::PathAlreadyExists)
        ));
    }
}
