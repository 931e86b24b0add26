//! NAX0 encrypted files over a base filesystem.
//!
//! Every file of an [`AesXtsFileSystem`] is a NAX0 container in the base:
//! a 0x4000-byte signed header followed by the AES-XTS payload. The header
//! keys are bound to the file's path inside the base, so renames re-wrap
//! them. Directories pass through unchanged.

use std::sync::Arc;

use tracing::debug;

use super::{
    CreateOptions, Directory, EntryListDirectory, EntryType, File, FileSystem,
    OpenDirectoryMode, OpenMode, WriteOption, read_all_entries, validate_read, validate_set_size,
    validate_write,
};
use crate::formats::nax0::{NAX0_HEADER_SIZE, NAX0_SECTOR_SIZE, Nax0Header};
use crate::path;
use crate::storage::{
    Aes128XtsStorage, CachedStorage, FileStorage, SharedStorage, Storage, StorageExt, SubStorage,
};
use crate::utils::align_up;
use crate::{Error, Result};

/// Sector-sized blocks kept by each open file.
const CACHE_BLOCKS: usize = 4;

/// An open NAX0 file. Reads and writes are byte-granular; sectors are
/// cached and written back on flush.
pub struct AesXtsFile {
    header: Nax0Header,
    verification_key: [u8; 16],
    /// The whole container, header included.
    base: SharedStorage,
    payload: CachedStorage,
    mode: OpenMode,
}

impl AesXtsFile {
    /// Wrap a base file whose header has already been opened and verified.
    pub fn new(
        file: Box<dyn File>,
        header: Nax0Header,
        verification_key: [u8; 16],
        mode: OpenMode,
    ) -> Result<Self> {
        let base: SharedStorage = Arc::new(FileStorage::new(file));
        let payload_size = base
            .size()?
            .checked_sub(NAX0_HEADER_SIZE)
            .ok_or(Error::Parse("NAX0 file is smaller than its header"))?;
        if payload_size < align_up(header.size, 0x10) {
            return Err(Error::Parse("NAX0 payload is shorter than the recorded size"));
        }
        let window = SubStorage::new(base.clone(), NAX0_HEADER_SIZE, payload_size)?.resizable();
        let xts = Aes128XtsStorage::new(
            Arc::new(window),
            &header.keys[0],
            &header.keys[1],
            NAX0_SECTOR_SIZE,
        )?;
        let payload = CachedStorage::new(Arc::new(xts), NAX0_SECTOR_SIZE, CACHE_BLOCKS)?;
        Ok(Self {
            header,
            verification_key,
            base,
            payload,
            mode,
        })
    }

    pub fn header(&self) -> &Nax0Header {
        &self.header
    }
}

impl File for AesXtsFile {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let n = validate_read(self.mode, offset, buf.len(), self.header.size)?;
        self.payload.read(offset, &mut buf[..n])?;
        Ok(n)
    }

    fn write(&mut self, offset: u64, buf: &[u8], option: WriteOption) -> Result<()> {
        if validate_write(self.mode, offset, buf.len(), self.header.size)? {
            self.set_size(offset + buf.len() as u64)?;
        }
        self.payload.write(offset, buf)?;
        if option.contains(WriteOption::FLUSH) {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.mode.contains(OpenMode::WRITE) {
            return Ok(());
        }
        self.payload.flush()
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.header.size)
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        validate_set_size(self.mode)?;
        self.header.size = size;
        self.header.sign(&self.verification_key)?;
        self.base.write(0, &self.header.encode())?;
        self.payload.set_size(align_up(size, 0x10))
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}

/// Encrypts every file of a base filesystem as NAX0.
pub struct AesXtsFileSystem {
    base: Arc<dyn FileSystem>,
    kek_seed: [u8; 16],
    verification_key: [u8; 16],
}

impl AesXtsFileSystem {
    pub fn new(base: Arc<dyn FileSystem>, kek_seed: [u8; 16], verification_key: [u8; 16]) -> Self {
        Self {
            base,
            kek_seed,
            verification_key,
        }
    }

    /// Create a file whose payload is encrypted with `key`.
    ///
    /// The payload is not initialized; its plaintext is unspecified until
    /// written.
    pub fn create_file_with_key(
        &self,
        path: &str,
        size: u64,
        options: CreateOptions,
        key: &[u8; 32],
    ) -> Result<()> {
        let path = path::normalize(path)?;
        let header = Nax0Header::create(key, size, &self.kek_seed, &self.verification_key, &path)?;
        self.base
            .create_file(&path, NAX0_HEADER_SIZE + align_up(size, 0x10), options)?;
        let mut file = self.base.open_file(&path, OpenMode::WRITE)?;
        file.write(0, &header.encode(), WriteOption::FLUSH)?;
        debug!(path = %path, size, "created NAX0 file");
        Ok(())
    }

    /// Header stored at `stored_at`, unwrapped with the keys of `bound_to`.
    fn read_header(&self, stored_at: &str, bound_to: &str) -> Result<Nax0Header> {
        let file = self.base.open_file(stored_at, OpenMode::READ)?;
        let raw = FileStorage::new(file).read_vec(0, 0x400)?;
        Nax0Header::open(&raw, &self.kek_seed, &self.verification_key, bound_to)
    }

    /// Re-wrap the keys of the file now at `new_path`, which were bound to
    /// `old_path`.
    fn rekey(&self, old_path: &str, new_path: &str) -> Result<()> {
        let mut header = self.read_header(new_path, old_path)?;
        header.encrypt_keys(&self.kek_seed, new_path)?;
        header.sign(&self.verification_key)?;
        let mut file = self.base.open_file(new_path, OpenMode::WRITE)?;
        file.write(0, &header.encode(), WriteOption::FLUSH)
    }

    fn rekey_tree(&self, old_dir: &str, new_dir: &str) -> Result<()> {
        let mut dir = self.base.open_directory(new_dir, OpenDirectoryMode::ALL)?;
        for entry in read_all_entries(dir.as_mut())? {
            let old_path = path::combine(old_dir, &entry.name);
            let new_path = path::combine(new_dir, &entry.name);
            match entry.entry_type {
                EntryType::File => self.rekey(&old_path, &new_path)?,
                EntryType::Directory => self.rekey_tree(&old_path, &new_path)?,
            }
        }
        Ok(())
    }
}

impl FileSystem for AesXtsFileSystem {
    /// Creates the file with an all-zero data key. Use
    /// [`AesXtsFileSystem::create_file_with_key`] to choose one.
    fn create_file(&self, path: &str, size: u64, options: CreateOptions) -> Result<()> {
        self.create_file_with_key(path, size, options, &[0u8; 32])
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        self.base.delete_file(path)
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        self.base.create_directory(path)
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        self.base.delete_directory(path)
    }

    fn delete_directory_recursively(&self, path: &str) -> Result<()> {
        self.base.delete_directory_recursively(path)
    }

    fn clean_directory_recursively(&self, path: &str) -> Result<()> {
        self.base.clean_directory_recursively(path)
    }

    fn rename_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = path::normalize(old_path)?;
        let new_path = path::normalize(new_path)?;
        self.read_header(&old_path, &old_path)?;
        self.base.rename_file(&old_path, &new_path)?;
        self.rekey(&old_path, &new_path)
    }

    fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = path::normalize(old_path)?;
        let new_path = path::normalize(new_path)?;
        self.base.rename_directory(&old_path, &new_path)?;
        self.rekey_tree(&old_path, &new_path)
    }

    fn entry_type(&self, path: &str) -> Result<EntryType> {
        self.base.entry_type(path)
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        let path = path::normalize(path)?;
        let header = self.read_header(&path, &path)?;
        let base_mode = if mode.contains(OpenMode::WRITE) {
            OpenMode::READ_WRITE
        } else {
            OpenMode::READ
        };
        let file = self.base.open_file(&path, base_mode)?;
        Ok(Box::new(AesXtsFile::new(file, header, self.verification_key, mode)?))
    }

    /// File sizes are the plaintext sizes recorded in each header.
    fn open_directory(&self, path: &str, mode: OpenDirectoryMode) -> Result<Box<dyn Directory>> {
        let path = path::normalize(path)?;
        let mut dir = self.base.open_directory(&path, mode)?;
        let mut entries = read_all_entries(dir.as_mut())?;
        if !mode.contains(OpenDirectoryMode::NO_FILE_SIZE) {
            for entry in entries.iter_mut().filter(|e| e.entry_type == EntryType::File) {
                entry.size = self.plaintext_size(&path::combine(&path, &entry.name));
            }
        }
        Ok(Box::new(EntryListDirectory::new(entries, mode)))
    }

    fn commit(&self) -> Result<()> {
        self.base.commit()
    }
}

impl AesXtsFileSystem {
    /// Recorded size of a NAX0 file, or zero when the header is unreadable.
    fn plaintext_size(&self, path: &str) -> u64 {
        let header = self.base.open_file(path, OpenMode::READ).and_then(|file| {
            let raw = FileStorage::new(file).read_vec(0, 0x50)?;
            Nax0Header::decode(&raw)
        });
        header.map_or(0, |h| h.size)
    }
}
