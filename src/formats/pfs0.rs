//! PFS0 (PartitionFS) - flat archive container, and the metadata model shared
//! with [`super::hfs0`].
//!
//! Used as the outer container for NSP files and embedded inside NCAs as the
//! ExeFS and Logo sections.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "PFS0"              (4 bytes)
//! [0x04] FileCount                 (u32 LE)
//! [0x08] StringTableSize           (u32 LE)
//! [0x0C] Reserved (always 0)       (4 bytes)
//! [0x10] EntryTable                (FileCount × 0x18 bytes)
//! [0x10 + FileCount×0x18]
//!        StringTable               (StringTableSize bytes)
//! [0x10 + FileCount×0x18 + StringTableSize]
//!        FileData                  (remaining bytes)
//! ```
//!
//! ## File Entry (0x18 bytes)
//! ```text
//! [0x00] Offset - relative to the data section start (u64 LE)
//! [0x08] Size   - in bytes (u64 LE)
//! [0x10] NameOffset - byte offset into the string table (u32 LE)
//! [0x14] Reserved   (u32)
//! ```
//!
//! ## Notes
//! * No directory support; no per-file hashing (contrast with HFS0).
//! * The builder pads the string table so file data starts on a 0x20
//!   boundary.

use std::sync::Arc;

use tracing::debug;

use crate::crypto::hash::sha256;
use crate::storage::{
    ConcatenationStorage, MemoryStorage, SharedStorage, Storage, StorageExt,
};
use crate::utils::{align_up, le_u32, le_u64, magic, null_string};
use crate::{Error, Result};

pub(crate) const PARTITION_HEADER_SIZE: usize = 0x10;

/// One entry-table record. Implemented by [`Pfs0Entry`] and
/// [`super::hfs0::Hfs0Entry`].
pub trait PartitionEntry: Clone + Send + Sync + 'static {
    const MAGIC: &'static [u8; 4];
    /// Serialized entry size.
    const SIZE: usize;
    /// Alignment of the data section produced by the builder.
    const METADATA_ALIGNMENT: u64;

    fn decode(buf: &[u8]) -> Result<Self>;

    fn encode(&self, buf: &mut [u8]);

    /// Build an entry. `head` holds the leading bytes of the file, up to
    /// [`HASH_TARGET_SIZE`](Self::HASH_TARGET_SIZE).
    fn new(offset: u64, size: u64, name_offset: u32, head: &[u8]) -> Self;

    /// How many leading bytes the builder passes to [`new`](Self::new).
    const HASH_TARGET_SIZE: u64 = 0;

    /// Offset relative to the data section.
    fn offset(&self) -> u64;

    fn size(&self) -> u64;

    fn name_offset(&self) -> u32;

    /// Size and SHA-256 of the hashed leading region, for hashed formats.
    fn hashed_region(&self) -> Option<(u64, [u8; 32])> {
        None
    }
}

/// PFS0 entry-table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pfs0Entry {
    pub offset: u64,
    pub size: u64,
    pub name_offset: u32,
}

impl PartitionEntry for Pfs0Entry {
    const MAGIC: &'static [u8; 4] = b"PFS0";
    const SIZE: usize = 0x18;
    const METADATA_ALIGNMENT: u64 = 0x20;

    fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            offset: le_u64(buf, 0)?,
            size: le_u64(buf, 8)?,
            name_offset: le_u32(buf, 0x10)?,
        })
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.name_offset.to_le_bytes());
        buf[20..24].fill(0);
    }

    fn new(offset: u64, size: u64, name_offset: u32, _head: &[u8]) -> Self {
        Self {
            offset,
            size,
            name_offset,
        }
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn name_offset(&self) -> u32 {
        self.name_offset
    }
}

/// A named entry of a parsed partition.
#[derive(Debug, Clone)]
pub struct PartitionFile<E> {
    pub name: String,
    pub entry: E,
}

/// Parsed partition metadata (header, entry table, string table).
#[derive(Debug, Clone)]
pub struct PartitionMetadata<E> {
    pub files: Vec<PartitionFile<E>>,
    /// Absolute offset of the data section.
    pub data_offset: u64,
}

impl<E: PartitionEntry> PartitionMetadata<E> {
    /// Parse the metadata at the start of `storage`. File contents are not
    /// read.
    pub fn read(storage: &dyn Storage) -> Result<Self> {
        let header = storage.read_vec(0, PARTITION_HEADER_SIZE)?;
        magic(&header, 0, E::MAGIC)?;
        let file_count = le_u32(&header, 4)? as usize;
        let string_table_size = le_u32(&header, 8)? as usize;

        let table_len = file_count
            .checked_mul(E::SIZE)
            .and_then(|n| n.checked_add(string_table_size))
            .ok_or(Error::InvalidRange)?;
        let metadata_end = (PARTITION_HEADER_SIZE as u64)
            .checked_add(table_len as u64)
            .ok_or(Error::InvalidRange)?;
        if metadata_end > storage.size()? {
            return Err(Error::InvalidRange);
        }
        let table = storage.read_vec(PARTITION_HEADER_SIZE as u64, table_len)?;
        let (entries, strings) = table.split_at(file_count * E::SIZE);

        let mut files = Vec::with_capacity(file_count);
        for raw in entries.chunks_exact(E::SIZE) {
            let entry = E::decode(raw)?;
            let name = null_string(strings, entry.name_offset() as usize)?;
            files.push(PartitionFile { name, entry });
        }
        let data_offset = (PARTITION_HEADER_SIZE + table_len) as u64;
        debug!(files = files.len(), data_offset, "parsed partition metadata");
        Ok(Self { files, data_offset })
    }

    /// Find a file by name.
    pub fn find(&self, name: &str) -> Option<&PartitionFile<E>> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// Assembles a PFS0 or HFS0 image from named storages.
///
/// The result is a [`ConcatenationStorage`] of the generated metadata
/// followed by the file storages, so file data is not copied.
#[derive(Default)]
pub struct PartitionFsBuilder {
    files: Vec<(String, SharedStorage)>,
}

impl PartitionFsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>, storage: SharedStorage) -> &mut Self {
        self.files.push((name.into(), storage));
        self
    }

    /// Build an image with entry format `E`.
    pub fn build<E: PartitionEntry>(&self) -> Result<ConcatenationStorage> {
        let mut names = Vec::new();
        let mut entries = Vec::with_capacity(self.files.len());
        let mut offset = 0u64;
        for (name, storage) in &self.files {
            if name.is_empty() || name.contains(['/', '\0']) {
                return Err(Error::InvalidArgument("partition file names must be plain names"));
            }
            let size = storage.size()?;
            let head = if E::HASH_TARGET_SIZE > 0 {
                storage.read_vec(0, size.min(E::HASH_TARGET_SIZE) as usize)?
            } else {
                Vec::new()
            };
            let name_offset = u32::try_from(names.len()).map_err(|_| Error::InvalidSize)?;
            entries.push(E::new(offset, size, name_offset, &head));
            names.extend_from_slice(name.as_bytes());
            names.push(0);
            offset = offset.checked_add(size).ok_or(Error::InvalidSize)?;
        }

        let table_end = (PARTITION_HEADER_SIZE + entries.len() * E::SIZE) as u64;
        let data_offset = align_up(table_end + names.len() as u64, E::METADATA_ALIGNMENT);
        let string_table_size = (data_offset - table_end) as usize;

        let mut meta = vec![0u8; data_offset as usize];
        meta[..4].copy_from_slice(E::MAGIC);
        meta[4..8].copy_from_slice(&(entries.len() as u32).to_le_bytes());
        meta[8..12].copy_from_slice(&(string_table_size as u32).to_le_bytes());
        for (i, entry) in entries.iter().enumerate() {
            let at = PARTITION_HEADER_SIZE + i * E::SIZE;
            entry.encode(&mut meta[at..at + E::SIZE]);
        }
        let strings_at = table_end as usize;
        meta[strings_at..strings_at + names.len()].copy_from_slice(&names);
        debug!(files = entries.len(), data_offset, "built partition image");

        let mut parts: Vec<SharedStorage> = vec![Arc::new(MemoryStorage::new(meta))];
        parts.extend(self.files.iter().map(|(_, s)| s.clone()));
        ConcatenationStorage::new(parts)
    }
}

/// SHA-256 helper for hashed entry formats.
pub(crate) fn hash_head(head: &[u8]) -> [u8; 32] {
    sha256(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConcatenationStorage {
        let mut builder = PartitionFsBuilder::new();
        builder
            .add_file("main", Arc::new(MemoryStorage::new(b"MAIN-DATA".to_vec())))
            .add_file("main.npdm", Arc::new(MemoryStorage::new(b"META".to_vec())));
        builder.build::<Pfs0Entry>().unwrap()
    }

    #[test]
    fn built_image_parses() {
        let image = sample();
        let meta = PartitionMetadata::<Pfs0Entry>::read(&image).unwrap();
        assert_eq!(meta.files.len(), 2);
        assert_eq!(meta.data_offset % 0x20, 0);
        let npdm = meta.find("main.npdm").unwrap();
        assert_eq!(npdm.entry.offset, 9);
        assert_eq!(npdm.entry.size, 4);
        let data = image.read_vec(meta.data_offset + npdm.entry.offset, 4).unwrap();
        assert_eq!(&data, b"META");
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = sample().read_all().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            PartitionMetadata::<Pfs0Entry>::read(&MemoryStorage::new(bytes)),
            Err(Error::BadMagic)
        ));
    }

    #[test]
    fn oversized_tables_are_rejected_before_reading() {
        let mut header = b"PFS0".to_vec();
        header.extend_from_slice(&u32::MAX.to_le_bytes());
        header.extend_from_slice(&u32::MAX.to_le_bytes());
        header.extend_from_slice(&[0; 4]);
        assert!(matches!(
            PartitionMetadata::<Pfs0Entry>::read(&MemoryStorage::new(header)),
            Err(Error::InvalidRange)
        ));
    }

    #[test]
    fn truncated_metadata_is_rejected() {
        let bytes = sample().read_all().unwrap();
        let cut = MemoryStorage::new(bytes[..PARTITION_HEADER_SIZE + 8].to_vec());
        assert!(matches!(
            PartitionMetadata::<Pfs0Entry>::read(&cut),
            Err(Error::InvalidRange)
        ));
    }

    #[test]
    fn empty_partition() {
        let image = PartitionFsBuilder::new().build::<Pfs0Entry>().unwrap();
        let meta = PartitionMetadata::<Pfs0Entry>::read(&image).unwrap();
        assert!(meta.files.is_empty());
        assert_eq!(meta.data_offset, 0x20);
    }

    #[test]
    fn names_with_separators_are_rejected() {
        let mut builder = PartitionFsBuilder::new();
        builder.add_file("a/b", Arc::new(MemoryStorage::with_size(1)));
        assert!(builder.build::<Pfs0Entry>().is_err());
    }
}
