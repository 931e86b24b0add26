//! RomFS - read-only hierarchical filesystem image.
//!
//! Used as the data section of NCAs. Directories and files are stored in two
//! metadata tables, each indexed by a hash table keyed on
//! `(parent offset, name)`. Offsets into the metadata tables double as entry
//! identifiers; the root directory is always at offset 0.
//!
//! ## Header (0x50 bytes, all u64 LE)
//! ```text
//! [0x00] HeaderSize (0x50)
//! [0x08] DirHashTableOffset   [0x10] DirHashTableSize
//! [0x18] DirMetaTableOffset   [0x20] DirMetaTableSize
//! [0x28] FileHashTableOffset  [0x30] FileHashTableSize
//! [0x38] FileMetaTableOffset  [0x40] FileMetaTableSize
//! [0x48] DataOffset
//! ```
//!
//! ## Directory entry (0x18 bytes + name)
//! ```text
//! [0x00] Parent      [0x04] Sibling     [0x08] FirstChildDir
//! [0x0C] FirstFile   [0x10] NextInHashBucket
//! [0x14] NameLength  [0x18] Name (padded to 4 bytes, not terminated)
//! ```
//!
//! ## File entry (0x20 bytes + name)
//! ```text
//! [0x00] Parent      [0x04] Sibling
//! [0x08] DataOffset (u64, relative to DataOffset in the header)
//! [0x10] DataSize (u64)
//! [0x18] NextInHashBucket
//! [0x1C] NameLength  [0x20] Name (padded to 4 bytes)
//! ```
//!
//! Absent links are `0xFFFFFFFF`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::path::{self, PathParser};
use crate::storage::{
    ConcatenationStorage, MemoryStorage, NullStorage, SharedStorage, Storage, StorageExt,
};
use crate::utils::{align_up, le_u32, le_u64};
use crate::{Error, Result};

pub const ROMFS_HEADER_SIZE: usize = 0x50;

/// Marker for an absent link or empty hash bucket.
pub const ROMFS_EMPTY: u32 = 0xFFFF_FFFF;

/// Offset of the file data section in images written by [`RomFsBuilder`].
pub const ROMFS_DATA_OFFSET: u64 = 0x200;

const DIRECTORY_ENTRY_SIZE: usize = 0x18;
const FILE_ENTRY_SIZE: usize = 0x20;
const FILE_ALIGNMENT: u64 = 0x10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RomFsHeader {
    pub header_size: u64,
    pub dir_hash_offset: u64,
    pub dir_hash_size: u64,
    pub dir_meta_offset: u64,
    pub dir_meta_size: u64,
    pub file_hash_offset: u64,
    pub file_hash_size: u64,
    pub file_meta_offset: u64,
    pub file_meta_size: u64,
    pub data_offset: u64,
}

impl RomFsHeader {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let header = Self {
            header_size: le_u64(buf, 0)?,
            dir_hash_offset: le_u64(buf, 0x08)?,
            dir_hash_size: le_u64(buf, 0x10)?,
            dir_meta_offset: le_u64(buf, 0x18)?,
            dir_meta_size: le_u64(buf, 0x20)?,
            file_hash_offset: le_u64(buf, 0x28)?,
            file_hash_size: le_u64(buf, 0x30)?,
            file_meta_offset: le_u64(buf, 0x38)?,
            file_meta_size: le_u64(buf, 0x40)?,
            data_offset: le_u64(buf, 0x48)?,
        };
        if header.header_size != ROMFS_HEADER_SIZE as u64 {
            return Err(Error::Parse("unexpected RomFS header size"));
        }
        Ok(header)
    }

    pub fn encode(&self) -> [u8; ROMFS_HEADER_SIZE] {
        let fields = [
            self.header_size,
            self.dir_hash_offset,
            self.dir_hash_size,
            self.dir_meta_offset,
            self.dir_meta_size,
            self.file_hash_offset,
            self.file_hash_size,
            self.file_meta_offset,
            self.file_meta_size,
            self.data_offset,
        ];
        let mut out = [0u8; ROMFS_HEADER_SIZE];
        for (chunk, value) in out.chunks_exact_mut(8).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomFsDirectoryEntry {
    pub parent: u32,
    pub sibling: u32,
    pub child_dir: u32,
    pub child_file: u32,
    pub next_hash: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomFsFileEntry {
    pub parent: u32,
    pub sibling: u32,
    /// Relative to the header's data offset.
    pub data_offset: u64,
    pub data_size: u64,
    pub next_hash: u32,
    pub name: String,
}

/// Hash of a `(parent, name)` key.
pub fn hash_name(parent: u32, name: &[u8]) -> u32 {
    name.iter()
        .fold(parent ^ 123_456_789, |h, &b| h.rotate_right(5) ^ u32::from(b))
}

/// Number of hash buckets for a table of `entries` entries.
pub fn bucket_count(entries: usize) -> usize {
    if entries < 3 {
        return 3;
    }
    if entries < 19 {
        return entries | 1;
    }
    let mut count = entries;
    while [2, 3, 5, 7, 11, 13, 17].iter().any(|p| count % p == 0) {
        count += 1;
    }
    count
}

fn entry_name(meta: &[u8], at: usize, len: u32) -> Result<String> {
    let end = at.checked_add(len as usize).ok_or(Error::InvalidRange)?;
    let bytes = meta.get(at..end).ok_or(Error::UnexpectedEof)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::Parse("RomFS entry name is not UTF-8"))
}

/// An entry resolved by [`RomFsTables::lookup`]: the metadata offset of a
/// directory or file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomFsEntry {
    Directory(u32),
    File(u32),
}

/// The metadata of a RomFS image, loaded into memory.
#[derive(Debug, Clone)]
pub struct RomFsTables {
    pub header: RomFsHeader,
    dir_buckets: Vec<u32>,
    dir_meta: Vec<u8>,
    file_buckets: Vec<u32>,
    file_meta: Vec<u8>,
}

impl RomFsTables {
    /// Read the header and the four tables. File data is not touched.
    pub fn read(storage: &dyn Storage) -> Result<Self> {
        let header = RomFsHeader::decode(&storage.read_vec(0, ROMFS_HEADER_SIZE)?)?;
        let storage_size = storage.size()?;
        let table = |offset: u64, size: u64| -> Result<Vec<u8>> {
            match offset.checked_add(size) {
                Some(end) if end <= storage_size => {}
                _ => return Err(Error::InvalidRange),
            }
            let len = usize::try_from(size).map_err(|_| Error::InvalidRange)?;
            storage.read_vec(offset, len)
        };
        let buckets = |raw: Vec<u8>| -> Vec<u32> {
            raw.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        };
        let dir_buckets = buckets(table(header.dir_hash_offset, header.dir_hash_size)?);
        let file_buckets = buckets(table(header.file_hash_offset, header.file_hash_size)?);
        if dir_buckets.is_empty() || file_buckets.is_empty() {
            return Err(Error::Parse("RomFS hash table is empty"));
        }
        let tables = Self {
            header,
            dir_buckets,
            dir_meta: table(header.dir_meta_offset, header.dir_meta_size)?,
            file_buckets,
            file_meta: table(header.file_meta_offset, header.file_meta_size)?,
        };
        debug!(
            dir_meta = tables.dir_meta.len(),
            file_meta = tables.file_meta.len(),
            "loaded RomFS tables"
        );
        Ok(tables)
    }

    pub fn directory(&self, offset: u32) -> Result<RomFsDirectoryEntry> {
        let at = offset as usize;
        let meta = &self.dir_meta;
        Ok(RomFsDirectoryEntry {
            parent: le_u32(meta, at)?,
            sibling: le_u32(meta, at + 4)?,
            child_dir: le_u32(meta, at + 8)?,
            child_file: le_u32(meta, at + 0xC)?,
            next_hash: le_u32(meta, at + 0x10)?,
            name: entry_name(meta, at + DIRECTORY_ENTRY_SIZE, le_u32(meta, at + 0x14)?)?,
        })
    }

    pub fn file(&self, offset: u32) -> Result<RomFsFileEntry> {
        let at = offset as usize;
        let meta = &self.file_meta;
        Ok(RomFsFileEntry {
            parent: le_u32(meta, at)?,
            sibling: le_u32(meta, at + 4)?,
            data_offset: le_u64(meta, at + 8)?,
            data_size: le_u64(meta, at + 0x10)?,
            next_hash: le_u32(meta, at + 0x18)?,
            name: entry_name(meta, at + FILE_ENTRY_SIZE, le_u32(meta, at + 0x1C)?)?,
        })
    }

    /// Walk the directory hash chain for `(parent, name)`.
    pub fn find_directory(&self, parent: u32, name: &str) -> Result<Option<u32>> {
        let bucket = hash_name(parent, name.as_bytes()) as usize % self.dir_buckets.len();
        let mut offset = self.dir_buckets[bucket];
        // Every step visits a distinct entry of at least the fixed size.
        let max_steps = self.dir_meta.len() / DIRECTORY_ENTRY_SIZE + 1;
        for _ in 0..max_steps {
            if offset == ROMFS_EMPTY {
                return Ok(None);
            }
            let entry = self.directory(offset)?;
            if entry.parent == parent && entry.name == name {
                return Ok(Some(offset));
            }
            offset = entry.next_hash;
        }
        Err(Error::Parse("RomFS directory hash chain loops"))
    }

    /// Walk the file hash chain for `(parent, name)`.
    pub fn find_file(&self, parent: u32, name: &str) -> Result<Option<u32>> {
        let bucket = hash_name(parent, name.as_bytes()) as usize % self.file_buckets.len();
        let mut offset = self.file_buckets[bucket];
        let max_steps = self.file_meta.len() / FILE_ENTRY_SIZE + 1;
        for _ in 0..max_steps {
            if offset == ROMFS_EMPTY {
                return Ok(None);
            }
            let entry = self.file(offset)?;
            if entry.parent == parent && entry.name == name {
                return Ok(Some(offset));
            }
            offset = entry.next_hash;
        }
        Err(Error::Parse("RomFS file hash chain loops"))
    }

    /// Resolve a path. Fails with [`Error::PathNotFound`] when any segment
    /// is missing.
    pub fn lookup(&self, path: &str) -> Result<RomFsEntry> {
        let path = path::normalize(path)?;
        let mut segments = PathParser::new(&path).peekable();
        let mut current = 0u32;
        while let Some(segment) = segments.next() {
            if let Some(dir) = self.find_directory(current, segment)? {
                current = dir;
                continue;
            }
            if segments.peek().is_none() {
                if let Some(file) = self.find_file(current, segment)? {
                    return Ok(RomFsEntry::File(file));
                }
            }
            return Err(Error::PathNotFound);
        }
        Ok(RomFsEntry::Directory(current))
    }

    /// Child directories of `dir`, in table order.
    pub fn child_directories(&self, dir: u32) -> Result<Vec<RomFsDirectoryEntry>> {
        let mut out = Vec::new();
        let mut offset = self.directory(dir)?.child_dir;
        while offset != ROMFS_EMPTY {
            if out.len() > self.dir_meta.len() / DIRECTORY_ENTRY_SIZE {
                return Err(Error::Parse("RomFS sibling chain loops"));
            }
            let entry = self.directory(offset)?;
            offset = entry.sibling;
            out.push(entry);
        }
        Ok(out)
    }

    /// Files directly inside `dir`, in table order.
    pub fn child_files(&self, dir: u32) -> Result<Vec<RomFsFileEntry>> {
        let mut out = Vec::new();
        let mut offset = self.directory(dir)?.child_file;
        while offset != ROMFS_EMPTY {
            if out.len() > self.file_meta.len() / FILE_ENTRY_SIZE {
                return Err(Error::Parse("RomFS sibling chain loops"));
            }
            let entry = self.file(offset)?;
            offset = entry.sibling;
            out.push(entry);
        }
        Ok(out)
    }
}

struct BuilderDirectory {
    name: String,
    parent: usize,
    dirs: Vec<usize>,
    files: Vec<usize>,
}

struct BuilderFile {
    name: String,
    parent: usize,
    storage: SharedStorage,
}

/// Assembles a RomFS image from storages added under absolute paths.
///
/// Parent directories are created implicitly. The output is a
/// [`ConcatenationStorage`] of the generated header, the file storages
/// (aligned to 0x10 with zero padding) and the metadata tables.
pub struct RomFsBuilder {
    dirs: Vec<BuilderDirectory>,
    files: Vec<BuilderFile>,
    dir_paths: BTreeMap<String, usize>,
    file_paths: BTreeMap<String, usize>,
}

impl Default for RomFsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RomFsBuilder {
    pub fn new() -> Self {
        let root = BuilderDirectory {
            name: String::new(),
            parent: 0,
            dirs: Vec::new(),
            files: Vec::new(),
        };
        Self {
            dirs: vec![root],
            files: Vec::new(),
            dir_paths: BTreeMap::from([("/".to_string(), 0)]),
            file_paths: BTreeMap::new(),
        }
    }

    fn ensure_directory(&mut self, path: &str) -> Result<usize> {
        if let Some(&index) = self.dir_paths.get(path) {
            return Ok(index);
        }
        if self.file_paths.contains_key(path) {
            return Err(Error::PathAlreadyExists);
        }
        let parent_path = path::parent(path).ok_or(Error::InvalidPath("root has no parent"))?;
        let parent = self.ensure_directory(parent_path)?;
        let index = self.dirs.len();
        self.dirs.push(BuilderDirectory {
            name: path::file_name(path).to_string(),
            parent,
            dirs: Vec::new(),
            files: Vec::new(),
        });
        self.dirs[parent].dirs.push(index);
        self.dir_paths.insert(path.to_string(), index);
        Ok(index)
    }

    /// Add a file at `path`, creating missing parent directories.
    pub fn add_file(&mut self, path: &str, storage: SharedStorage) -> Result<&mut Self> {
        let path = path::normalize(path)?.into_owned();
        if path == "/" {
            return Err(Error::InvalidPath("a file cannot be the root"));
        }
        if self.file_paths.contains_key(&path) || self.dir_paths.contains_key(&path) {
            return Err(Error::PathAlreadyExists);
        }
        let parent_path = path::parent(&path).ok_or(Error::InvalidPath("root has no parent"))?;
        let parent = self.ensure_directory(parent_path)?;
        let index = self.files.len();
        self.files.push(BuilderFile {
            name: path::file_name(&path).to_string(),
            parent,
            storage,
        });
        self.dirs[parent].files.push(index);
        self.file_paths.insert(path, index);
        Ok(self)
    }

    /// Produce the image.
    pub fn build(&mut self) -> Result<ConcatenationStorage> {
        for i in 0..self.dirs.len() {
            let mut dirs = std::mem::take(&mut self.dirs[i].dirs);
            dirs.sort_by(|&a, &b| self.dirs[a].name.cmp(&self.dirs[b].name));
            self.dirs[i].dirs = dirs;
            let mut files = std::mem::take(&mut self.dirs[i].files);
            files.sort_by(|&a, &b| self.files[a].name.cmp(&self.files[b].name));
            self.dirs[i].files = files;
        }

        // Breadth-first directory order; files grouped by directory.
        let mut dir_order = vec![0usize];
        let mut next = 0;
        while next < dir_order.len() {
            dir_order.extend(self.dirs[dir_order[next]].dirs.iter().copied());
            next += 1;
        }
        let file_order: Vec<usize> = dir_order
            .iter()
            .flat_map(|&d| self.dirs[d].files.iter().copied())
            .collect();

        let mut dir_offsets = vec![0u32; self.dirs.len()];
        let mut cursor = 0usize;
        for &d in &dir_order {
            dir_offsets[d] = u32::try_from(cursor).map_err(|_| Error::InvalidSize)?;
            cursor += DIRECTORY_ENTRY_SIZE + align_up(self.dirs[d].name.len() as u64, 4) as usize;
        }
        let dir_meta_size = cursor;
        let mut file_offsets = vec![0u32; self.files.len()];
        cursor = 0;
        for &f in &file_order {
            file_offsets[f] = u32::try_from(cursor).map_err(|_| Error::InvalidSize)?;
            cursor += FILE_ENTRY_SIZE + align_up(self.files[f].name.len() as u64, 4) as usize;
        }
        let file_meta_size = cursor;

        let mut data_parts: Vec<SharedStorage> = Vec::with_capacity(file_order.len() * 2 + 1);
        let mut data_offsets = vec![0u64; self.files.len()];
        let mut data_sizes = vec![0u64; self.files.len()];
        let mut data_end = 0u64;
        for &f in &file_order {
            let aligned = align_up(data_end, FILE_ALIGNMENT);
            if aligned > data_end {
                data_parts.push(Arc::new(NullStorage::with_size(aligned - data_end)));
            }
            let size = self.files[f].storage.size()?;
            data_offsets[f] = aligned;
            data_sizes[f] = size;
            data_parts.push(self.files[f].storage.clone());
            data_end = aligned.checked_add(size).ok_or(Error::InvalidSize)?;
        }
        let tables_offset = align_up(ROMFS_DATA_OFFSET + data_end, 4);
        let padding = tables_offset - (ROMFS_DATA_OFFSET + data_end);
        if padding > 0 {
            data_parts.push(Arc::new(NullStorage::with_size(padding)));
        }

        let link =
            |index: Option<&usize>, offsets: &[u32]| index.map_or(ROMFS_EMPTY, |&i| offsets[i]);

        let dir_bucket_count = bucket_count(self.dirs.len());
        let mut dir_buckets = vec![ROMFS_EMPTY; dir_bucket_count];
        let mut dir_meta = vec![0u8; dir_meta_size];
        for &d in &dir_order {
            let dir = &self.dirs[d];
            let offset = dir_offsets[d];
            let parent_offset = dir_offsets[dir.parent];
            let siblings = &self.dirs[dir.parent].dirs;
            let sibling = if d == 0 {
                ROMFS_EMPTY
            } else {
                let pos = siblings.iter().position(|&s| s == d).unwrap_or(siblings.len());
                link(siblings.get(pos + 1), &dir_offsets)
            };
            let bucket = hash_name(parent_offset, dir.name.as_bytes()) as usize % dir_bucket_count;
            let fields = [
                parent_offset,
                sibling,
                link(dir.dirs.first(), &dir_offsets),
                link(dir.files.first(), &file_offsets),
                dir_buckets[bucket],
                dir.name.len() as u32,
            ];
            dir_buckets[bucket] = offset;
            let at = offset as usize;
            for (i, value) in fields.iter().enumerate() {
                dir_meta[at + i * 4..at + i * 4 + 4].copy_from_slice(&value.to_le_bytes());
            }
            let name_at = at + DIRECTORY_ENTRY_SIZE;
            dir_meta[name_at..name_at + dir.name.len()].copy_from_slice(dir.name.as_bytes());
        }

        let file_bucket_count = bucket_count(self.files.len());
        let mut file_buckets = vec![ROMFS_EMPTY; file_bucket_count];
        let mut file_meta = vec![0u8; file_meta_size];
        for &f in &file_order {
            let file = &self.files[f];
            let offset = file_offsets[f];
            let parent_offset = dir_offsets[file.parent];
            let siblings = &self.dirs[file.parent].files;
            let pos = siblings.iter().position(|&s| s == f).unwrap_or(siblings.len());
            let bucket = hash_name(parent_offset, file.name.as_bytes()) as usize % file_bucket_count;
            let at = offset as usize;
            file_meta[at..at + 4].copy_from_slice(&parent_offset.to_le_bytes());
            let sibling = link(siblings.get(pos + 1), &file_offsets);
            file_meta[at + 4..at + 8].copy_from_slice(&sibling.to_le_bytes());
            file_meta[at + 8..at + 0x10].copy_from_slice(&data_offsets[f].to_le_bytes());
            file_meta[at + 0x10..at + 0x18].copy_from_slice(&data_sizes[f].to_le_bytes());
            file_meta[at + 0x18..at + 0x1C].copy_from_slice(&file_buckets[bucket].to_le_bytes());
            let name_len = file.name.len() as u32;
            file_meta[at + 0x1C..at + 0x20].copy_from_slice(&name_len.to_le_bytes());
            file_buckets[bucket] = offset;
            let name_at = at + FILE_ENTRY_SIZE;
            file_meta[name_at..name_at + file.name.len()].copy_from_slice(file.name.as_bytes());
        }

        let header = RomFsHeader {
            header_size: ROMFS_HEADER_SIZE as u64,
            dir_hash_offset: tables_offset,
            dir_hash_size: dir_bucket_count as u64 * 4,
            dir_meta_offset: tables_offset + dir_bucket_count as u64 * 4,
            dir_meta_size: dir_meta_size as u64,
            file_hash_offset: tables_offset + dir_bucket_count as u64 * 4 + dir_meta_size as u64,
            file_hash_size: file_bucket_count as u64 * 4,
            file_meta_offset: tables_offset
                + (dir_bucket_count + file_bucket_count) as u64 * 4
                + dir_meta_size as u64,
            file_meta_size: file_meta_size as u64,
            data_offset: ROMFS_DATA_OFFSET,
        };
        let mut header_block = vec![0u8; ROMFS_DATA_OFFSET as usize];
        header_block[..ROMFS_HEADER_SIZE].copy_from_slice(&header.encode());

        let tables_len = header.file_meta_offset + header.file_meta_size - tables_offset;
        let mut tables = Vec::with_capacity(tables_len as usize);
        tables.extend(dir_buckets.iter().flat_map(|b| b.to_le_bytes()));
        tables.extend_from_slice(&dir_meta);
        tables.extend(file_buckets.iter().flat_map(|b| b.to_le_bytes()));
        tables.extend_from_slice(&file_meta);

        let mut parts: Vec<SharedStorage> = vec![Arc::new(MemoryStorage::new(header_block))];
        parts.extend(data_parts);
        parts.push(Arc::new(MemoryStorage::new(tables)));

        debug!(
            directories = self.dirs.len(),
            files = self.files.len(),
            data_size = data_end,
            "built RomFS image"
        );
        ConcatenationStorage::new(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConcatenationStorage {
        let mut builder = RomFsBuilder::new();
        builder
            .add_file("/a/b/c.txt", Arc::new(MemoryStorage::new(b"hello".to_vec())))
            .unwrap()
            .add_file("/a/d.bin", Arc::new(MemoryStorage::new(vec![9; 33])))
            .unwrap()
            .add_file("/top", Arc::new(MemoryStorage::new(Vec::new())))
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn hash_matches_reference_values() {
        assert_eq!(hash_name(0, b""), 123_456_789);
        let one = (123_456_789u32).rotate_right(5) ^ u32::from(b'a');
        assert_eq!(hash_name(0, b"a"), one);
    }

    #[test]
    fn bucket_counts() {
        assert_eq!(bucket_count(0), 3);
        assert_eq!(bucket_count(2), 3);
        assert_eq!(bucket_count(4), 5);
        assert_eq!(bucket_count(7), 7);
        assert_eq!(bucket_count(18), 19);
        // 19 is prime; 20..=22 all share a small factor, 23 does not.
        assert_eq!(bucket_count(19), 19);
        assert_eq!(bucket_count(20), 23);
    }

    #[test]
    fn header_round_trips() {
        let header = RomFsHeader {
            header_size: 0x50,
            dir_hash_offset: 1,
            dir_hash_size: 2,
            dir_meta_offset: 3,
            dir_meta_size: 4,
            file_hash_offset: 5,
            file_hash_size: 6,
            file_meta_offset: 7,
            file_meta_size: 8,
            data_offset: 0x200,
        };
        assert_eq!(RomFsHeader::decode(&header.encode()).unwrap(), header);
        let mut bad = header.encode();
        bad[0] = 0x40;
        assert!(RomFsHeader::decode(&bad).is_err());
    }

    #[test]
    fn built_image_resolves_paths() {
        let image = sample();
        let tables = RomFsTables::read(&image).unwrap();
        assert_eq!(tables.header.data_offset, ROMFS_DATA_OFFSET);
        assert_eq!(tables.lookup("/").unwrap(), RomFsEntry::Directory(0));
        assert!(matches!(tables.lookup("/a/b").unwrap(), RomFsEntry::Directory(_)));
        let RomFsEntry::File(c) = tables.lookup("/a/b/c.txt").unwrap() else {
            panic!("expected a file");
        };
        let entry = tables.file(c).unwrap();
        assert_eq!(entry.data_size, 5);
        let data = image
            .read_vec(tables.header.data_offset + entry.data_offset, 5)
            .unwrap();
        assert_eq!(&data, b"hello");
        assert!(matches!(tables.lookup("/a/x"), Err(Error::PathNotFound)));
        assert!(matches!(tables.lookup("/top/x"), Err(Error::PathNotFound)));
    }

    #[test]
    fn file_data_is_aligned() {
        let image = sample();
        let tables = RomFsTables::read(&image).unwrap();
        let root_files = tables.child_files(0).unwrap();
        assert_eq!(root_files.len(), 1);
        assert_eq!(root_files[0].name, "top");

        let RomFsEntry::Directory(a) = tables.lookup("/a").unwrap() else {
            panic!("expected a directory");
        };
        let names: Vec<_> = tables
            .child_directories(a)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["b".to_string()]);
        for file in tables.child_files(a).unwrap() {
            assert_eq!(file.data_offset % FILE_ALIGNMENT, 0);
        }
    }

    #[test]
    fn tables_past_the_end_are_rejected() {
        let header = RomFsHeader {
            header_size: ROMFS_HEADER_SIZE as u64,
            dir_hash_offset: ROMFS_HEADER_SIZE as u64,
            dir_hash_size: u64::MAX,
            dir_meta_offset: 0,
            dir_meta_size: 0,
            file_hash_offset: 0,
            file_hash_size: u64::MAX / 2,
            file_meta_offset: 0,
            file_meta_size: 0,
            data_offset: 0x200,
        };
        let image = MemoryStorage::new(header.encode().to_vec());
        assert!(matches!(RomFsTables::read(&image), Err(Error::InvalidRange)));

        let bytes = sample().read_all().unwrap();
        let cut = MemoryStorage::new(bytes[..ROMFS_HEADER_SIZE + 4].to_vec());
        assert!(matches!(RomFsTables::read(&cut), Err(Error::InvalidRange)));
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut builder = RomFsBuilder::new();
        builder
            .add_file("/x/y", Arc::new(MemoryStorage::with_size(1)))
            .unwrap();
        assert!(matches!(
            builder.add_file("/x/y", Arc::new(MemoryStorage::with_size(1))),
            Err(Error::PathAlreadyExists)
        ));
        assert!(matches!(
            builder.add_file("/x", Arc::new(MemoryStorage::with_size(1))),
            Err(Error::PathAlreadyExists)
        ));
        assert!(matches!(
            builder.add_file("/x/y/z", Arc::new(MemoryStorage::with_size(1))),
            Err(Error::PathAlreadyExists)
        ));
    }
}
