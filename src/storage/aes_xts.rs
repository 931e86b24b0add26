//! AES-128-XTS over a base storage, one tweak per sector.

use super::alignment::check_sector_access;
use super::{SharedStorage, Storage};
use crate::crypto::{AES_BLOCK_SIZE, Aes128XtsCipher};
use crate::{Error, Result};

/// Sector-granular XTS layer.
///
/// Requests must start on a sector boundary and cover whole sectors, except
/// that the last sector of the storage may be short (a multiple of 16).
/// Wrap in [`super::AlignmentMatchingStorage`] or [`super::CachedStorage`]
/// for byte-granular access.
pub struct Aes128XtsStorage {
    base: SharedStorage,
    cipher: Aes128XtsCipher,
    sector_size: usize,
}

impl Aes128XtsStorage {
    pub fn new(base: SharedStorage, key1: &[u8; 16], key2: &[u8; 16], sector_size: usize) -> Result<Self> {
        if sector_size < AES_BLOCK_SIZE || sector_size % AES_BLOCK_SIZE != 0 {
            return Err(Error::InvalidArgument("XTS sector size must be a multiple of 16"));
        }
        Ok(Self {
            base,
            cipher: Aes128XtsCipher::new(key1, key2),
            sector_size,
        })
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn check(&self, offset: u64, len: usize) -> Result<u64> {
        let size = self.base.size()?;
        super::check_range(offset, len, size)?;
        check_sector_access(offset, len, size, self.sector_size as u64)?;
        Ok(offset / self.sector_size as u64)
    }
}

impl Storage for Aes128XtsStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let sector = self.check(offset, buf.len())?;
        self.base.read(offset, buf)?;
        self.cipher.decrypt(buf, self.sector_size, sector);
        Ok(())
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let sector = self.check(offset, buf.len())?;
        let mut encrypted = buf.to_vec();
        self.cipher.encrypt(&mut encrypted, self.sector_size, sector);
        self.base.write(offset, &encrypted)
    }

    fn flush(&self) -> Result<()> {
        self.base.flush()
    }

    fn size(&self) -> Result<u64> {
        self.base.size()
    }

    fn set_size(&self, size: u64) -> Result<()> {
        if size % AES_BLOCK_SIZE as u64 != 0 {
            return Err(Error::InvalidSize);
        }
        self.base.set_size(size)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::testing::pattern;
    use crate::storage::{AlignmentMatchingStorage, MemoryStorage};

    #[test]
    fn round_trip_with_short_final_sector() {
        let base = Arc::new(MemoryStorage::with_size(0x230));
        let xts = Aes128XtsStorage::new(base.clone(), &[1; 16], &[2; 16], 0x200).unwrap();
        let plain = pattern(0x230);
        xts.write(0, &plain).unwrap();
        assert_ne!(base.to_vec(), plain);

        let mut tail = vec![0u8; 0x30];
        xts.read(0x200, &mut tail).unwrap();
        assert_eq!(&tail[..], &plain[0x200..]);
    }

    #[test]
    fn misaligned_requests_fail() {
        let base = Arc::new(MemoryStorage::with_size(0x400));
        let xts = Aes128XtsStorage::new(base, &[1; 16], &[2; 16], 0x200).unwrap();
        let mut buf = [0u8; 0x200];
        assert!(matches!(
            xts.read(0x10, &mut buf),
            Err(Error::MisalignedAccess { .. })
        ));
        assert!(matches!(
            xts.read(0, &mut buf[..0x100]),
            Err(Error::MisalignedAccess { .. })
        ));
    }

    #[test]
    fn alignment_layer_gives_byte_access() {
        let base = Arc::new(MemoryStorage::with_size(0x400));
        let xts = Arc::new(Aes128XtsStorage::new(base, &[3; 16], &[4; 16], 0x200).unwrap());
        let bytes = AlignmentMatchingStorage::new(xts, 0x200).unwrap();
        bytes.write(0x1F0, b"straddles two sectors").unwrap();
        let mut back = [0u8; 21];
        bytes.read(0x1F0, &mut back).unwrap();
        assert_eq!(&back, b"straddles two sectors");
    }
}
