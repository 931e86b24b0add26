//! AES-128-CTR over a base storage.
//!
//! ## Counter layout
//!
//! | Bytes | Contents |
//! |-------|----------|
//! | 0..8 | fixed high half (IV or section counter) |
//! | 8 (high nibble) | preserved from the template |
//! | 8 (low nibble) ..16 | `(counter_offset + offset) >> 4`, big-endian, 60 bits |
//!
//! Counter-mode is a pure XOR, so the same transform serves reads and writes
//! and any 16-byte block can be decrypted independently.

use std::sync::Arc;

use super::{SharedStorage, Storage};
use crate::crypto::{AES_BLOCK_SIZE, Aes128Ctr};
use crate::{Error, Result};

/// Derive the counter block for the AES block containing absolute byte
/// `offset`, keeping bytes 0..8 and the high nibble of byte 8 from
/// `template`.
pub fn make_counter(template: &[u8; 16], offset: u64) -> [u8; 16] {
    let mut counter = *template;
    let mut block = offset >> 4;
    for i in 0..7 {
        counter[15 - i] = block as u8;
        block >>= 8;
    }
    counter[8] = (counter[8] & 0xF0) | (block as u8 & 0x0F);
    counter
}

/// XOR `data` with the keystream starting at absolute byte `offset`.
pub(crate) fn apply_keystream(cipher: &Aes128Ctr, template: &[u8; 16], offset: u64, data: &mut [u8]) {
    let counter = make_counter(template, offset);
    cipher.transform(&counter, (offset % AES_BLOCK_SIZE as u64) as usize, data);
}

/// Transparent AES-128-CTR layer.
pub struct Aes128CtrStorage {
    base: SharedStorage,
    cipher: Aes128Ctr,
    counter: [u8; 16],
    counter_offset: u64,
}

impl Aes128CtrStorage {
    /// `counter_hi` fills counter bytes 0..8; `counter_offset` is added to
    /// every storage offset before the counter is derived.
    pub fn new(base: SharedStorage, key: &[u8; 16], counter_offset: u64, counter_hi: u64) -> Self {
        let mut counter = [0u8; 16];
        counter[..8].copy_from_slice(&counter_hi.to_be_bytes());
        Self::with_counter(base, key, counter, counter_offset)
    }

    /// Use a full 16-byte counter template.
    pub fn with_counter(base: SharedStorage, key: &[u8; 16], counter: [u8; 16], counter_offset: u64) -> Self {
        Self {
            base,
            cipher: Aes128Ctr::new(key),
            counter,
            counter_offset,
        }
    }

    pub(crate) fn cipher(&self) -> &Aes128Ctr {
        &self.cipher
    }

    pub(crate) fn counter(&self) -> &[u8; 16] {
        &self.counter
    }

    pub(crate) fn counter_offset(&self) -> u64 {
        self.counter_offset
    }

    pub(crate) fn base(&self) -> &SharedStorage {
        &self.base
    }

    /// Shared handle for layers that read through this one.
    pub fn into_shared(self) -> SharedStorage {
        Arc::new(self)
    }
}

impl Storage for Aes128CtrStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.base.read(offset, buf)?;
        let abs = self
            .counter_offset
            .checked_add(offset)
            .ok_or_else(|| Error::out_of_range(offset, buf.len()))?;
        apply_keystream(&self.cipher, &self.counter, abs, buf);
        Ok(())
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let abs = self
            .counter_offset
            .checked_add(offset)
            .ok_or_else(|| Error::out_of_range(offset, buf.len()))?;
        let mut encrypted = buf.to_vec();
        apply_keystream(&self.cipher, &self.counter, abs, &mut encrypted);
        self.base.write(offset, &encrypted)
    }

    fn flush(&self) -> Result<()> {
        self.base.flush()
    }

    fn size(&self) -> Result<u64> {
        self.base.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::storage::testing::pattern;

    const KEY: [u8; 16] = [0x11; 16];

    #[test]
    fn counter_layout() {
        let mut template = [0u8; 16];
        template[..8].copy_from_slice(&0x0102_0304_0506_0708u64.to_be_bytes());
        template[8] = 0xA5;
        let ctr = make_counter(&template, 0x1234_5670);
        assert_eq!(&ctr[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ctr[8], 0xA0);
        assert_eq!(&ctr[9..], &[0, 0, 0, 0x01, 0x23, 0x45, 0x67]);

        let top = make_counter(&template, u64::MAX);
        assert_eq!(top[8], 0xAF);
        assert_eq!(&top[9..], &[0xFF; 7]);
    }

    #[test]
    fn round_trip_through_base() {
        let base = Arc::new(MemoryStorage::with_size(0x100));
        let ctr = Aes128CtrStorage::new(base.clone(), &KEY, 0x4000, 0xDEAD);
        let plain = pattern(0x100);
        ctr.write(0, &plain).unwrap();
        assert_ne!(base.to_vec(), plain);
        let mut back = vec![0u8; 0x100];
        ctr.read(0, &mut back).unwrap();
        assert_eq!(back, plain);
    }

    #[test]
    fn unaligned_reads_match_whole_decrypt() {
        let plain = pattern(0x80);
        let base = Arc::new(MemoryStorage::with_size(0x80));
        let ctr = Aes128CtrStorage::new(base, &KEY, 0, 7);
        ctr.write(0, &plain).unwrap();
        let mut piece = [0u8; 21];
        ctr.read(0x1B, &mut piece).unwrap();
        assert_eq!(&piece, &plain[0x1B..0x1B + 21]);
    }

    #[test]
    fn counter_offset_shifts_keystream() {
        let a = Arc::new(MemoryStorage::with_size(0x40));
        let b = Arc::new(MemoryStorage::with_size(0x20));
        Aes128CtrStorage::new(a.clone(), &KEY, 0, 1)
            .write(0, &[0u8; 0x40])
            .unwrap();
        Aes128CtrStorage::new(b.clone(), &KEY, 0x20, 1)
            .write(0, &[0u8; 0x20])
            .unwrap();
        assert_eq!(&a.to_vec()[0x20..], &b.to_vec()[..]);
    }
}
