//! AES-128 modes in the layouts used by Switch containers.
//!
//! ## AES-128-CTR
//!
//! The caller builds the 16-byte counter block (see
//! [`crate::storage::aes_ctr`] for the exact byte layout); this module only
//! turns it into keystream. The counter is incremented as a 128-bit
//! big-endian integer after every 16-byte block.
//!
//! ## AES-128-XTS
//!
//! Nintendo's variant stores the sector index **big-endian** in the tweak
//! rather than the little-endian order of IEEE 1619, so the tweak for
//! sector `n` is `n.to_be_bytes()` as a `u128`.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use xts_mode::Xts128;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 0x10;

/// Increment a counter block as a 128-bit big-endian integer.
#[inline]
pub fn increment_counter(ctr: &mut [u8; 16]) {
    for i in (0..16).rev() {
        ctr[i] = ctr[i].wrapping_add(1);
        if ctr[i] != 0 {
            break;
        }
    }
}

/// AES-128 in counter mode.
///
/// Encryption and decryption are the same XOR, so one method serves both.
pub struct Aes128Ctr {
    cipher: Aes128,
}

impl Aes128Ctr {
    pub fn new(key: &[u8; 16]) -> Self {
        Self {
            cipher: Aes128::new(&GenericArray::from(*key)),
        }
    }

    /// XOR `data` with keystream generated from `counter`.
    ///
    /// `skip` bytes (`< 16`) of the first keystream block are discarded, which
    /// lets callers start mid-block.
    pub fn transform(&self, counter: &[u8; 16], skip: usize, data: &mut [u8]) {
        debug_assert!(skip < AES_BLOCK_SIZE);
        let mut ctr = *counter;
        let mut keystream = GenericArray::from([0u8; 16]);
        let mut ks_pos = AES_BLOCK_SIZE;
        let mut first = true;

        for byte in data.iter_mut() {
            if ks_pos == AES_BLOCK_SIZE {
                keystream = GenericArray::from(ctr);
                self.cipher.encrypt_block(&mut keystream);
                increment_counter(&mut ctr);
                ks_pos = if first { skip } else { 0 };
                first = false;
            }
            *byte ^= keystream[ks_pos];
            ks_pos += 1;
        }
    }
}

/// AES-128-XTS with big-endian sector tweaks.
pub struct Aes128XtsCipher {
    xts: Xts128<Aes128>,
}

impl Aes128XtsCipher {
    /// `key1` encrypts data, `key2` encrypts the tweak.
    pub fn new(key1: &[u8; 16], key2: &[u8; 16]) -> Self {
        let cipher_1 = Aes128::new(&GenericArray::from(*key1));
        let cipher_2 = Aes128::new(&GenericArray::from(*key2));
        Self {
            xts: Xts128::new(cipher_1, cipher_2),
        }
    }

    /// Decrypt consecutive sectors in place, the first being `first_sector`.
    ///
    /// The last sector may be shorter than `sector_size`. Every sector must be
    /// at least one AES block long and a multiple of 16 bytes.
    pub fn decrypt(&self, data: &mut [u8], sector_size: usize, first_sector: u64) {
        for (i, sector) in data.chunks_mut(sector_size).enumerate() {
            let tweak = sector_tweak(first_sector + i as u64);
            self.xts.decrypt_sector(sector, tweak);
        }
    }

    /// Encrypt consecutive sectors in place. Same layout rules as
    /// [`decrypt`](Self::decrypt).
    pub fn encrypt(&self, data: &mut [u8], sector_size: usize, first_sector: u64) {
        for (i, sector) in data.chunks_mut(sector_size).enumerate() {
            let tweak = sector_tweak(first_sector + i as u64);
            self.xts.encrypt_sector(sector, tweak);
        }
    }
}

#[inline]
fn sector_tweak(sector: u64) -> [u8; 16] {
    u128::from(sector).to_be_bytes()
}

/// Decrypt a single 16-byte block with AES-128-ECB (key unwrapping).
pub fn decrypt_ecb(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(&GenericArray::from(*key));
    let mut b = GenericArray::from(*block);
    cipher.decrypt_block(&mut b);
    b.into()
}

/// Encrypt a single 16-byte block with AES-128-ECB (key wrapping).
pub fn encrypt_ecb(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(&GenericArray::from(*key));
    let mut b = GenericArray::from(*block);
    cipher.encrypt_block(&mut b);
    b.into()
}
