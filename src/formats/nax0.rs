//! NAX0 - AES-XTS encrypted file container (SD card content).
//!
//! ## Layout
//! ```text
//! [0x0000] HMAC-SHA256 signature of [0x20..0x400)   (32 bytes)
//! [0x0020] Magic "NAX0"                             (4 bytes)
//! [0x0024] Reserved                                 (4 bytes)
//! [0x0028] Encrypted data key 1                     (16 bytes)
//! [0x0038] Encrypted data key 2                     (16 bytes)
//! [0x0048] Plaintext size                           (u64 LE)
//! [0x4000] AES-128-XTS payload, 0x4000-byte sectors, length aligned to 0x10
//! ```
//!
//! ## Keys
//! The two data keys are wrapped with a key-encryption key bound to the
//! file's path: `HMAC-SHA256(kek_seed, path)` split into two AES-128 keys,
//! each unwrapping one data key with a single ECB block. The signature is
//! `HMAC-SHA256(verification_key, header[0x20..0x400])`. A file moved to
//! another path without re-wrapping its keys still validates but unwraps the
//! wrong keys.

use tracing::warn;

use crate::crypto::cipher::{decrypt_ecb, encrypt_ecb};
use crate::crypto::hash::{hmac_sha256, verify_hmac_sha256};
use crate::utils::{bytesa, le_u64, magic};
use crate::{Error, Result};

pub const NAX0_MAGIC: &[u8; 4] = b"NAX0";
pub const NAX0_HEADER_SIZE: u64 = 0x4000;
pub const NAX0_SECTOR_SIZE: usize = 0x4000;

const SIGNATURE_SIZE: usize = 0x20;
const SIGNED_END: usize = 0x400;

/// A NAX0 header together with its unwrapped data keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nax0Header {
    pub signature: [u8; 32],
    pub encrypted_keys: [[u8; 16]; 2],
    /// Plaintext size of the payload.
    pub size: u64,
    /// Data keys; zero until [`Nax0Header::decrypt_keys`] runs on a decoded
    /// header.
    pub keys: [[u8; 16]; 2],
    /// The signed block as last decoded or signed, reserved bytes included.
    raw: Vec<u8>,
}

impl Nax0Header {
    /// Header for a new file with the XTS key pair `key` (key 1 then key 2).
    /// Call [`encrypt_keys`](Self::encrypt_keys) and [`sign`](Self::sign)
    /// before writing it.
    pub fn new(key: &[u8; 32], size: u64) -> Self {
        let mut keys = [[0u8; 16]; 2];
        keys[0].copy_from_slice(&key[..16]);
        keys[1].copy_from_slice(&key[16..]);
        Self {
            signature: [0; 32],
            encrypted_keys: [[0; 16]; 2],
            size,
            keys,
            raw: vec![0; SIGNED_END],
        }
    }

    /// Decode the fields of `buf`. A buffer shorter than 0x400 is enough for
    /// the fields, but only a full block can be verified.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        magic(buf, 0x20, NAX0_MAGIC)?;
        let mut raw = vec![0u8; SIGNED_END];
        let kept = buf.len().min(SIGNED_END);
        raw[..kept].copy_from_slice(&buf[..kept]);
        Ok(Self {
            signature: bytesa(buf, 0)?,
            encrypted_keys: [bytesa(buf, 0x28)?, bytesa(buf, 0x38)?],
            size: le_u64(buf, 0x48)?,
            keys: [[0; 16]; 2],
            raw,
        })
    }

    /// The signed portion of the header block, up to 0x400. Reserved bytes
    /// are carried over from the decoded block.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.raw.clone();
        out[..SIGNATURE_SIZE].copy_from_slice(&self.signature);
        out[0x20..0x24].copy_from_slice(NAX0_MAGIC);
        out[0x28..0x38].copy_from_slice(&self.encrypted_keys[0]);
        out[0x38..0x48].copy_from_slice(&self.encrypted_keys[1]);
        out[0x48..0x50].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    /// Key-encryption keys for a file at `path`.
    pub fn derive_kek(kek_seed: &[u8], path: &str) -> Result<[[u8; 16]; 2]> {
        let mac = hmac_sha256(kek_seed, path.as_bytes())?;
        Ok([bytesa(&mac, 0)?, bytesa(&mac, 16)?])
    }

    pub fn decrypt_keys(&mut self, kek_seed: &[u8], path: &str) -> Result<()> {
        let kek = Self::derive_kek(kek_seed, path)?;
        for i in 0..2 {
            self.keys[i] = decrypt_ecb(&kek[i], &self.encrypted_keys[i]);
        }
        Ok(())
    }

    pub fn encrypt_keys(&mut self, kek_seed: &[u8], path: &str) -> Result<()> {
        let kek = Self::derive_kek(kek_seed, path)?;
        for i in 0..2 {
            self.encrypted_keys[i] = encrypt_ecb(&kek[i], &self.keys[i]);
        }
        Ok(())
    }

    pub fn sign(&mut self, verification_key: &[u8]) -> Result<()> {
        self.raw = self.encode();
        self.signature = hmac_sha256(verification_key, &self.raw[SIGNATURE_SIZE..])?;
        self.raw[..SIGNATURE_SIZE].copy_from_slice(&self.signature);
        Ok(())
    }

    /// Check the signature against the block as it was read.
    pub fn verify(&self, verification_key: &[u8]) -> Result<bool> {
        verify_hmac_sha256(verification_key, &self.raw[SIGNATURE_SIZE..], &self.signature)
    }

    /// Decode the header of a file at `path`, unwrap its keys and check the
    /// signature.
    pub fn open(buf: &[u8], kek_seed: &[u8], verification_key: &[u8], path: &str) -> Result<Self> {
        let mut header = Self::decode(buf)?;
        header.decrypt_keys(kek_seed, path)?;
        if !header.verify(verification_key)? {
            warn!(path, "NAX0 header signature mismatch");
            return Err(Error::Nax0SignatureMismatch);
        }
        Ok(header)
    }

    /// Header for a new file at `path`, with wrapped keys and a valid
    /// signature.
    pub fn create(
        key: &[u8; 32],
        size: u64,
        kek_seed: &[u8],
        verification_key: &[u8],
        path: &str,
    ) -> Result<Self> {
        let mut header = Self::new(key, size);
        header.encrypt_keys(kek_seed, path)?;
        header.sign(verification_key)?;
        Ok(header)
    }

    /// The XTS key pair as one 32-byte value.
    pub fn key(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[..16].copy_from_slice(&self.keys[0]);
        key[16..].copy_from_slice(&self.keys[1]);
        key
    }
}
