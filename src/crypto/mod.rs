//! Cipher and digest collaborators used by the transform layers.
//!
//! The storage layers never implement block ciphers themselves; they call
//! into this module, which wraps the RustCrypto `aes`, `xts-mode`, `hmac` and
//! `sha2` crates with the byte layouts Switch content uses:
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`cipher::Aes128Ctr`] | CTR keystream over an explicit 16-byte counter block |
//! | [`cipher::Aes128XtsCipher`] | XTS with big-endian sector tweaks |
//! | [`cipher::decrypt_ecb`] / [`cipher::encrypt_ecb`] | single-block key wrapping |
//! | [`hash`] | SHA-256 and HMAC-SHA256 |
//!
//! ## Key hierarchy (brief)
//!
//! ```text
//! NAX0 file
//!   └── kek_seed + normalized path ── HMAC-SHA256 ──> kek1 | kek2
//!         └── AES-ECB unwrap enc_key1 / enc_key2
//!               └── AES-XTS decrypt payload (sector 0x4000)
//! ```

pub mod cipher;
pub mod hash;

pub use cipher::{AES_BLOCK_SIZE, Aes128Ctr, Aes128XtsCipher, decrypt_ecb, encrypt_ecb};
