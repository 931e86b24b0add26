//! On-disk layouts: decoding, encoding and builders.
//!
//! Codecs here work on byte slices and [`crate::storage::Storage`]s; the
//! filesystems in [`crate::fs`] are built on top of them. All multi-byte
//! fields are little-endian unless a module says otherwise.
//!
//! ## Format overview
//!
//! | Module    | Format | Description |
//! |-----------|--------|-------------|
//! | [`pfs0`]  | PFS0 / NSP | Flat archive; header, entry table, string table, data |
//! | [`hfs0`]  | HFS0 | PFS0 variant whose entries carry a SHA-256 of each file's head |
//! | [`romfs`] | RomFS | Read-only tree with hashed directory and file tables |
//! | [`nax0`]  | NAX0 | AES-XTS encrypted file with a signed, path-bound key header |
//! | [`ndv0`]  | NDV0 | Delta fragment patching an original storage into a new one |

pub mod hfs0;
pub mod nax0;
pub mod ndv0;
pub mod pfs0;
pub mod romfs;
