//! Compression helpers (requires the `compression` feature).
//!
//! Gated behind the `compression` Cargo feature so the core layers build
//! without a codec dependency:
//!
//! ```toml
//! [dependencies]
//! hakkit-fs = { version = "0.1", features = ["compression"] }
//! ```
//!
//! | Module | Algorithm | Used by |
//! |--------|-----------|---------|
//! | [`lz4`] | LZ4 block | [`crate::storage::compressed::CompressedStorage`] entries of type LZ4 |
//!
//! Compressed storages record the decompressed length of every region, so
//! blocks are raw (no size prefix) and decompressed into an exactly sized
//! buffer with [`lz4::decompress_block`].

#[cfg(feature = "compression")]
pub mod lz4;
