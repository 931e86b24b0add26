//! **hakkit-fs** - composable storage and filesystem layers for Nintendo
//! container formats.
//!
//! Byte sources stack into transform pipelines ([`storage`]), filesystems
//! sit on top of them ([`fs`]), and mounted filesystems are reached through
//! an explicit [`client::FsClient`] that accounts for every open handle
//! ([`accessor`]).
//!
//! # Layers
//! | Module | Contents |
//! |--------|----------|
//! | [`storage`] | `Storage` trait, windows, concatenation, block cache, AES-CTR/XTS, bucket trees, integrity, NDV0 deltas |
//! | [`fs`] | `FileSystem` trait and the partition, RomFS, concatenation, layered, local, in-memory and NAX0 filesystems |
//! | [`formats`] | on-disk codecs and builders: PFS0, HFS0, RomFS, NAX0, NDV0 |
//! | [`path`] | normalization and mount-name parsing |
//! | [`accessor`] | handle accounting and the mount table |
//! | [`client`] | `mount:/path` routing |
//! | [`crypto`] | cipher and digest helpers |
//! | [`compression`] | LZ4 (feature `compression`) |
//!
//! # Example
//! ```no_run
//! use std::fs::File;
//! use std::sync::Arc;
//!
//! use hakkit_fs::formats::pfs0::PartitionEntry;
//! use hakkit_fs::fs::Pfs0FileSystem;
//! use hakkit_fs::storage::StreamStorage;
//!
//! # fn main() -> hakkit_fs::Result<()> {
//! let nsp = StreamStorage::new(File::open("game.nsp")?);
//! let pfs = Pfs0FileSystem::new(Arc::new(nsp))?;
//! for file in pfs.files() {
//!     println!("{} ({} bytes)", file.name, file.entry.size());
//! }
//! # Ok(())
//! # }
//! ```

pub mod accessor;
pub mod client;
pub mod compression;
pub mod crypto;
pub mod error;
pub mod formats;
pub mod fs;
pub mod path;
pub mod storage;
pub(crate) mod utils;

pub use error::{Error, Result};
