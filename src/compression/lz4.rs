//! LZ4 block decompression (requires the `compression` feature).
//!
//! Blocks are raw; the decompressed size comes from the surrounding
//! metadata (compressed storage entries).

#![cfg(feature = "compression")]

use crate::{Error, Result};

/// Decompress a raw LZ4 block that must expand to exactly `size` bytes.
///
/// Returns [`Error::Lz4`] on corrupt input or a length mismatch.
pub fn decompress_block(data: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; size];
    let written = lz4_flex::block::decompress_into(data, &mut out).map_err(|_| Error::Lz4)?;
    if written != size {
        return Err(Error::Lz4);
    }
    Ok(out)
}
