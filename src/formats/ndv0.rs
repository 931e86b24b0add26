//! NDV0 - delta patch file.
//!
//! A delta rebuilds a new file from an original by alternating "copy from the
//! original" and "insert literal bytes" segments.
//!
//! ## Header
//! ```text
//! [0x00] Magic "NDV0"              (4 bytes)
//! [0x04] Reserved                  (4 bytes)
//! [0x08] OriginalSize              (i64 LE)
//! [0x10] NewSize                   (i64 LE)
//! [0x18] HeaderSize                (i64 LE) - offset of the segment body
//! [0x20] BodySize                  (i64 LE)
//! ```
//!
//! ## Segment
//! ```text
//! [0x00] Control byte
//!          bits 0-1: seek width - 1   (1..=4 bytes)
//!          bits 3-4: size width - 1   (1..=4 bytes)
//! [0x01] Size  (LE, size width)   literal bytes that follow the header
//! [....] Seek  (LE, seek width)   bytes copied from the original first
//! [....] Literal bytes            (Size bytes)
//! ```
//! Seek bytes come from the original at the current output position; the
//! literal bytes follow them.

use crate::utils::{le_i64, le_uint, magic};
use crate::{Error, Result};

/// Smallest valid delta file.
pub const NDV0_MIN_SIZE: u64 = 0x40;

pub const NDV0_MAGIC: &[u8; 4] = b"NDV0";

/// Parsed NDV0 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaHeader {
    pub original_size: u64,
    pub new_size: u64,
    pub header_size: u64,
    pub body_size: u64,
}

impl DeltaHeader {
    pub const SIZE: usize = 0x28;

    pub fn parse(buf: &[u8]) -> Result<Self> {
        magic(buf, 0, NDV0_MAGIC)?;
        let field = |offset| -> Result<u64> {
            let v = le_i64(buf, offset)?;
            u64::try_from(v).map_err(|_| Error::Parse("negative delta header field"))
        };
        Ok(Self {
            original_size: field(0x08)?,
            new_size: field(0x10)?,
            header_size: field(0x18)?,
            body_size: field(0x20)?,
        })
    }

    /// Serialize into `buf[..Self::SIZE]`.
    pub fn write(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(NDV0_MAGIC);
        buf[4..8].fill(0);
        buf[0x08..0x10].copy_from_slice(&(self.original_size as i64).to_le_bytes());
        buf[0x10..0x18].copy_from_slice(&(self.new_size as i64).to_le_bytes());
        buf[0x18..0x20].copy_from_slice(&(self.header_size as i64).to_le_bytes());
        buf[0x20..0x28].copy_from_slice(&(self.body_size as i64).to_le_bytes());
    }
}

/// One decoded segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Literal bytes following this header.
    pub size: u32,
    /// Bytes copied from the original before the literal bytes.
    pub seek: u32,
    /// Encoded length of the header itself.
    pub encoded_len: usize,
}

impl SegmentHeader {
    /// Decode the segment header at `body[offset..]`.
    pub fn parse(body: &[u8], offset: usize) -> Result<Self> {
        let control = *body.get(offset).ok_or(Error::UnexpectedEof)?;
        let seek_width = usize::from(control & 3) + 1;
        let size_width = usize::from((control >> 3) & 3) + 1;
        let size = le_uint(body, offset + 1, size_width)?;
        let seek = le_uint(body, offset + 1 + size_width, seek_width)?;
        Ok(Self {
            size,
            seek,
            encoded_len: 1 + size_width + seek_width,
        })
    }

    /// Encode with the narrowest widths that fit.
    pub fn encode(size: u32, seek: u32) -> Vec<u8> {
        let width = |v: u32| ((32 - v.leading_zeros()).div_ceil(8)).max(1) as usize;
        let (size_width, seek_width) = (width(size), width(seek));
        let mut out = Vec::with_capacity(1 + size_width + seek_width);
        out.push((((size_width - 1) as u8) << 3) | (seek_width - 1) as u8);
        out.extend_from_slice(&size.to_le_bytes()[..size_width]);
        out.extend_from_slice(&seek.to_le_bytes()[..seek_width]);
        out
    }
}
