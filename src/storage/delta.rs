//! Reconstruction of a new file from an original plus an NDV0 delta.
//!
//! Parsing produces a list of segments; applying the delta builds a
//! [`ConcatenationStorage`] of windows alternately into the original and
//! the delta file, so nothing is copied until it is read.

use std::sync::Arc;

use tracing::debug;

use super::{ConcatenationStorage, SharedStorage, StorageExt, SubStorage};
use crate::formats::ndv0::{DeltaHeader, NDV0_MIN_SIZE, SegmentHeader};
use crate::{Error, Result};

/// Where a run of output bytes comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaSource {
    Original,
    Delta,
}

/// A run of output bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaSegment {
    pub source: DeltaSource,
    /// Offset in the source storage.
    pub source_offset: u64,
    pub size: u64,
}

/// A parsed delta file.
pub struct DeltaFragment {
    delta: SharedStorage,
    header: DeltaHeader,
    segments: Vec<DeltaSegment>,
}

impl DeltaFragment {
    pub fn new(delta: SharedStorage) -> Result<Self> {
        let size = delta.size()?;
        if size < NDV0_MIN_SIZE {
            return Err(Error::Parse("delta file is smaller than its header"));
        }
        let header = DeltaHeader::parse(&delta.read_vec(0, DeltaHeader::SIZE)?)?;
        let body_end = header
            .header_size
            .checked_add(header.body_size)
            .ok_or(Error::InvalidRange)?;
        if body_end > size {
            return Err(Error::Parse("delta body extends past the end of the file"));
        }
        let body_len = usize::try_from(header.body_size).map_err(|_| Error::InvalidRange)?;
        let body = delta.read_vec(header.header_size, body_len)?;
        let segments = parse_segments(&body, &header)?;
        debug!(segments = segments.len(), new_size = header.new_size, "parsed delta");
        Ok(Self {
            delta,
            header,
            segments,
        })
    }

    pub fn header(&self) -> &DeltaHeader {
        &self.header
    }

    pub fn segments(&self) -> &[DeltaSegment] {
        &self.segments
    }

    /// Present the patched file. `original` must be exactly the size the
    /// delta was produced against.
    pub fn patched_storage(&self, original: SharedStorage) -> Result<ConcatenationStorage> {
        if original.size()? != self.header.original_size {
            return Err(Error::Parse("original size does not match the delta header"));
        }
        let mut parts: Vec<SharedStorage> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let base = match segment.source {
                DeltaSource::Original => original.clone(),
                DeltaSource::Delta => self.delta.clone(),
            };
            parts.push(Arc::new(SubStorage::read_only(
                base,
                segment.source_offset,
                segment.size,
            )?));
        }
        ConcatenationStorage::new(parts)
    }
}

fn parse_segments(body: &[u8], header: &DeltaHeader) -> Result<Vec<DeltaSegment>> {
    let mut segments = Vec::new();
    let mut pos = 0usize;
    let mut out = 0u64;
    while out < header.new_size {
        let seg = SegmentHeader::parse(body, pos)?;
        if seg.seek == 0 && seg.size == 0 {
            return Err(Error::Parse("empty delta segment"));
        }
        pos += seg.encoded_len;

        if seg.seek > 0 {
            let seek = u64::from(seg.seek);
            if out + seek > header.original_size {
                return Err(Error::Parse("delta copies past the end of the original"));
            }
            segments.push(DeltaSegment {
                source: DeltaSource::Original,
                source_offset: out,
                size: seek,
            });
            out += seek;
        }

        if seg.size > 0 {
            let size = seg.size as usize;
            if pos + size > body.len() {
                return Err(Error::UnexpectedEof);
            }
            segments.push(DeltaSegment {
                source: DeltaSource::Delta,
                source_offset: header.header_size + pos as u64,
                size: size as u64,
            });
            pos += size;
            out += size as u64;
        }
    }
    if out != header.new_size {
        return Err(Error::Parse("delta segments overrun the new size"));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage};

    const HEADER_SIZE: u64 = 0x40;

    fn build_delta(original_size: u64, new_size: u64, segments: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for &(size, seek, literal) in segments {
            body.extend(SegmentHeader::encode(size, seek));
            body.extend_from_slice(literal);
        }
        let header = DeltaHeader {
            original_size,
            new_size,
            header_size: HEADER_SIZE,
            body_size: body.len() as u64,
        };
        let mut out = vec![0u8; HEADER_SIZE as usize];
        header.write(&mut out);
        out.extend(body);
        out
    }

    #[test]
    fn copies_and_literals_interleave() {
        let original: SharedStorage = Arc::new(MemoryStorage::new(b"0123456789".to_vec()));
        let delta = build_delta(10, 10, &[(2, 3, b"ab"), (0, 2, b""), (3, 0, b"xyz")]);
        let fragment = DeltaFragment::new(Arc::new(MemoryStorage::new(delta))).unwrap();
        assert_eq!(fragment.segments().len(), 4);

        let patched = fragment.patched_storage(original).unwrap();
        assert_eq!(patched.size().unwrap(), 10);
        assert_eq!(patched.read_all().unwrap(), b"012ab56xyz".to_vec());
    }

    #[test]
    fn original_size_must_match() {
        let delta = build_delta(4, 2, &[(2, 0, b"hi")]);
        let fragment = DeltaFragment::new(Arc::new(MemoryStorage::new(delta))).unwrap();
        let wrong: SharedStorage = Arc::new(MemoryStorage::with_size(5));
        assert!(fragment.patched_storage(wrong).is_err());
    }

    #[test]
    fn small_or_truncated_deltas_are_rejected() {
        assert!(DeltaFragment::new(Arc::new(MemoryStorage::with_size(0x20))).is_err());

        let mut delta = build_delta(0, 8, &[(8, 0, b"12345678")]);
        let body_size = (delta.len() as u64 - HEADER_SIZE) as i64;
        delta.truncate(delta.len() - 3);
        delta.resize(delta.len().max(NDV0_MIN_SIZE as usize), 0);
        delta[0x20..0x28].copy_from_slice(&(body_size - 3).to_le_bytes());
        assert!(DeltaFragment::new(Arc::new(MemoryStorage::new(delta))).is_err());
    }
}
