//! Several storages presented end to end.

use tracing::trace;

use super::{SharedStorage, Storage, UNBOUNDED_SIZE, check_range};
use crate::{Error, Result};

struct Segment {
    storage: SharedStorage,
    offset: u64,
    size: u64,
}

impl Segment {
    fn end(&self) -> u64 {
        if self.size == UNBOUNDED_SIZE {
            UNBOUNDED_SIZE
        } else {
            self.offset + self.size
        }
    }
}

/// Concatenation of storages; segment `i` starts where `i - 1` ends.
///
/// Only the last segment may be unbounded, which makes the whole storage
/// unbounded. Empty segments are dropped at construction.
pub struct ConcatenationStorage {
    segments: Vec<Segment>,
    size: u64,
}

impl ConcatenationStorage {
    pub fn new(storages: Vec<SharedStorage>) -> Result<Self> {
        let count = storages.len();
        let mut segments = Vec::with_capacity(count);
        let mut offset = 0u64;
        for (i, storage) in storages.into_iter().enumerate() {
            let size = storage.size()?;
            if size == UNBOUNDED_SIZE {
                if i + 1 != count {
                    return Err(Error::InvalidSize);
                }
                segments.push(Segment {
                    storage,
                    offset,
                    size,
                });
                offset = UNBOUNDED_SIZE;
                break;
            }
            if size == 0 {
                continue;
            }
            segments.push(Segment {
                storage,
                offset,
                size,
            });
            offset = offset.checked_add(size).ok_or(Error::InvalidSize)?;
        }
        Ok(Self {
            segments,
            size: offset,
        })
    }

    /// Index of the segment containing `offset`.
    fn find_segment(&self, offset: u64) -> usize {
        match self.segments.binary_search_by_key(&offset, |s| s.offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        }
    }

    /// Walk `[offset, offset + len)` segment by segment.
    fn for_each_piece(
        &self,
        offset: u64,
        len: usize,
        mut f: impl FnMut(&Segment, u64, std::ops::Range<usize>) -> Result<()>,
    ) -> Result<()> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(());
        }
        let mut index = self.find_segment(offset);
        let mut pos = offset;
        let mut done = 0usize;
        while done < len {
            let segment = &self.segments[index];
            let remaining = (len - done) as u64;
            let piece = (segment.end() - pos).min(remaining) as usize;
            trace!(segment = index, offset = pos - segment.offset, len = piece, "concatenation piece");
            f(segment, pos - segment.offset, done..done + piece)?;
            done += piece;
            pos += piece as u64;
            index += 1;
        }
        Ok(())
    }
}

impl Storage for ConcatenationStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.for_each_piece(offset, buf.len(), |segment, local, range| {
            segment.storage.read(local, &mut buf[range])
        })
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.for_each_piece(offset, buf.len(), |segment, local, range| {
            segment.storage.write(local, &buf[range])
        })
    }

    fn flush(&self) -> Result<()> {
        for segment in &self.segments {
            segment.storage.flush()?;
        }
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}
