//! Arbitrary-granularity access over a storage that only accepts aligned
//! requests.

use tracing::trace;

use super::{SharedStorage, Storage, UNBOUNDED_SIZE, check_range};
use crate::utils::{align_down, align_up, is_aligned};
use crate::{Error, Result};

/// Validate a request against a sector-granular layer.
///
/// The offset must be sector aligned and the length a multiple of the
/// sector size, except that the final request may stop at `size` as long
/// as it stays a multiple of 16.
pub(crate) fn check_sector_access(offset: u64, len: usize, size: u64, sector: u64) -> Result<()> {
    let len64 = len as u64;
    let reaches_end = size != UNBOUNDED_SIZE && offset + len64 == size;
    let ok = is_aligned(offset, sector)
        && (is_aligned(len64, sector) || (reaches_end && is_aligned(len64, 16)));
    if !ok {
        return Err(Error::MisalignedAccess {
            offset,
            len: len64,
            alignment: sector,
        });
    }
    Ok(())
}

/// Widens unaligned requests to whole `alignment` units, reading around
/// the edges and merging for writes.
pub struct AlignmentMatchingStorage {
    base: SharedStorage,
    alignment: u64,
}

impl AlignmentMatchingStorage {
    /// `alignment` must be a power of two.
    pub fn new(base: SharedStorage, alignment: u64) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return Err(Error::InvalidArgument("alignment must be a power of two"));
        }
        Ok(Self { base, alignment })
    }

    /// The aligned span covering `[offset, offset + len)`, clamped to `size`.
    fn span(&self, offset: u64, len: usize, size: u64) -> (u64, u64) {
        let start = align_down(offset, self.alignment);
        let end = align_up(offset + len as u64, self.alignment).min(size);
        (start, end)
    }
}

impl Storage for AlignmentMatchingStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let size = self.base.size()?;
        check_range(offset, buf.len(), size)?;
        if buf.is_empty() {
            return Ok(());
        }
        let (start, end) = self.span(offset, buf.len(), size);
        if start == offset && end == offset + buf.len() as u64 {
            return self.base.read(offset, buf);
        }
        trace!(offset, len = buf.len(), start, end, "widening unaligned read");
        let mut scratch = vec![0u8; (end - start) as usize];
        self.base.read(start, &mut scratch)?;
        let at = (offset - start) as usize;
        buf.copy_from_slice(&scratch[at..at + buf.len()]);
        Ok(())
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let size = self.base.size()?;
        check_range(offset, buf.len(), size)?;
        if buf.is_empty() {
            return Ok(());
        }
        let (start, end) = self.span(offset, buf.len(), size);
        if start == offset && end == offset + buf.len() as u64 {
            return self.base.write(offset, buf);
        }
        trace!(offset, len = buf.len(), start, end, "read-modify-write");
        let mut scratch = vec![0u8; (end - start) as usize];
        self.base.read(start, &mut scratch)?;
        let at = (offset - start) as usize;
        scratch[at..at + buf.len()].copy_from_slice(buf);
        self.base.write(start, &scratch)
    }

    fn flush(&self) -> Result<()> {
        self.base.flush()
    }

    fn size(&self) -> Result<u64> {
        self.base.size()
    }

    fn set_size(&self, size: u64) -> Result<()> {
        self.base.set_size(size)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::storage::testing::pattern;

    /// Accepts only 16-byte aligned requests.
    struct Strict {
        inner: MemoryStorage,
        seen: Mutex<Vec<(u64, usize)>>,
    }

    impl Storage for Strict {
        fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
            check_sector_access(offset, buf.len(), self.inner.size()?, 16)?;
            self.seen.lock().push((offset, buf.len()));
            self.inner.read(offset, buf)
        }
        fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
            check_sector_access(offset, buf.len(), self.inner.size()?, 16)?;
            self.inner.write(offset, buf)
        }
        fn flush(&self) -> Result<()> {
            Ok(())
        }
        fn size(&self) -> Result<u64> {
            self.inner.size()
        }
    }

    fn strict(data: Vec<u8>) -> Arc<Strict> {
        Arc::new(Strict {
            inner: MemoryStorage::new(data),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn sector_access_rules() {
        assert!(check_sector_access(0x200, 0x200, 0x1000, 0x200).is_ok());
        assert!(check_sector_access(0x201, 0x200, 0x1000, 0x200).is_err());
        assert!(check_sector_access(0x200, 0x100, 0x1000, 0x200).is_err());
        assert!(check_sector_access(0xE00, 0x100, 0xF00, 0x200).is_ok());
        assert!(check_sector_access(0xE00, 0x108, 0xF08, 0x200).is_err());
    }

    #[test]
    fn unaligned_read_is_widened() {
        let base = strict(pattern(64));
        let s = AlignmentMatchingStorage::new(base.clone(), 16).unwrap();
        let mut buf = [0u8; 10];
        s.read(13, &mut buf).unwrap();
        assert_eq!(&buf, &pattern(64)[13..23]);
        assert_eq!(*base.seen.lock(), vec![(0, 32)]);
    }

    #[test]
    fn unaligned_write_merges() {
        let base = strict(pattern(48));
        let s = AlignmentMatchingStorage::new(base.clone(), 16).unwrap();
        s.write(30, &[0xAA; 4]).unwrap();
        let mut expected = pattern(48);
        expected[30..34].fill(0xAA);
        assert_eq!(base.inner.to_vec(), expected);
    }

    #[test]
    fn rejects_non_power_of_two() {
        let base = strict(vec![0; 16]);
        assert!(AlignmentMatchingStorage::new(base, 24).is_err());
    }
}
