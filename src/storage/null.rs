//! Zero-filling storage, used to pad gaps between concatenated segments.

use super::{Storage, UNBOUNDED_SIZE, check_range};
use crate::Result;

/// Reads as zeros, discards writes.
#[derive(Debug, Clone, Copy)]
pub struct NullStorage {
    size: u64,
}

impl NullStorage {
    /// A storage with no end.
    pub fn new() -> Self {
        Self {
            size: UNBOUNDED_SIZE,
        }
    }

    /// A storage of exactly `size` zero bytes.
    pub fn with_size(size: u64) -> Self {
        Self { size }
    }
}

impl Default for NullStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for NullStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.size)?;
        buf.fill(0);
        Ok(())
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        check_range(offset, buf.len(), self.size)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}
