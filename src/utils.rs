//! Low-level byte helpers shared by the format codecs and storage layers.
//!
//! The readers take a byte slice plus an offset and either return the value
//! or [`Error::UnexpectedEof`] - there is no partial-read ambiguity.

use crate::{Error, Result};

/// Read a little-endian `u32` at `offset`.
#[inline]
pub(crate) fn le_u32(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(bytesa(buf, offset)?))
}

/// Read a little-endian `u64` at `offset`.
#[inline]
pub(crate) fn le_u64(buf: &[u8], offset: usize) -> Result<u64> {
    Ok(u64::from_le_bytes(bytesa(buf, offset)?))
}

/// Read a little-endian `i32` at `offset`.
#[inline]
pub(crate) fn le_i32(buf: &[u8], offset: usize) -> Result<i32> {
    Ok(i32::from_le_bytes(bytesa(buf, offset)?))
}

/// Read a little-endian `i64` at `offset`.
#[inline]
pub(crate) fn le_i64(buf: &[u8], offset: usize) -> Result<i64> {
    Ok(i64::from_le_bytes(bytesa(buf, offset)?))
}

/// Read an unsigned little-endian integer `width` bytes wide (1..=4).
pub(crate) fn le_uint(buf: &[u8], offset: usize, width: usize) -> Result<u32> {
    let bytes = buf
        .get(offset..offset + width)
        .ok_or(Error::UnexpectedEof)?;
    Ok(bytes
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}

/// Copy exactly `N` bytes at `offset` into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    let end = offset.checked_add(N).ok_or(Error::UnexpectedEof)?;
    let slice = buf.get(offset..end).ok_or(Error::UnexpectedEof)?;
    let mut b = [0u8; N];
    b.copy_from_slice(slice);
    Ok(b)
}

/// Verify that the bytes at `offset` match `expected`.
///
/// Returns [`Error::BadMagic`] on mismatch.
#[inline]
pub(crate) fn magic<const N: usize>(buf: &[u8], offset: usize, expected: &[u8; N]) -> Result<()> {
    if &bytesa::<N>(buf, offset)? != expected {
        return Err(Error::BadMagic);
    }
    Ok(())
}

/// Extract a null-terminated UTF-8 string from a byte slice at `offset`.
///
/// Returns [`Error::InvalidRange`] if `offset` is out of bounds, or
/// [`Error::UnterminatedName`] if no null byte is found.
#[inline]
pub(crate) fn null_string(buf: &[u8], offset: usize) -> Result<String> {
    let slice = buf.get(offset..).ok_or(Error::InvalidRange)?;
    let end = slice
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::UnterminatedName)?;
    Ok(String::from_utf8_lossy(&slice[..end]).into_owned())
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Round `value` down to a multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

#[inline]
pub(crate) const fn is_aligned(value: u64, align: u64) -> bool {
    value & (align - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(le_i32(&buf, 0).unwrap(), 0x0403_0201);
        assert_eq!(le_u32(&buf, 4).unwrap(), 0x0807_0605);
        assert_eq!(le_u64(&buf, 0).unwrap(), 0x0807_0605_0403_0201);
        assert!(matches!(le_u32(&buf, 6), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn variable_width_integers() {
        let buf = [0xAA, 0x34, 0x12, 0x56];
        assert_eq!(le_uint(&buf, 1, 1).unwrap(), 0x34);
        assert_eq!(le_uint(&buf, 1, 3).unwrap(), 0x56_1234);
    }

    #[test]
    fn null_terminated_names() {
        let table = b"main\0rtld\0";
        assert_eq!(null_string(table, 0).unwrap(), "main");
        assert_eq!(null_string(table, 5).unwrap(), "rtld");
        assert!(matches!(null_string(b"abc", 0), Err(Error::UnterminatedName)));
        assert!(matches!(null_string(b"abc", 9), Err(Error::InvalidRange)));
    }

    #[test]
    fn alignment() {
        assert_eq!(align_up(0x21, 0x20), 0x40);
        assert_eq!(align_up(0x40, 0x20), 0x40);
        assert_eq!(align_down(0x3F, 0x20), 0x20);
        assert!(is_aligned(0x200, 0x200));
        assert!(!is_aligned(0x201, 0x10));
    }
}
