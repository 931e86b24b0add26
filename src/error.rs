//! Library-wide error and result types.
//!
//! One taxonomy covers every layer. Errors are returned unchanged through
//! composed storages and filesystems; the only place a layer reinterprets a
//! child error is where "not found" is an expected probe outcome (see
//! [`Error::is_not_found`]).
//!
//! Programmer errors (unmounting with open handles, closing a file that
//! still needs a flush) are not represented here: they panic.

use std::io;

use thiserror::Error;

/// Result alias used throughout hakkit-fs.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested byte range lies outside the addressable region, or
    /// `offset + len` overflows.
    #[error("range {offset:#x}+{len:#x} is out of bounds")]
    OutOfRange { offset: u64, len: u64 },
    /// An argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A size could not be applied (negative growth, unknown size where a
    /// known one is required, ...).
    #[error("invalid size")]
    InvalidSize,
    /// A sector-granular layer received an unaligned request.
    #[error("access at {offset:#x}+{len:#x} is not aligned to {alignment:#x}")]
    MisalignedAccess { offset: u64, len: u64, alignment: u64 },

    /// Read on a handle opened without read permission.
    #[error("file was not opened for reading")]
    ReadNotPermitted,
    /// Write on a handle opened without write permission.
    #[error("file was not opened for writing")]
    WriteNotPermitted,
    /// Write past the end of a file opened without append permission.
    #[error("file was not opened with append permission")]
    AppendNotPermitted,
    /// The layer does not implement this operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// A path failed structural validation.
    #[error("invalid path: {0}")]
    InvalidPath(&'static str),
    /// A path exceeds [`crate::path::PATH_LENGTH_MAX`].
    #[error("path is too long")]
    TooLongPath,
    /// A path contains a character that is never valid in this position.
    #[error("path contains an invalid character")]
    InvalidCharacter,
    /// A `..` segment would climb above the root.
    #[error("path escapes the root directory")]
    DirectoryUnobtainable,
    /// No entry exists at the requested path.
    #[error("path not found")]
    PathNotFound,
    /// An entry already exists at the requested path.
    #[error("path already exists")]
    PathAlreadyExists,
    /// A directory still has children.
    #[error("directory is not empty")]
    DirectoryNotEmpty,

    /// A mount name is empty, too long, reserved or contains separators.
    #[error("invalid mount name")]
    InvalidMountName,
    /// The mount name is already registered.
    #[error("mount name already exists")]
    MountNameAlreadyExists,
    /// No filesystem is mounted under the requested name.
    #[error("mount name not found")]
    NotMounted,
    /// A commit was requested while a file is open for writing.
    #[error("a file is still open for writing")]
    WriteModeFileNotClosed,
    /// An earlier operation on this handle failed; the handle refuses
    /// further work.
    #[error("file handle is unusable after an earlier failure")]
    FileUnusable,

    /// A hashed region did not match its stored digest.
    #[error("integrity verification failed at {offset:#x}")]
    IntegrityVerificationFailed { offset: u64 },
    /// A NAX0 header signature did not validate with the supplied keys.
    #[error("NAX0 header signature mismatch")]
    Nax0SignatureMismatch,

    /// A magic/signature field did not match the expected value.
    #[error("bad magic value")]
    BadMagic,
    /// The data ended before all expected bytes could be read.
    #[error("unexpected end of data")]
    UnexpectedEof,
    /// A null-terminated string had no null terminator within the buffer.
    #[error("unterminated string")]
    UnterminatedName,
    /// An offset or size field would read outside the valid region.
    #[error("invalid offset or size")]
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    #[error("parse error: {0}")]
    Parse(&'static str),

    /// An underlying host I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// LZ4 decompression failed.
    #[cfg(feature = "compression")]
    #[error("lz4 decompression failed")]
    Lz4,
}

impl Error {
    /// Shorthand for [`Error::OutOfRange`].
    pub(crate) fn out_of_range(offset: u64, len: usize) -> Self {
        Error::OutOfRange {
            offset,
            len: len as u64,
        }
    }

    /// `true` for the "nothing here" outcome that probing loops skip over.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::PathNotFound)
    }
}
