//! Handle accounting between callers and mounted filesystems.
//!
//! A [`FileSystemAccessor`] wraps a mounted [`crate::fs::FileSystem`] and
//! records every [`FileAccessor`] and [`DirectoryAccessor`] opened through
//! it. Handles deregister themselves when dropped. The [`MountTable`] refuses
//! to let a filesystem go while any of its handles are alive.
//!
//! Misuse is a bug in the caller and panics:
//!
//! * dropping a [`FileAccessor`] in [`WriteState::NeedsFlush`],
//! * unmounting with open handles,
//! * dropping a handle after its [`FileSystemAccessor`].

pub mod directory;
pub mod file;
pub mod filesystem;
pub mod mount_table;

pub use directory::DirectoryAccessor;
pub use file::{FileAccessor, WriteState};
pub use filesystem::FileSystemAccessor;
pub use mount_table::MountTable;
