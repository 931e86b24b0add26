use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::FileSystemAccessor;
use crate::path;
use crate::{Error, Result};

/// Mounted filesystems by name.
#[derive(Default)]
pub struct MountTable {
    mounts: Mutex<Vec<Arc<FileSystemAccessor>>>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `accessor` under its name, which must be valid and not
    /// already mounted.
    pub fn mount(&self, accessor: FileSystemAccessor) -> Result<()> {
        path::check_mount_name(accessor.name())?;
        let mut mounts = self.mounts.lock();
        if mounts.iter().any(|m| m.name() == accessor.name()) {
            return Err(Error::MountNameAlreadyExists);
        }
        debug!(name = accessor.name(), "mounted");
        mounts.push(Arc::new(accessor));
        Ok(())
    }

    pub fn find(&self, name: &str) -> Result<Arc<FileSystemAccessor>> {
        self.mounts
            .lock()
            .iter()
            .find(|m| m.name() == name)
            .cloned()
            .ok_or(Error::NotMounted)
    }

    /// Remove a mount.
    ///
    /// # Panics
    /// If any file or directory opened through the mount is still open.
    pub fn unmount(&self, name: &str) -> Result<()> {
        let mut mounts = self.mounts.lock();
        let index = mounts
            .iter()
            .position(|m| m.name() == name)
            .ok_or(Error::NotMounted)?;
        if mounts[index].has_open_handles() {
            panic!("unmounting {name} while files or directories are still open");
        }
        mounts.remove(index);
        debug!(name, "unmounted");
        Ok(())
    }

    pub fn is_mounted(&self, name: &str) -> bool {
        self.mounts.lock().iter().any(|m| m.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.mounts
            .lock()
            .iter()
            .map(|m| m.name().to_owned())
            .collect()
    }
}
