use std::sync::Weak;

use parking_lot::Mutex;
use tracing::warn;

use super::filesystem::OpenHandles;
use crate::fs::{File, OpenMode, WriteOption};
use crate::{Error, Result};

/// Whether data written through a [`FileAccessor`] has reached the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteState {
    #[default]
    None,
    /// Written without a flush since.
    NeedsFlush,
    /// A write, flush or resize failed partway.
    Failed,
}

/// An open file tracked by its [`super::FileSystemAccessor`].
///
/// Data written without [`WriteOption::FLUSH`] must be flushed before the
/// accessor is dropped; dropping it in [`WriteState::NeedsFlush`] panics.
/// After a write, flush or resize fails, every later call returns
/// [`Error::FileUnusable`].
pub struct FileAccessor {
    file: Box<dyn File>,
    mode: OpenMode,
    path: String,
    write_state: WriteState,
    failed: bool,
    id: u64,
    parent: Weak<Mutex<OpenHandles>>,
}

impl FileAccessor {
    pub(crate) fn new(
        file: Box<dyn File>,
        mode: OpenMode,
        id: u64,
        path: &str,
        parent: Weak<Mutex<OpenHandles>>,
    ) -> Self {
        Self {
            file,
            mode,
            path: path.to_owned(),
            write_state: WriteState::None,
            failed: false,
            id,
            parent,
        }
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn write_state(&self) -> WriteState {
        self.write_state
    }

    fn check_usable(&self) -> Result<()> {
        if self.failed {
            return Err(Error::FileUnusable);
        }
        Ok(())
    }

    /// Run a state-changing operation. The write state reads
    /// [`WriteState::Failed`] while it runs and takes `done` once it
    /// succeeds; a failure latches the handle.
    fn mutate(
        &mut self,
        done: WriteState,
        op: impl FnOnce(&mut dyn File) -> Result<()>,
    ) -> Result<()> {
        self.check_usable()?;
        self.write_state = WriteState::Failed;
        match op(self.file.as_mut()) {
            Ok(()) => {
                self.write_state = done;
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path, error = %e, "file operation failed");
                self.failed = true;
                Err(e)
            }
        }
    }

    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.check_usable()?;
        if !self.mode.contains(OpenMode::READ) {
            return Err(Error::ReadNotPermitted);
        }
        self.file.read(offset, buf)
    }

    pub fn write(&mut self, offset: u64, buf: &[u8], option: WriteOption) -> Result<()> {
        self.check_usable()?;
        if !self.mode.contains(OpenMode::WRITE) {
            return Err(Error::WriteNotPermitted);
        }
        let done = if option.contains(WriteOption::FLUSH) {
            WriteState::None
        } else {
            WriteState::NeedsFlush
        };
        self.mutate(done, |file| file.write(offset, buf, option))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.check_usable()?;
        if !self.mode.contains(OpenMode::WRITE) {
            return Ok(());
        }
        self.mutate(WriteState::None, |file| file.flush())
    }

    pub fn size(&mut self) -> Result<u64> {
        self.check_usable()?;
        self.file.size()
    }

    /// Resizing keeps whatever write state the file had.
    pub fn set_size(&mut self, size: u64) -> Result<()> {
        self.check_usable()?;
        if !self.mode.contains(OpenMode::WRITE) {
            return Err(Error::WriteNotPermitted);
        }
        let previous = self.write_state;
        self.mutate(previous, |file| file.set_size(size))
    }
}

impl Drop for FileAccessor {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        if !self.failed && self.write_state == WriteState::NeedsFlush {
            panic!("file {} closed while it still needs a flush", self.path);
        }
        match self.parent.upgrade() {
            Some(handles) => handles.lock().close_file(self.id),
            None => panic!("file {} outlived its filesystem accessor", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::accessor::FileSystemAccessor;
    use crate::fs::{CreateOptions, FileSystem, InMemoryFileSystem, ReadOnlyFileSystem};

    fn accessor() -> FileSystemAccessor {
        let fs = InMemoryFileSystem::new();
        fs.create_file("/f", 8, CreateOptions::empty()).unwrap();
        FileSystemAccessor::new("save", Arc::new(fs))
    }

    #[test]
    fn write_state_follows_flushes() {
        let fs = accessor();
        let mut file = fs.open_file("/f", OpenMode::ALL).unwrap();
        file.write(0, b"abc", WriteOption::empty()).unwrap();
        assert_eq!(file.write_state(), WriteState::NeedsFlush);
        file.set_size(4).unwrap();
        assert_eq!(file.write_state(), WriteState::NeedsFlush);
        file.flush().unwrap();
        assert_eq!(file.write_state(), WriteState::None);
        file.write(3, b"de", WriteOption::FLUSH).unwrap();
        assert_eq!(file.write_state(), WriteState::None);

        let mut buf = [0u8; 8];
        assert_eq!(file.read(0, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"abcde");
    }

    #[test]
    #[should_panic(expected = "still needs a flush")]
    fn dropping_unflushed_file_panics() {
        let fs = accessor();
        let mut file = fs.open_file("/f", OpenMode::WRITE).unwrap();
        file.write(0, b"lost", WriteOption::empty()).unwrap();
        drop(file);
    }

    #[test]
    fn failures_latch_the_handle() {
        let fs = accessor();
        let mut file = fs.open_file("/f", OpenMode::READ_WRITE).unwrap();
        file.write(0, b"x", WriteOption::empty()).unwrap();
        assert!(matches!(
            file.write(7, b"past end", WriteOption::empty()),
            Err(Error::AppendNotPermitted)
        ));
        assert_eq!(file.write_state(), WriteState::Failed);
        assert!(matches!(file.flush(), Err(Error::FileUnusable)));
        assert!(matches!(file.read(0, &mut [0u8; 1]), Err(Error::FileUnusable)));
        // A failed handle closes quietly even though data was never flushed.
        drop(file);
        assert_eq!(fs.open_file_count(), 0);
    }

    #[test]
    fn permissions_are_checked_before_the_file() {
        let base = InMemoryFileSystem::new();
        base.create_file("/f", 1, CreateOptions::empty()).unwrap();
        let fs = FileSystemAccessor::new("ro", Arc::new(ReadOnlyFileSystem::new(Arc::new(base))));
        let mut file = fs.open_file("/f", OpenMode::READ).unwrap();
        assert!(matches!(
            file.write(0, b"y", WriteOption::FLUSH),
            Err(Error::WriteNotPermitted)
        ));
        assert!(matches!(file.set_size(0), Err(Error::WriteNotPermitted)));
        // Permission errors do not latch.
        assert_eq!(file.read(0, &mut [0u8; 1]).unwrap(), 1);
        file.flush().unwrap();
    }

    #[test]
    #[should_panic(expected = "outlived its filesystem accessor")]
    fn file_outliving_its_accessor_panics() {
        let fs = accessor();
        let file = fs.open_file("/f", OpenMode::READ).unwrap();
        drop(fs);
        drop(file);
    }
}
