//! Storage over any seekable stream: host files, `Cursor<Vec<u8>>`, ...

use std::io::{Read, Seek, SeekFrom, Write};

use parking_lot::Mutex;

use super::{Storage, check_range};
use crate::{Error, Result};

/// Adapts a `Read + Write + Seek` stream to [`Storage`].
///
/// The stream is shared behind a mutex, so each positional request is a
/// seek followed by the transfer. Writes past the end extend the stream.
pub struct StreamStorage<S> {
    stream: Mutex<S>,
}

impl<S: Read + Write + Seek + Send> StreamStorage<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Mutex::new(stream),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

impl<S: Read + Write + Seek + Send> Storage for StreamStorage<S> {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut stream = self.stream.lock();
        let size = stream.seek(SeekFrom::End(0))?;
        check_range(offset, buf.len(), size)?;
        stream.seek(SeekFrom::Start(offset))?;
        stream.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::out_of_range(offset, buf.len()),
            _ => Error::Io(e),
        })
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        check_range(offset, buf.len(), super::UNBOUNDED_SIZE)?;
        let mut stream = self.stream.lock();
        stream.seek(SeekFrom::Start(offset))?;
        stream.write_all(buf)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.stream.lock().flush()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.stream.lock().seek(SeekFrom::End(0))?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn cursor_round_trip() {
        let s = StreamStorage::new(Cursor::new(vec![0u8; 8]));
        s.write(2, b"abcd").unwrap();
        let mut buf = [0u8; 4];
        s.read(2, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
        assert!(s.read(6, &mut buf).is_err());
    }

    #[test]
    fn writes_extend_the_stream() {
        let s = StreamStorage::new(Cursor::new(Vec::new()));
        s.write(4, b"xy").unwrap();
        assert_eq!(s.size().unwrap(), 6);
        assert_eq!(s.into_inner().into_inner(), vec![0, 0, 0, 0, b'x', b'y']);
    }

    #[test]
    fn host_file_backing() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"hello world").unwrap();
        let s = StreamStorage::new(tmp);
        let mut buf = [0u8; 5];
        s.read(6, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }
}
