use super::{ByteSource, SourceCaps};
use crate::{AvError, Result};
use std::io::{self, SeekFrom};

/// Reference point of a seek callback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Offset from the start of the stream
    Start,
    /// Offset from the current position
    Current,
    /// Offset from the end of the stream
    End,
    /// Return the total size without moving; the offset is ignored
    QuerySize,
}

type ReadFn = Box<dyn FnMut(&mut [u8]) -> io::Result<usize> + Send>;
type SeekFn = Box<dyn FnMut(i64, Whence) -> io::Result<u64> + Send>;

/// A byte source driven by caller-supplied closures.
///
/// The read closure returns `Ok(0)` only when the stream is exhausted. Without
/// a seek closure the source is sequential.
///
/// ```rust
/// use avpipe::io::{ByteSource, CallbackSource};
///
/// let data = b"abc".to_vec();
/// let mut offset = 0;
/// let mut source = CallbackSource::new(move |buf: &mut [u8]| {
///     let n = buf.len().min(data.len() - offset);
///     buf[..n].copy_from_slice(&data[offset..offset + n]);
///     offset += n;
///     Ok(n)
/// });
/// assert!(!source.capabilities().seekable);
/// assert_eq!(source.size(), None);
/// ```
pub struct CallbackSource {
    read: ReadFn,
    seek: Option<SeekFn>,
    position: u64,
    exhausted: bool,
    name: String,
}

impl CallbackSource {
    /// Creates a sequential source from a read closure.
    pub fn new<R>(read: R) -> Self
    where
        R: FnMut(&mut [u8]) -> io::Result<usize> + Send + 'static,
    {
        Self {
            read: Box::new(read),
            seek: None,
            position: 0,
            exhausted: false,
            name: "<callback>".to_string(),
        }
    }

    /// Adds a seek closure, making the source seekable. The closure returns
    /// the new absolute position, or the total size for [`Whence::QuerySize`].
    pub fn with_seek<S>(mut self, seek: S) -> Self
    where
        S: FnMut(i64, Whence) -> io::Result<u64> + Send + 'static,
    {
        self.seek = Some(Box::new(seek));
        self
    }

    /// Sets the name used in error messages.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl ByteSource for CallbackSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.exhausted || buf.is_empty() {
            return Ok(0);
        }
        let n = loop {
            match (self.read)(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n > buf.len() {
            return Err(AvError::contract(format!(
                "read callback reported {n} bytes for a {} byte buffer",
                buf.len()
            )));
        }
        if n == 0 {
            self.exhausted = true;
        }
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let seek = self.seek.as_mut().ok_or_else(|| {
            AvError::contract(format!("seek on sequential source {}", self.name))
        })?;
        let (offset, whence) = match pos {
            SeekFrom::Start(o) => (i64::try_from(o).unwrap_or(i64::MAX), Whence::Start),
            SeekFrom::Current(o) => (o, Whence::Current),
            SeekFrom::End(o) => (o, Whence::End),
        };
        let position = seek(offset, whence)?;
        self.position = position;
        self.exhausted = false;
        Ok(position)
    }

    fn size(&mut self) -> Option<u64> {
        let seek = self.seek.as_mut()?;
        seek(0, Whence::QuerySize).ok()
    }

    fn capabilities(&self) -> SourceCaps {
        if self.seek.is_some() {
            SourceCaps::SEEKABLE
        } else {
            SourceCaps::SEQUENTIAL
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl std::fmt::Debug for CallbackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSource")
            .field("name", &self.name)
            .field("seekable", &self.seek.is_some())
            .field("position", &self.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn seekable_over(data: Vec<u8>) -> CallbackSource {
        let state = Arc::new(Mutex::new((data, 0usize)));
        let reader = state.clone();
        CallbackSource::new(move |buf: &mut [u8]| {
            let mut guard = reader.lock();
            let (data, pos) = &mut *guard;
            let start = (*pos).min(data.len());
            let n = buf.len().min(data.len() - start);
            buf[..n].copy_from_slice(&data[start..start + n]);
            *pos += n;
            Ok(n)
        })
        .with_seek(move |offset, whence| {
            let mut guard = state.lock();
            let (data, pos) = &mut *guard;
            let base = match whence {
                Whence::Start => 0,
                Whence::Current => *pos as i64,
                Whence::End => data.len() as i64,
                Whence::QuerySize => return Ok(data.len() as u64),
            };
            *pos = (base + offset).max(0) as usize;
            Ok(*pos as u64)
        })
    }

    #[test]
    fn test_sequential_rejects_seek() {
        let mut source = CallbackSource::new(|_buf: &mut [u8]| Ok(0)).with_name("pipe");
        let err = source.seek(SeekFrom::Start(0)).unwrap_err();
        assert!(err.is_contract_violation());
        assert!(err.to_string().contains("pipe"));
    }

    #[test]
    fn test_query_size_has_no_side_effect() {
        let mut source = seekable_over(b"0123456789".to_vec());
        let mut buf = [0u8; 3];
        source.read(&mut buf).unwrap();
        assert_eq!(source.size(), Some(10));
        source.read(&mut buf).unwrap();
        assert_eq!(&buf, b"345");
    }

    #[test]
    fn test_eof_latches_until_seek() {
        let mut source = seekable_over(b"ab".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(source.seek(SeekFrom::End(-1)).unwrap(), 1);
        assert_eq!(source.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'b');
    }

    #[test]
    fn test_read_error_propagates() {
        let mut source = CallbackSource::new(|_buf: &mut [u8]| {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        });
        let mut buf = [0u8; 1];
        assert!(source.read(&mut buf).unwrap_err().is_io());
    }
}
