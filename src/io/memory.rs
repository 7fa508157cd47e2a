use super::{resolve_seek, ByteSource, SourceCaps};
use crate::Result;
use bytes::Bytes;
use std::io::SeekFrom;

/// A byte source over an in-memory buffer. Clones share the bytes but not
/// the read position.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    position: u64,
}

impl MemorySource {
    /// Wraps `data`; anything convertible into [`Bytes`] works without a copy.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    /// The whole buffer.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let start = (self.position as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(pos, self.position, Some(self.data.len() as u64))?;
        Ok(self.position)
    }

    fn size(&mut self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn capabilities(&self) -> SourceCaps {
        SourceCaps::SEEKABLE
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn describe(&self) -> String {
        format!("<memory:{} bytes>", self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_past_end_reads_nothing() {
        let mut source = MemorySource::new(vec![1u8, 2, 3]);
        assert_eq!(source.seek(SeekFrom::Start(10)).unwrap(), 10);
        let mut buf = [0u8; 2];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(source.seek(SeekFrom::End(-1)).unwrap(), 2);
        assert_eq!(source.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn test_clone_has_own_position() {
        let mut a = MemorySource::new(&b"hello"[..]);
        let mut buf = [0u8; 2];
        a.read(&mut buf).unwrap();
        let b = a.clone();
        a.read(&mut buf).unwrap();
        assert_eq!(b.position(), 2);
        assert_eq!(a.position(), 4);
    }
}
