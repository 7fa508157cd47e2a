use super::SourceBinding;
use crate::{AvError, Result};
use std::io::{self, SeekFrom};

/// Read granularity when no `io_buffer_size` is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// A demuxer's view of a bound byte source.
///
/// Bytes read while probing are kept in a replay buffer, so a demuxer can
/// start parsing from offset 0 even when the source itself cannot seek back.
/// Positions are relative to where the source stood when it was bound.
/// Seeks are lazy: the source only moves when the next read needs it to.
#[derive(Debug)]
pub struct IoContext {
    binding: SourceBinding,
    replay: Vec<u8>,
    base: u64,
    /// Next byte the demuxer will read
    position: u64,
    /// Where the underlying source actually is
    physical: u64,
    seekable: bool,
    name: String,
    /// Largest single read from the source
    chunk_size: usize,
}

impl IoContext {
    /// Binds a source.
    pub fn new(mut binding: SourceBinding) -> Self {
        let (base, seekable, name) =
            binding.with(|s| (s.position(), s.capabilities().seekable, s.describe()));
        Self {
            binding,
            replay: Vec::new(),
            base,
            position: 0,
            physical: 0,
            seekable,
            name,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets how many bytes a single read may request from the source.
    /// Payload buffers also grow by at most this much per read.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// The configured read granularity.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Description of the underlying source.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the underlying source can seek.
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Current logical read position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Size of the stream from the bind point, when known.
    pub fn size(&mut self) -> Option<u64> {
        let base = self.base;
        self.binding
            .with(|s| s.size())
            .map(|total| total.saturating_sub(base))
    }

    /// Returns true if the logical position is at or past the known size.
    pub fn at_end(&mut self) -> bool {
        let position = self.position;
        self.size().is_some_and(|size| position >= size)
    }

    /// Reads up to `window` bytes from the start of the stream into the replay
    /// buffer and returns them. Does not move the logical position.
    pub fn probe(&mut self, window: usize) -> Result<&[u8]> {
        let mut chunk = vec![0u8; self.chunk_size.min(window)];
        while self.replay.len() < window {
            self.sync_to(self.replay.len() as u64)?;
            let want = (window - self.replay.len()).min(chunk.len());
            let n = self.binding.with(|s| s.read(&mut chunk[..want]))?;
            if n == 0 {
                break;
            }
            self.physical += n as u64;
            self.replay.extend_from_slice(&chunk[..n]);
        }
        Ok(&self.replay[..self.replay.len().min(window)])
    }

    /// Bytes kept for replay.
    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Reads up to `buf.len()` bytes. Returns 0 only at end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position < self.replay.len() as u64 {
            let rest = &self.replay[self.position as usize..];
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            self.position += n as u64;
            return Ok(n);
        }
        self.sync_to(self.position)?;
        if self.physical != self.position {
            // The stream ended before the requested position.
            return Ok(0);
        }
        let n = self.binding.with(|s| s.read(buf))?;
        self.physical += n as u64;
        self.position += n as u64;
        Ok(n)
    }

    /// Fills as much of `buf` as the stream allows; returns the byte count.
    pub fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Fills `buf` completely or fails with a format error.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let at = self.position;
        let n = self.read_exact_or_eof(buf)?;
        if n < buf.len() {
            return Err(AvError::format(format!(
                "unexpected end of data at offset {at}: wanted {} bytes, got {n}",
                buf.len()
            )));
        }
        Ok(())
    }

    /// Reads `N` bytes, or `None` on a clean end of stream. A partial read is
    /// a format error.
    pub fn try_read_array<const N: usize>(&mut self) -> Result<Option<[u8; N]>> {
        let at = self.position;
        let mut buf = [0u8; N];
        match self.read_exact_or_eof(&mut buf)? {
            0 => Ok(None),
            n if n == N => Ok(Some(buf)),
            n => Err(AvError::format(format!(
                "truncated record at offset {at}: wanted {N} bytes, got {n}"
            ))),
        }
    }

    /// Reads exactly `N` bytes.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Appends `len` bytes to `out`; fewer at end of stream. Returns the count.
    ///
    /// `out` grows one chunk at a time, so a bogus length in a container
    /// header costs no more memory than the bytes actually present. When the
    /// stream size is known the request is clamped to what remains.
    pub fn read_into(&mut self, out: &mut bytes::BytesMut, len: usize) -> Result<usize> {
        let mut want = len;
        if let Some(size) = self.size() {
            let remaining = size.saturating_sub(self.position);
            want = want.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        }
        let mut total = 0;
        while total < want {
            let step = (want - total).min(self.chunk_size);
            let start = out.len();
            out.resize(start + step, 0);
            let n = self.read_exact_or_eof(&mut out[start..])?;
            out.truncate(start + n);
            total += n;
            if n < step {
                break;
            }
        }
        Ok(total)
    }

    /// Advances the logical position by `n` bytes.
    pub fn skip(&mut self, n: u64) {
        self.position += n;
    }

    /// Moves the logical position. Going back past the replay buffer on a
    /// sequential source is a contract violation.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let size = match pos {
            SeekFrom::End(_) => self.size(),
            _ => None,
        };
        let target = super::resolve_seek(pos, self.position, size)?;
        if !self.seekable && target < self.physical && target >= self.replay.len() as u64 {
            return Err(AvError::contract(format!(
                "backward seek to {target} on sequential source {}",
                self.name
            )));
        }
        self.position = target;
        Ok(target)
    }

    /// Returns to the start of the stream.
    pub fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Releases the binding.
    pub fn into_binding(self) -> SourceBinding {
        self.binding
    }

    /// Brings the physical source to `target`, seeking or discarding bytes.
    /// Stops early at end of stream.
    fn sync_to(&mut self, target: u64) -> Result<()> {
        if self.physical == target {
            return Ok(());
        }
        if self.seekable {
            let base = self.base;
            let landed = self
                .binding
                .with(|s| s.seek(SeekFrom::Start(base + target)))?;
            self.physical = landed.saturating_sub(base);
            return Ok(());
        }
        if target < self.physical {
            return Err(AvError::contract(format!(
                "backward seek to {target} on sequential source {}",
                self.name
            )));
        }
        let mut scratch = vec![0u8; self.chunk_size.min(64 * 1024)];
        while self.physical < target {
            let want = ((target - self.physical) as usize).min(scratch.len());
            let n = self.binding.with(|s| s.read(&mut scratch[..want]))?;
            if n == 0 {
                break;
            }
            self.physical += n as u64;
        }
        Ok(())
    }
}

fn to_io(err: AvError) -> io::Error {
    match err {
        AvError::Io(e) => e,
        AvError::ResourceIo { source, .. } => source,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

impl io::Read for IoContext {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        IoContext::read(self, buf).map_err(to_io)
    }
}

impl io::Seek for IoContext {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        IoContext::seek(self, pos).map_err(to_io)
    }
}
