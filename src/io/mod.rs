//! # Byte sources
//!
//! Everything a container session reads comes through a [`ByteSource`]:
//!
//! - [`FileSource`]: a file on disk
//! - [`MemorySource`]: an in-memory buffer
//! - [`CallbackSource`]: caller-supplied read and (optional) seek closures
//!
//! The directory backend in [`dir`] shares the open/iterate/close shape but
//! yields [`dir::DirEntry`] records instead of bytes.
//!
//! All sources are blocking. `read` returns 0 only at end of stream, and
//! keeps returning 0 on every later call.
//!
//! ```rust
//! use avpipe::io::{ByteSource, MemorySource};
//! use std::io::SeekFrom;
//!
//! # fn main() -> avpipe::Result<()> {
//! let mut source = MemorySource::new(&b"RIFF...."[..]);
//! let mut buf = [0u8; 4];
//! assert_eq!(source.read(&mut buf)?, 4);
//! assert_eq!(&buf, b"RIFF");
//! assert_eq!(source.seek(SeekFrom::End(-2))?, 6);
//! assert_eq!(source.size(), Some(8));
//! # Ok(())
//! # }
//! ```

mod callback;
mod context;
pub mod dir;
mod file;
mod memory;

pub use callback::{CallbackSource, Whence};
pub use context::IoContext;
pub use file::FileSource;
pub use memory::MemorySource;

use crate::Result;
use parking_lot::Mutex;
use std::io::SeekFrom;
use std::sync::Arc;

/// What a byte source can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCaps {
    /// The source can be read
    pub readable: bool,
    /// The source accepts seek requests
    pub seekable: bool,
}

impl SourceCaps {
    /// A readable, seekable source.
    pub const SEEKABLE: SourceCaps = SourceCaps {
        readable: true,
        seekable: true,
    };

    /// A readable source that only moves forward.
    pub const SEQUENTIAL: SourceCaps = SourceCaps {
        readable: true,
        seekable: false,
    };
}

/// A blocking supplier of bytes.
pub trait ByteSource: Send {
    /// Reads up to `buf.len()` bytes. Returns 0 only at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Moves the read position. Sequential sources reject every call with
    /// [`crate::AvError::ContractViolation`].
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Total size in bytes when known. Never moves the read position.
    fn size(&mut self) -> Option<u64>;

    /// Capability flags.
    fn capabilities(&self) -> SourceCaps;

    /// Current read position.
    fn position(&self) -> u64;

    /// Short description used in error messages and logs.
    fn describe(&self) -> String {
        "<stream>".to_string()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        (**self).seek(pos)
    }

    fn size(&mut self) -> Option<u64> {
        (**self).size()
    }

    fn capabilities(&self) -> SourceCaps {
        (**self).capabilities()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A source the caller keeps a handle to after binding it to a session.
pub type SharedSource = Arc<Mutex<Box<dyn ByteSource>>>;

/// Wraps a source so it can be bound to a session without giving it up.
pub fn share(source: impl ByteSource + 'static) -> SharedSource {
    Arc::new(Mutex::new(Box::new(source)))
}

/// How a source is bound to a container session.
pub enum SourceBinding {
    /// The session owns the source and drops it on close.
    Owned(Box<dyn ByteSource>),
    /// The caller keeps the source alive; closing the session leaves it open.
    Shared(SharedSource),
}

impl SourceBinding {
    /// Binds a source exclusively.
    pub fn owned(source: impl ByteSource + 'static) -> Self {
        SourceBinding::Owned(Box::new(source))
    }

    /// Returns true for [`SourceBinding::Shared`].
    pub fn is_shared(&self) -> bool {
        matches!(self, SourceBinding::Shared(_))
    }

    pub(crate) fn with<R>(&mut self, f: impl FnOnce(&mut dyn ByteSource) -> R) -> R {
        match self {
            SourceBinding::Owned(source) => f(&mut **source),
            SourceBinding::Shared(shared) => {
                let mut guard = shared.lock();
                f(&mut **guard)
            }
        }
    }
}

impl std::fmt::Debug for SourceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceBinding::Owned(s) => write!(f, "Owned({})", s.describe()),
            SourceBinding::Shared(s) => write!(f, "Shared({})", s.lock().describe()),
        }
    }
}

impl From<Box<dyn ByteSource>> for SourceBinding {
    fn from(source: Box<dyn ByteSource>) -> Self {
        SourceBinding::Owned(source)
    }
}

impl From<SharedSource> for SourceBinding {
    fn from(source: SharedSource) -> Self {
        SourceBinding::Shared(source)
    }
}

/// Resolves a [`SeekFrom`] against a position and optional size.
pub(crate) fn resolve_seek(pos: SeekFrom, current: u64, size: Option<u64>) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset as i128),
        SeekFrom::Current(delta) => Some(current as i128 + delta as i128),
        SeekFrom::End(delta) => size.map(|s| s as i128 + delta as i128),
    };
    match target {
        Some(t) if t >= 0 && t <= u64::MAX as i128 => Ok(t as u64),
        Some(t) => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("seek to negative or overflowing position {t}"),
        )
        .into()),
        None => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "seek from end on a source of unknown size",
        )
        .into()),
    }
}
