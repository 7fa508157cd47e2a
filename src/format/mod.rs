//! # Containers
//!
//! A [`ContainerSession`] binds a byte source to a [`Demuxer`] picked from a
//! [`FormatRegistry`], exposes the stream inventory, and hands out packets
//! through a [`PacketCursor`].
//!
//! Built-in demuxers:
//!
//! | Name     | Container                    | Extensions        |
//! |----------|------------------------------|-------------------|
//! | `wav`    | RIFF WAVE                    | wav               |
//! | `avi`    | RIFF AVI                     | avi               |
//! | `y4m`    | YUV4MPEG2                    | y4m               |
//! | `mpegts` | MPEG-2 transport stream      | ts, m2ts, mts     |
//!
//! ```rust
//! use avpipe::config::Config;
//! use avpipe::format::{ContainerSession, ReadStatus};
//! use avpipe::io::{MemorySource, SourceBinding};
//! use avpipe::logging::Logger;
//! use avpipe::av::Packet;
//!
//! # fn main() -> avpipe::Result<()> {
//! let y4m = b"YUV4MPEG2 W2 H2 F25:1 Cmono\nFRAME\n\x10\x10\x10\x10".to_vec();
//! let source = SourceBinding::owned(MemorySource::new(y4m));
//! let mut session = ContainerSession::open(source, None, &Config::default(), Logger::discard())?;
//! assert_eq!(session.format_name(), "y4m");
//! assert_eq!(session.streams().len(), 1);
//!
//! let mut packet = Packet::new();
//! let mut cursor = session.cursor();
//! while cursor.next(&mut packet)? == ReadStatus::Populated {
//!     assert_eq!(packet.len(), 4);
//!     packet.unref();
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```

mod avi;
mod cursor;
mod riff;
mod session;
/// MPEG transport stream demuxer
pub mod ts;
mod wav;
mod y4m;

pub use cursor::PacketCursor;
pub use session::{ContainerSession, ProbeBudget};

use crate::av::{CodecParameters, MediaKind, Metadata, Packet, Rational};
use crate::config::Config;
use crate::io::IoContext;
use crate::logging::Logger;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a packet read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The packet was filled
    Populated,
    /// No packets remain
    EndOfStream,
}

/// One elementary stream of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Dense index, 0..N-1
    pub index: usize,
    /// Container-specific identifier (TS PID, AVI stream number)
    pub id: u32,
    /// Media kind
    pub kind: MediaKind,
    /// Codec description
    pub params: CodecParameters,
    /// Unit of packet timestamps
    pub time_base: Rational,
    /// Duration in `time_base` units, when known
    pub duration: Option<i64>,
    /// Number of frames, when known
    pub frame_count: Option<u64>,
    /// Per-stream tags
    pub metadata: Metadata,
}

impl Stream {
    /// A stream with the given parameters; the kind follows the codec.
    pub fn new(index: usize, params: CodecParameters, time_base: Rational) -> Self {
        Self {
            index,
            id: index as u32,
            kind: params.codec_id.media_kind(),
            params,
            time_base,
            duration: None,
            frame_count: None,
            metadata: Metadata::new(),
        }
    }

    /// Sets the container-level stream id.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Overrides the media kind derived from the codec.
    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the duration in time base units.
    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets the number of frames.
    pub fn with_frame_count(mut self, frames: u64) -> Self {
        self.frame_count = Some(frames);
        self
    }

    /// Duration as wall-clock time.
    pub fn duration_time(&self) -> Option<Duration> {
        self.duration.map(|d| self.time_base.to_duration(d))
    }
}

/// A logical grouping of streams (an MPEG-TS program).
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Program number
    pub id: u32,
    /// Indices of member streams
    pub streams: Vec<usize>,
    /// Program tags (service name, provider)
    pub metadata: Metadata,
}

/// What a demuxer learns from the container header.
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    /// Streams in index order
    pub streams: Vec<Stream>,
    /// Container-level tags
    pub metadata: Metadata,
    /// Program groupings
    pub programs: Vec<Program>,
    /// Total duration, when known
    pub duration: Option<Duration>,
}

/// A container parser bound to one session.
pub trait Demuxer: Send {
    /// Parses the header. `io` is positioned at the start of the stream.
    fn read_header(&mut self, io: &mut IoContext) -> Result<ContainerInfo>;

    /// Fills `packet` with the next packet, which arrives unreferenced.
    fn read_packet(&mut self, io: &mut IoContext, packet: &mut Packet) -> Result<ReadStatus>;

    /// Derives missing parameters of `stream` from one of its packets. Only
    /// called while probing; returns updated parameters when something was
    /// learned.
    fn refine(&mut self, stream: &Stream, packet: &Packet) -> Option<CodecParameters> {
        let _ = (stream, packet);
        None
    }
}

/// Detects a container format and creates demuxers for it.
pub trait DemuxerFactory: Send + Sync {
    /// Short name used as a format hint.
    fn name(&self) -> &'static str;

    /// File extensions, lowercase without the dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Confidence from 0 to 100 that `data`, the start of a stream, is in
    /// this format.
    fn probe(&self, data: &[u8]) -> u32;

    /// Creates a demuxer for one session.
    fn create(&self, config: &Config, logger: &Logger) -> Box<dyn Demuxer>;
}

/// The set of demuxers a session chooses from.
#[derive(Clone)]
pub struct FormatRegistry {
    factories: Vec<Arc<dyn DemuxerFactory>>,
}

impl FormatRegistry {
    /// A registry without any format.
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// A registry with the built-in formats.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(wav::WavFactory));
        registry.register(Arc::new(avi::AviFactory));
        registry.register(Arc::new(y4m::Y4mFactory));
        registry.register(Arc::new(ts::TsFactory));
        registry
    }

    /// Adds a format. Later registrations win ties.
    pub fn register(&mut self, factory: Arc<dyn DemuxerFactory>) {
        self.factories.push(factory);
    }

    /// Names of all registered formats.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    /// Looks a format up by name or file extension.
    pub fn find(&self, hint: &str) -> Option<Arc<dyn DemuxerFactory>> {
        let hint = hint.trim_start_matches('.').to_ascii_lowercase();
        self.factories
            .iter()
            .rev()
            .find(|f| f.name() == hint || f.extensions().contains(&hint.as_str()))
            .cloned()
    }

    /// Picks the format with the highest probe score, if any scores above 0.
    pub fn detect(&self, data: &[u8]) -> Option<(Arc<dyn DemuxerFactory>, u32)> {
        let mut best: Option<(Arc<dyn DemuxerFactory>, u32)> = None;
        for factory in &self.factories {
            let score = factory.probe(data);
            if score > 0 && best.as_ref().map_or(true, |(_, s)| score >= *s) {
                best = Some((factory.clone(), score));
            }
        }
        best
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name_and_extension() {
        let registry = FormatRegistry::with_builtin();
        assert_eq!(registry.find("wav").unwrap().name(), "wav");
        assert_eq!(registry.find(".M2TS").unwrap().name(), "mpegts");
        assert!(registry.find("mkv").is_none());
    }

    #[test]
    fn test_detect() {
        let registry = FormatRegistry::with_builtin();
        let (factory, score) = registry.detect(b"YUV4MPEG2 W2 H2\n").unwrap();
        assert_eq!(factory.name(), "y4m");
        assert_eq!(score, 100);
        assert!(registry.detect(b"plain text, nothing to see").is_none());
        assert!(FormatRegistry::empty().detect(b"RIFF").is_none());
    }
}
