//! # Demux, decode, transform
//!
//! [`Pipeline`] runs the whole chain for one session: packets are read
//! through the session's cursor, routed to the decoder of their stream,
//! decoded, optionally converted, and handed to a sink. At end of stream
//! every decoder is flushed and drained.
//!
//! ```rust
//! use avpipe::av::MediaKind;
//! use avpipe::config::Config;
//! use avpipe::format::ContainerSession;
//! use avpipe::io::{MemorySource, SourceBinding};
//! use avpipe::logging::Logger;
//! use avpipe::pipeline::{Flow, Pipeline};
//!
//! # fn main() -> avpipe::Result<()> {
//! let y4m = b"YUV4MPEG2 W2 H2 F25:1 Cmono\nFRAME\n\x10\x10\x10\x10FRAME\n\x20\x20\x20\x20".to_vec();
//! let config = Config::default();
//! let session = ContainerSession::open(
//!     SourceBinding::owned(MemorySource::new(y4m)),
//!     None,
//!     &config,
//!     Logger::discard(),
//! )?;
//!
//! let mut pipeline = Pipeline::new(session, config, Logger::discard()).select(&[MediaKind::Video]);
//! let mut luma = Vec::new();
//! let stats = pipeline.run(|_stream, frame| {
//!     luma.push(frame.row(0, 0).unwrap()[0]);
//!     Ok(Flow::Continue)
//! })?;
//! assert_eq!(luma, vec![0x10, 0x20]);
//! assert_eq!(stats.frames, 2);
//! # Ok(())
//! # }
//! ```

use crate::av::{Frame, MediaKind, Packet};
use crate::codec::{CodecRegistry, DecoderOptions, DecoderStats, DecoderTable, Route};
use crate::config::Config;
use crate::format::{ContainerSession, ReadStatus};
use crate::logging::{self, Logger};
use crate::transform::{AudioSpec, Resampler, Scaler};
use crate::Result;
use std::collections::BTreeMap;

/// What the sink wants after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep going
    Continue,
    /// Stop reading; decoders are not flushed
    Stop,
}

/// Counters of one [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Packets read from the session
    pub packets_read: u64,
    /// Packets of streams without a decoder
    pub packets_skipped: u64,
    /// Frames handed to the sink
    pub frames: u64,
    /// The sink returned [`Flow::Stop`]
    pub stopped: bool,
    /// Counters of every decoder, by stream index
    pub decoders: BTreeMap<usize, DecoderStats>,
}

enum Stage {
    Scale { scaler: Scaler, out: Frame },
    Resample { resampler: Resampler, out: Frame },
}

/// Frame delivery: optional per-stream conversion, then the sink.
struct Delivery<S> {
    sink: S,
    stages: BTreeMap<usize, Stage>,
    frames: u64,
    stopped: bool,
}

impl<S> Delivery<S>
where
    S: FnMut(usize, &Frame) -> Result<Flow>,
{
    fn offer(&mut self, stream: usize, frame: &Frame) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        match self.stages.get_mut(&stream) {
            None => Self::deliver(&mut self.sink, &mut self.frames, &mut self.stopped, stream, frame),
            Some(Stage::Scale { scaler, out }) => {
                scaler.scale(frame, out)?;
                Self::deliver(&mut self.sink, &mut self.frames, &mut self.stopped, stream, out)
            }
            Some(Stage::Resample { resampler, out }) => {
                if resampler.convert(frame, out)? == 0 {
                    return Ok(());
                }
                Self::deliver(&mut self.sink, &mut self.frames, &mut self.stopped, stream, out)
            }
        }
    }

    fn deliver(sink: &mut S, frames: &mut u64, stopped: &mut bool, stream: usize, frame: &Frame) -> Result<()> {
        *frames += 1;
        if sink(stream, frame)? == Flow::Stop {
            *stopped = true;
        }
        Ok(())
    }

    /// Drains the resamplers.
    fn finish(&mut self) -> Result<()> {
        for (&stream, stage) in self.stages.iter_mut() {
            if self.stopped {
                break;
            }
            if let Stage::Resample { resampler, out } = stage {
                if resampler.flush(out)? > 0 {
                    Self::deliver(&mut self.sink, &mut self.frames, &mut self.stopped, stream, out)?;
                }
            }
        }
        Ok(())
    }
}

/// One session, its decoders and the conversions applied to their output.
pub struct Pipeline {
    session: ContainerSession,
    config: Config,
    logger: Logger,
    registry: CodecRegistry,
    kinds: Vec<MediaKind>,
    stages: BTreeMap<usize, Stage>,
}

impl Pipeline {
    /// A pipeline decoding every stream with the built-in decoders.
    pub fn new(session: ContainerSession, config: Config, logger: Logger) -> Self {
        Self {
            session,
            config,
            logger,
            registry: CodecRegistry::with_builtin(),
            kinds: Vec::new(),
            stages: BTreeMap::new(),
        }
    }

    /// Decodes only streams of these kinds. All kinds by default.
    pub fn select(mut self, kinds: &[MediaKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Uses another set of decoders.
    pub fn with_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Scales the frames of `stream` before they reach the sink.
    pub fn with_scaler(mut self, stream: usize, scaler: Scaler) -> Self {
        self.stages.insert(
            stream,
            Stage::Scale {
                scaler,
                out: Frame::new(),
            },
        );
        self
    }

    /// Resamples the frames of `stream` to `output` before they reach the
    /// sink.
    pub fn with_resampler(mut self, stream: usize, resampler: Resampler, output: AudioSpec) -> Self {
        self.stages.insert(
            stream,
            Stage::Resample {
                resampler,
                out: output.template(),
            },
        );
        self
    }

    /// The session being read.
    pub fn session(&self) -> &ContainerSession {
        &self.session
    }

    /// Gives the session back, for example to close it explicitly.
    pub fn into_session(self) -> ContainerSession {
        self.session
    }

    /// Runs to end of stream, or until the sink returns [`Flow::Stop`].
    ///
    /// An I/O error while reading ends demuxing; decoders are still flushed
    /// so frames already decoded reach the sink, then the error is returned.
    /// Any other error is returned immediately.
    pub fn run<S>(&mut self, sink: S) -> Result<PipelineStats>
    where
        S: FnMut(usize, &Frame) -> Result<Flow>,
    {
        let mut table = DecoderTable::new(self.registry.clone(), self.logger.clone());
        let registered = table.register_all(&self.session, &self.kinds)?;
        table.open_all(&DecoderOptions::from_config(&self.config))?;
        logging::av_info!(
            self.logger,
            "Decoding {registered} of {} streams from {}",
            self.session.streams().len(),
            self.session.resource()
        );

        let mut stats = PipelineStats::default();
        let mut delivery = Delivery {
            sink,
            stages: std::mem::take(&mut self.stages),
            frames: 0,
            stopped: false,
        };
        let result = Self::demux(&mut self.session, &mut table, &mut delivery, &mut stats);

        let outcome = match result {
            Err(e) if !e.is_io() => Err(e),
            read => {
                if let Err(e) = &read {
                    logging::av_warn!(self.logger, "Reading stopped early: {e}");
                }
                let flushed = if delivery.stopped {
                    Ok(())
                } else {
                    let drained =
                        table.flush_all(&mut |stream, frame: &Frame| delivery.offer(stream, frame));
                    drained.and_then(|_| delivery.finish())
                };
                read.and(flushed)
            }
        };

        self.stages = std::mem::take(&mut delivery.stages);
        stats.frames = delivery.frames;
        stats.stopped = delivery.stopped;
        for stream in table.streams() {
            if let Some(decoder) = table.stats(stream) {
                stats.decoders.insert(stream, decoder);
            }
        }
        logging::av_debug!(self.logger, "Pipeline finished: {stats:?}");
        outcome.map(|()| stats)
    }

    fn demux<S>(
        session: &mut ContainerSession,
        table: &mut DecoderTable,
        delivery: &mut Delivery<S>,
        stats: &mut PipelineStats,
    ) -> Result<()>
    where
        S: FnMut(usize, &Frame) -> Result<Flow>,
    {
        let mut packet = Packet::new();
        let mut cursor = session.cursor();
        while !delivery.stopped {
            if cursor.next(&mut packet)? == ReadStatus::EndOfStream {
                break;
            }
            stats.packets_read += 1;
            match table.route(&packet) {
                Route::Decoder(stream) => {
                    table.decode(stream, &packet, &mut |stream, frame: &Frame| {
                        delivery.offer(stream, frame)
                    })?;
                }
                Route::Skip => stats.packets_skipped += 1,
            }
            packet.unref();
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("session", &self.session)
            .field("kinds", &self.kinds)
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .finish()
    }
}
