use super::{
    ContainerInfo, Demuxer, DemuxerFactory, FormatRegistry, PacketCursor, Program, ReadStatus,
    Stream,
};
use crate::av::{MediaKind, Metadata, Packet};
use crate::config::Config;
use crate::io::{FileSource, IoContext, SourceBinding};
use crate::logging::{self, Logger};
use crate::{AvError, Result};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How far [`ContainerSession::probe_streams`] may read ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeBudget {
    /// Maximum packets buffered
    pub max_packets: usize,
    /// Maximum payload bytes buffered
    pub max_bytes: usize,
}

impl ProbeBudget {
    /// The budget configured by `probe_packets` and `probe_bytes`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_packets: config.probe_packets,
            max_bytes: config.probe_bytes,
        }
    }
}

impl Default for ProbeBudget {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct Active {
    io: IoContext,
    demuxer: Box<dyn Demuxer>,
}

/// An opened container: its stream inventory plus the demuxer reading it.
///
/// The stream list is fixed once [`open`](Self::open) returns. Packets are
/// read through [`cursor`](Self::cursor).
pub struct ContainerSession {
    active: Option<Active>,
    resource: String,
    format_name: &'static str,
    info: ContainerInfo,
    logger: Logger,
    /// Packets read ahead by `probe_streams`, replayed first
    buffered: VecDeque<Packet>,
    /// The demuxer reported end of stream while probing
    demuxer_done: bool,
    /// The cursor handed out `EndOfStream`
    exhausted: bool,
    reading: bool,
}

impl ContainerSession {
    /// Opens a container with the built-in formats.
    ///
    /// `hint` names a format or file extension and skips content detection.
    pub fn open(
        source: SourceBinding,
        hint: Option<&str>,
        config: &Config,
        logger: Logger,
    ) -> Result<Self> {
        Self::open_with(&FormatRegistry::with_builtin(), source, hint, config, logger)
    }

    /// Opens a file. Without a hint, content detection runs first and the
    /// file extension is the fallback.
    pub fn open_path(
        path: impl AsRef<Path>,
        hint: Option<&str>,
        config: &Config,
        logger: Logger,
    ) -> Result<Self> {
        let path = path.as_ref();
        let source = FileSource::open(path)?;
        let registry = FormatRegistry::with_builtin();
        let mut io = IoContext::new(SourceBinding::owned(source)).with_chunk_size(config.io_buffer_size);
        let factory = match hint {
            Some(hint) => resolve_hint(&registry, hint, io.name())?,
            None => match detect(&registry, &mut io, config, &logger)? {
                Some(factory) => factory,
                None => path
                    .extension()
                    .and_then(|ext| registry.find(&ext.to_string_lossy()))
                    .ok_or_else(|| unknown_container(io.name()))?,
            },
        };
        Self::start(factory, io, config, logger)
    }

    /// Opens a container with the formats of `registry`.
    pub fn open_with(
        registry: &FormatRegistry,
        source: SourceBinding,
        hint: Option<&str>,
        config: &Config,
        logger: Logger,
    ) -> Result<Self> {
        let mut io = IoContext::new(source).with_chunk_size(config.io_buffer_size);
        let factory = match hint {
            Some(hint) => resolve_hint(registry, hint, io.name())?,
            None => detect(registry, &mut io, config, &logger)?
                .ok_or_else(|| unknown_container(io.name()))?,
        };
        Self::start(factory, io, config, logger)
    }

    fn start(
        factory: Arc<dyn DemuxerFactory>,
        mut io: IoContext,
        config: &Config,
        logger: Logger,
    ) -> Result<Self> {
        let resource = io.name().to_string();
        io.rewind().map_err(|e| e.with_resource(&resource))?;

        let mut demuxer = factory.create(config, &logger);
        let info = demuxer
            .read_header(&mut io)
            .map_err(|e| e.with_resource(&resource))?;
        for (i, stream) in info.streams.iter().enumerate() {
            if stream.index != i {
                return Err(AvError::format(format!(
                    "{resource}: stream {i} reported index {}",
                    stream.index
                )));
            }
        }

        logging::av_info!(
            logger,
            "Opened {} as {} with {} stream(s)",
            resource,
            factory.name(),
            info.streams.len()
        );
        for stream in &info.streams {
            logging::av_debug!(
                logger,
                "  stream {}: {} {} time base {}",
                stream.index,
                stream.kind,
                stream.params.codec_id,
                stream.time_base
            );
        }

        Ok(Self {
            active: Some(Active { io, demuxer }),
            resource,
            format_name: factory.name(),
            info,
            logger,
            buffered: VecDeque::new(),
            demuxer_done: false,
            exhausted: false,
            reading: false,
        })
    }

    /// Reads packets ahead until every stream has complete parameters or the
    /// budget runs out. Only parameters that are still unknown get filled.
    ///
    /// Must be called before the first packet is read.
    pub fn probe_streams(&mut self, budget: ProbeBudget) -> Result<()> {
        if self.reading {
            return Err(AvError::contract(
                "probe_streams called after packets were read",
            ));
        }
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| AvError::contract("probe_streams on a closed session"))?;

        let mut bytes = self.buffered.iter().map(Packet::len).sum::<usize>();
        while !self.demuxer_done
            && self.buffered.len() < budget.max_packets
            && bytes < budget.max_bytes
            && self.info.streams.iter().any(|s| !s.params.is_complete())
        {
            let mut packet = Packet::new();
            let status = active
                .demuxer
                .read_packet(&mut active.io, &mut packet)
                .map_err(|e| e.with_resource(&self.resource))?;
            if status == ReadStatus::EndOfStream {
                self.demuxer_done = true;
                break;
            }
            let stream = self.info.streams.get_mut(packet.stream_index).ok_or_else(|| {
                AvError::format(format!(
                    "{}: packet for unknown stream {}",
                    self.resource, packet.stream_index
                ))
            })?;
            if !stream.params.is_complete() {
                if let Some(learned) = active.demuxer.refine(stream, &packet) {
                    stream.params.fill_missing(&learned);
                    logging::av_debug!(
                        self.logger,
                        "Refined stream {} ({}) from packet at pts {:?}",
                        stream.index,
                        stream.params.codec_id,
                        packet.pts
                    );
                }
            }
            bytes += packet.len();
            self.buffered.push_back(packet);
        }

        for stream in self.info.streams.iter().filter(|s| !s.params.is_complete()) {
            logging::av_warn!(
                self.logger,
                "Stream {} ({}) still incomplete after probing {} packet(s)",
                stream.index,
                stream.params.codec_id,
                self.buffered.len()
            );
        }
        Ok(())
    }

    /// A cursor over the packets of this session.
    pub fn cursor(&mut self) -> PacketCursor<'_> {
        PacketCursor::new(self)
    }

    pub(crate) fn read_next(&mut self, packet: &mut Packet) -> Result<ReadStatus> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| AvError::contract("read from a closed session"))?;
        if self.exhausted {
            return Err(AvError::contract("read after end of stream"));
        }
        if !packet.is_unreferenced() {
            return Err(AvError::contract(
                "packet must be unreferenced before it is read into",
            ));
        }
        self.reading = true;

        if let Some(probed) = self.buffered.pop_front() {
            packet.fill_from(&probed);
            return Ok(ReadStatus::Populated);
        }
        if self.demuxer_done {
            self.exhausted = true;
            return Ok(ReadStatus::EndOfStream);
        }

        let status = active
            .demuxer
            .read_packet(&mut active.io, packet)
            .map_err(|e| e.with_resource(&self.resource))?;
        match status {
            ReadStatus::EndOfStream => {
                self.exhausted = true;
                logging::av_debug!(self.logger, "End of stream on {}", self.resource);
            }
            ReadStatus::Populated if packet.stream_index >= self.info.streams.len() => {
                return Err(AvError::format(format!(
                    "{}: packet for unknown stream {}",
                    self.resource, packet.stream_index
                )));
            }
            ReadStatus::Populated => {}
        }
        Ok(status)
    }

    /// Releases the demuxer and the bound source. A shared source stays
    /// usable by its other holders. Closing twice is a contract violation.
    pub fn close(&mut self) -> Result<()> {
        let active = self
            .active
            .take()
            .ok_or_else(|| AvError::contract(format!("{} already closed", self.resource)))?;
        drop(active.demuxer);
        drop(active.io.into_binding());
        self.buffered.clear();
        logging::av_debug!(self.logger, "Closed {}", self.resource);
        Ok(())
    }

    /// Returns true once [`close`](Self::close) succeeded.
    pub fn is_closed(&self) -> bool {
        self.active.is_none()
    }

    /// Description of the bound source.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Name of the demuxer that opened the container.
    pub fn format_name(&self) -> &'static str {
        self.format_name
    }

    /// Streams in index order.
    pub fn streams(&self) -> &[Stream] {
        &self.info.streams
    }

    /// Stream `index`, if it exists.
    pub fn stream(&self, index: usize) -> Option<&Stream> {
        self.info.streams.get(index)
    }

    /// Container-level tags.
    pub fn metadata(&self) -> &Metadata {
        &self.info.metadata
    }

    /// Programs, for containers that group streams (transport streams).
    pub fn programs(&self) -> &[Program] {
        &self.info.programs
    }

    /// The preferred stream of `kind`: the first with complete parameters,
    /// else the first of that kind.
    pub fn best_stream(&self, kind: MediaKind) -> Option<usize> {
        let mut candidates = self.info.streams.iter().filter(|s| s.kind == kind);
        let first = candidates.clone().next()?;
        Some(
            candidates
                .find(|s| s.params.is_complete())
                .unwrap_or(first)
                .index,
        )
    }

    /// Container duration, else the longest stream duration.
    pub fn duration(&self) -> Option<Duration> {
        self.info.duration.or_else(|| {
            self.info
                .streams
                .iter()
                .filter_map(Stream::duration_time)
                .max()
        })
    }
}

impl Drop for ContainerSession {
    fn drop(&mut self) {
        if self.active.take().is_some() {
            logging::av_trace!(self.logger, "Dropped open session {}", self.resource);
        }
    }
}

impl std::fmt::Debug for ContainerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerSession")
            .field("resource", &self.resource)
            .field("format", &self.format_name)
            .field("streams", &self.info.streams.len())
            .field("closed", &self.active.is_none())
            .finish()
    }
}

fn resolve_hint(
    registry: &FormatRegistry,
    hint: &str,
    resource: &str,
) -> Result<Arc<dyn DemuxerFactory>> {
    registry
        .find(hint)
        .ok_or_else(|| AvError::format(format!("{resource}: no demuxer named {hint:?}")))
}

fn detect(
    registry: &FormatRegistry,
    io: &mut IoContext,
    config: &Config,
    logger: &Logger,
) -> Result<Option<Arc<dyn DemuxerFactory>>> {
    let resource = io.name().to_string();
    let window = io
        .probe(config.probe_window)
        .map_err(|e| e.with_resource(&resource))?;
    let found = registry.detect(window);
    if let Some((factory, score)) = &found {
        logging::av_debug!(
            logger,
            "Detected {} in {} (score {}, {} byte window)",
            factory.name(),
            resource,
            score,
            window.len()
        );
    }
    Ok(found.map(|(factory, _)| factory))
}

fn unknown_container(resource: &str) -> AvError {
    AvError::format(format!("{resource}: unrecognized container"))
}
