use super::{CodecRegistry, Decoder, DecoderFactory, DecoderOptions, ReceiveStatus, SendStatus};
use crate::av::{CodecParameters, Frame, MediaKind, Packet, Rational};
use crate::format::{ContainerSession, Stream};
use crate::logging::{self, Logger};
use crate::{AvError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where a packet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// To the decoder of this stream index
    Decoder(usize),
    /// Nowhere: the stream has no registered decoder
    Skip,
}

/// Lifecycle of one decoder.
///
/// ```text
/// Idle --send--> Sent --receive--> Draining --NeedsMoreInput--> Idle
///                  \--Busy--> Draining
/// any --send(None)--> Flushing --EndOfStream--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Registered but not opened, or waiting for input
    Idle,
    /// A packet was accepted and output may be pending
    Sent,
    /// Frames are being received
    Draining,
    /// The flush packet was sent
    Flushing,
    /// End of stream was observed; the decoder takes nothing more
    Closed,
}

/// Per-decoder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Packets accepted
    pub packets: u64,
    /// Frames produced
    pub frames: u64,
    /// Times `EndOfStream` was observed
    pub end_of_stream: u64,
}

struct Slot {
    params: CodecParameters,
    time_base: Rational,
    factory: Arc<dyn DecoderFactory>,
    decoder: Option<Box<dyn Decoder>>,
    state: DecoderState,
    stats: DecoderStats,
}

/// One decoder per registered stream, driven through the send/receive
/// protocol.
///
/// Frames handed to callbacks live in a scratch frame owned by the table and
/// are overwritten by the next frame; clone them to keep them.
pub struct DecoderTable {
    registry: CodecRegistry,
    logger: Logger,
    slots: BTreeMap<usize, Slot>,
    scratch: Frame,
}

impl DecoderTable {
    /// Creates an empty table that opens decoders from `registry`.
    pub fn new(registry: CodecRegistry, logger: Logger) -> Self {
        Self {
            registry,
            logger,
            slots: BTreeMap::new(),
            scratch: Frame::new(),
        }
    }

    /// Registers a decoder for `stream`. Frames carry a microsecond time
    /// base; use [`register_stream`](Self::register_stream) to keep the
    /// container's.
    pub fn register(&mut self, stream: usize, params: &CodecParameters) -> Result<()> {
        self.register_with_time_base(stream, params, Rational::MICROS)
    }

    /// Registers a decoder for a container stream, keeping its time base.
    pub fn register_stream(&mut self, stream: &Stream) -> Result<()> {
        self.register_with_time_base(stream.index, &stream.params, stream.time_base)
    }

    fn register_with_time_base(
        &mut self,
        stream: usize,
        params: &CodecParameters,
        time_base: Rational,
    ) -> Result<()> {
        if self.slots.contains_key(&stream) {
            return Err(AvError::contract(format!(
                "stream {stream} is already registered"
            )));
        }
        let factory = self
            .registry
            .find(params.codec_id)
            .ok_or(AvError::UnsupportedCodec(params.codec_id))?;
        logging::av_debug!(
            self.logger,
            "Stream {stream}: {} via {}",
            params.codec_id,
            factory.name()
        );
        self.slots.insert(
            stream,
            Slot {
                params: params.clone(),
                time_base,
                factory,
                decoder: None,
                state: DecoderState::Idle,
                stats: DecoderStats::default(),
            },
        );
        Ok(())
    }

    /// Registers every stream of `session` whose kind is in `kinds` (all
    /// kinds when empty) and that has a decoder. Returns how many were
    /// registered.
    pub fn register_all(&mut self, session: &ContainerSession, kinds: &[MediaKind]) -> Result<usize> {
        let mut registered = 0;
        for stream in session.streams() {
            if !kinds.is_empty() && !kinds.contains(&stream.kind) {
                continue;
            }
            match self.register_stream(stream) {
                Ok(()) => registered += 1,
                Err(AvError::UnsupportedCodec(codec)) => {
                    logging::av_info!(
                        self.logger,
                        "Stream {} ({codec}) has no decoder, its packets are skipped",
                        stream.index
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(registered)
    }

    /// Instantiates the decoder of a registered stream.
    pub fn open(&mut self, stream: usize, options: &DecoderOptions) -> Result<()> {
        let slot = self.slot_mut(stream)?;
        if slot.decoder.is_some() {
            return Err(AvError::contract(format!("decoder {stream} opened twice")));
        }
        slot.decoder = Some(slot.factory.create(&slot.params, slot.time_base, options)?);
        slot.state = DecoderState::Idle;
        Ok(())
    }

    /// Opens every registered decoder not opened yet.
    pub fn open_all(&mut self, options: &DecoderOptions) -> Result<()> {
        let pending: Vec<usize> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.decoder.is_none())
            .map(|(&index, _)| index)
            .collect();
        for stream in pending {
            self.open(stream, options)?;
        }
        Ok(())
    }

    /// Where a packet goes: its stream's decoder, or nowhere.
    pub fn route(&self, packet: &Packet) -> Route {
        if self.slots.contains_key(&packet.stream_index) {
            Route::Decoder(packet.stream_index)
        } else {
            Route::Skip
        }
    }

    /// Offers a packet to a decoder; `None` flushes it.
    pub fn send(&mut self, stream: usize, packet: Option<&Packet>) -> Result<SendStatus> {
        let slot = self.slot_mut(stream)?;
        if matches!(slot.state, DecoderState::Flushing | DecoderState::Closed) {
            return Err(AvError::contract(format!(
                "send to decoder {stream} in state {:?}",
                slot.state
            )));
        }
        let decoder = slot
            .decoder
            .as_mut()
            .ok_or_else(|| AvError::contract(format!("decoder {stream} is not open")))?;
        let status = decoder.send_packet(packet)?;
        slot.state = match (status, packet) {
            (SendStatus::Accepted, None) => DecoderState::Flushing,
            (SendStatus::Accepted, Some(_)) => {
                slot.stats.packets += 1;
                DecoderState::Sent
            }
            (SendStatus::Busy, _) => DecoderState::Draining,
        };
        Ok(status)
    }

    /// Receives the next frame of a decoder into `frame`.
    pub fn receive(&mut self, stream: usize, frame: &mut Frame) -> Result<ReceiveStatus> {
        let slot = self.slot_mut(stream)?;
        if slot.state == DecoderState::Closed {
            return Err(AvError::contract(format!(
                "receive from closed decoder {stream}"
            )));
        }
        let decoder = slot
            .decoder
            .as_mut()
            .ok_or_else(|| AvError::contract(format!("decoder {stream} is not open")))?;
        let status = decoder.receive_frame(frame)?;
        let flushing = slot.state == DecoderState::Flushing;
        match status {
            ReceiveStatus::Produced => {
                slot.stats.frames += 1;
                if !flushing {
                    slot.state = DecoderState::Draining;
                }
            }
            ReceiveStatus::NeedsMoreInput if !flushing => slot.state = DecoderState::Idle,
            ReceiveStatus::NeedsMoreInput => {}
            ReceiveStatus::EndOfStream => {
                slot.stats.end_of_stream += 1;
                slot.state = DecoderState::Closed;
            }
        }
        Ok(status)
    }

    /// Decodes one packet: sends it, draining output while the decoder is
    /// busy, then drains what the packet produced. Returns the number of
    /// frames passed to `on_frame`.
    pub fn decode<F>(&mut self, stream: usize, packet: &Packet, on_frame: &mut F) -> Result<usize>
    where
        F: FnMut(usize, &Frame) -> Result<()>,
    {
        let mut produced = 0;
        while self.send(stream, Some(packet))? == SendStatus::Busy {
            let drained = self.drain(stream, on_frame)?;
            if drained == 0 {
                return Err(AvError::Codec(format!(
                    "decoder {stream} is busy but produced no frame"
                )));
            }
            produced += drained;
        }
        Ok(produced + self.drain(stream, on_frame)?)
    }

    /// Flushes a decoder and drains it to end of stream.
    pub fn flush<F>(&mut self, stream: usize, on_frame: &mut F) -> Result<usize>
    where
        F: FnMut(usize, &Frame) -> Result<()>,
    {
        let mut produced = 0;
        while self.send(stream, None)? == SendStatus::Busy {
            produced += self.drain(stream, on_frame)?;
        }
        produced += self.drain(stream, on_frame)?;
        if self.state(stream) != Some(DecoderState::Closed) {
            return Err(AvError::Codec(format!(
                "decoder {stream} stalled while flushing"
            )));
        }
        logging::av_debug!(self.logger, "Decoder {stream} flushed");
        Ok(produced)
    }

    /// Flushes every open decoder that is not closed yet, in stream order.
    pub fn flush_all<F>(&mut self, on_frame: &mut F) -> Result<usize>
    where
        F: FnMut(usize, &Frame) -> Result<()>,
    {
        let open: Vec<usize> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.decoder.is_some() && slot.state != DecoderState::Closed)
            .map(|(&index, _)| index)
            .collect();
        let mut produced = 0;
        for stream in open {
            produced += self.flush(stream, on_frame)?;
        }
        Ok(produced)
    }

    /// Receives until the decoder wants input or ends.
    fn drain<F>(&mut self, stream: usize, on_frame: &mut F) -> Result<usize>
    where
        F: FnMut(usize, &Frame) -> Result<()>,
    {
        let mut frame = std::mem::take(&mut self.scratch);
        let mut produced = 0;
        let result = loop {
            match self.receive(stream, &mut frame) {
                Ok(ReceiveStatus::Produced) => {
                    produced += 1;
                    if let Err(e) = on_frame(stream, &frame) {
                        break Err(e);
                    }
                }
                Ok(_) => break Ok(produced),
                Err(e) => break Err(e),
            }
        };
        self.scratch = frame;
        result
    }

    /// Lifecycle state of a registered stream's decoder.
    pub fn state(&self, stream: usize) -> Option<DecoderState> {
        self.slots.get(&stream).map(|slot| slot.state)
    }

    /// Counters of a registered stream's decoder.
    pub fn stats(&self, stream: usize) -> Option<DecoderStats> {
        self.slots.get(&stream).map(|slot| slot.stats)
    }

    /// Indices of registered streams, ascending.
    pub fn streams(&self) -> Vec<usize> {
        self.slots.keys().copied().collect()
    }

    /// Returns true if no stream is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot_mut(&mut self, stream: usize) -> Result<&mut Slot> {
        self.slots
            .get_mut(&stream)
            .ok_or_else(|| AvError::contract(format!("stream {stream} has no registered decoder")))
    }
}

impl std::fmt::Debug for DecoderTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|(index, slot)| (index, slot.state)))
            .finish()
    }
}
