//! # Decoders
//!
//! A [`Decoder`] turns packets of one stream into frames through a
//! send/receive protocol. Flow control is part of the result type, not the
//! error type:
//!
//! - [`SendStatus::Busy`]: output is pending, receive frames and send the same
//!   packet again
//! - [`ReceiveStatus::NeedsMoreInput`]: nothing to output until the next packet
//! - [`ReceiveStatus::EndOfStream`]: the decoder was flushed and is empty
//!
//! [`DecoderTable`] keeps one decoder per stream and drives that protocol.
//! The built-in backend decodes uncompressed video (`rawvideo`) and PCM
//! audio. For compressed codecs avpipe only parses headers ([`aac`],
//! [`h264`], [`mpeg_audio`]) so streams can be described.

pub mod aac;
pub mod h264;
pub mod mpeg_audio;
mod pcm;
mod raw;
mod table;

pub use table::{DecoderState, DecoderStats, DecoderTable, Route};

use crate::av::{CodecId, CodecParameters, Frame, Packet, Rational};
use crate::config::Config;
use crate::Result;
use std::fmt;
use std::sync::Arc;

/// Outcome of [`Decoder::send_packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The packet was taken
    Accepted,
    /// Output must be received before the packet can be taken
    Busy,
}

/// Outcome of [`Decoder::receive_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// The frame was filled
    Produced,
    /// Send another packet first
    NeedsMoreInput,
    /// Flushed and fully drained
    EndOfStream,
}

/// Settings shared by the decoders of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Line size alignment of produced video frames
    pub frame_alignment: usize,
    /// Packets a video decoder queues before reporting `Busy`
    pub queue_depth: usize,
    /// Maximum samples per produced audio frame
    pub audio_frame_samples: usize,
}

impl DecoderOptions {
    /// Options taken from a [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_alignment: config.frame_alignment,
            queue_depth: config.decoder_queue_depth.max(1),
            audio_frame_samples: config.audio_frame_samples.max(1),
        }
    }
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A stateful packet-to-frame converter for one stream.
pub trait Decoder: Send {
    /// Offers a packet; `None` starts flushing.
    fn send_packet(&mut self, packet: Option<&Packet>) -> Result<SendStatus>;

    /// Fills `frame` with the next decoded frame. The frame's memory is reused
    /// when its layout already matches and it is not shared.
    fn receive_frame(&mut self, frame: &mut Frame) -> Result<ReceiveStatus>;
}

/// Creates decoders for the codecs it supports.
pub trait DecoderFactory: Send + Sync {
    /// Short name, for logs.
    fn name(&self) -> &'static str;

    /// Returns true if [`create`](Self::create) accepts `codec`.
    fn supports(&self, codec: CodecId) -> bool;

    /// Creates a decoder for a stream. Frames carry `time_base`.
    fn create(
        &self,
        params: &CodecParameters,
        time_base: Rational,
        options: &DecoderOptions,
    ) -> Result<Box<dyn Decoder>>;
}

/// The decoders available to a [`DecoderTable`].
#[derive(Clone)]
pub struct CodecRegistry {
    factories: Vec<Arc<dyn DecoderFactory>>,
}

impl CodecRegistry {
    /// A registry without any decoder.
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Raw video and PCM.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(raw::RawVideoFactory));
        registry.register(Arc::new(pcm::PcmFactory));
        registry
    }

    /// Adds a factory. Later registrations take precedence.
    pub fn register(&mut self, factory: Arc<dyn DecoderFactory>) {
        self.factories.push(factory);
    }

    /// The newest factory supporting `codec`.
    pub fn find(&self, codec: CodecId) -> Option<Arc<dyn DecoderFactory>> {
        self.factories.iter().rev().find(|f| f.supports(codec)).cloned()
    }

    /// Factory names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
