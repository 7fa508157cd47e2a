#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # avpipe - synchronous demux, decode and transform
//!
//! `avpipe` reads media from pluggable byte sources, splits containers into
//! packets, decodes them into reusable frames and converts those frames to
//! the geometry, pixel format, sample rate or channel layout a consumer
//! needs. Everything is blocking and single-threaded; sessions, tables and
//! frames are `Send` so they can be moved to a worker thread.
//!
//! ## Features
//!
//! ### Byte sources
//! - Files, in-memory buffers and caller-supplied read/seek callbacks
//! - Sequential sources: probe bytes are replayed after format detection
//! - Directory listing with the same open/iterate/close shape
//!
//! ### Containers
//! - WAV, AVI, YUV4MPEG2 and MPEG transport streams (188 and 192 byte packets)
//! - Stream inventory, programs and metadata
//! - Optional read-ahead probing that completes stream parameters
//!
//! ### Decoding and conversion
//! - Send/receive decoder protocol with explicit flow control
//! - Built-in raw video and PCM decoders, header parsers for AAC, H.264 and
//!   MPEG audio
//! - Scaling and pixel format conversion, audio resampling
//! - PNG import/export through the `image` crate
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avpipe::av::{MediaKind, PixelFormat};
//! use avpipe::config::Config;
//! use avpipe::format::ContainerSession;
//! use avpipe::logging::Logger;
//! use avpipe::pipeline::{Flow, Pipeline};
//! use avpipe::transform::{Geometry, ScaleAlgorithm, Scaler};
//!
//! fn main() -> avpipe::Result<()> {
//!     let config = Config::load()?;
//!     let logger = Logger::global().with_level(config.log_level);
//!     let session = ContainerSession::open_path("clip.y4m", None, &config, logger.clone())?;
//!
//!     let video = session.best_stream(MediaKind::Video).expect("a video stream");
//!     let src = Geometry::new(320, 240, PixelFormat::Yuv420p);
//!     let thumb = Geometry::new(80, 60, PixelFormat::Rgba);
//!     let scaler = Scaler::new(src, thumb, ScaleAlgorithm::Bilinear)?;
//!
//!     let mut pipeline = Pipeline::new(session, config, logger)
//!         .select(&[MediaKind::Video])
//!         .with_scaler(video, scaler);
//!     let stats = pipeline.run(|_stream, frame| {
//!         println!("frame at {:?}", frame.pts);
//!         Ok(Flow::Continue)
//!     })?;
//!     println!("{} frames", stats.frames);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `io`: byte sources and directory listing
//! - `format`: container sessions, packet cursors and demuxers
//! - `codec`: decoder protocol, decoder table and codec header parsers
//! - `av`: packets, frames, formats, codec parameters and image bridges
//! - `transform`: scaler and resampler
//! - `pipeline`: the demux/decode/transform loop
//! - `config`, `logging`, `error`: ambient configuration, injectable
//!   logging and the error type

/// Packets, frames and the formats describing them
pub mod av;

/// Decoders, the decoder table and codec header parsers
pub mod codec;

/// Runtime configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// Container sessions and demuxers
pub mod format;

/// Byte sources
pub mod io;

/// Injectable logging
pub mod logging;

/// The demux/decode/transform loop
pub mod pipeline;

/// Video scaling and audio resampling
pub mod transform;

/// Bitstream and checksum helpers
pub mod utils;

pub use error::{AvError, Result};
