//! # Core media types
//!
//! The vocabulary shared by every stage of the pipeline:
//!
//! - [`Packet`]: compressed payload plus timing, reused across reads
//! - [`Frame`]: decoded (or synthetic) pixel/sample memory with plane layout
//! - [`PixelFormat`], [`SampleFormat`], [`ChannelLayout`]: raw data layouts
//! - [`CodecId`] and [`CodecParameters`]: what a stream carries
//! - [`Rational`]: time bases and frame rates
//! - [`Metadata`]: container/stream/program key-value tags
//!
//! ```rust
//! use avpipe::av::{Frame, FrameFormat, PixelFormat};
//!
//! # fn main() -> avpipe::Result<()> {
//! let mut frame = Frame::new();
//! frame.allocate(FrameFormat::video(320, 240, PixelFormat::Yuv420p), 32)?;
//! assert_eq!(frame.plane_count(), 3);
//! assert_eq!(frame.linesize(0), 320);
//! assert_eq!(frame.linesize(1), 160);
//! # Ok(())
//! # }
//! ```

mod codec;
mod format;
mod frame;
/// Bridges between raw frames and `image` crate pixel grids, plus PNG I/O
pub mod image;
mod metadata;
mod packet;
mod rational;

pub use codec::{AudioParams, CodecId, CodecParameters, MediaParams, VideoParams};
pub use format::{ChannelLayout, MediaKind, PixelFormat, SampleFormat};
pub use frame::{Frame, FrameFormat, PlaneLayout, DEFAULT_ALIGN};
pub use metadata::Metadata;
pub use packet::{Packet, PacketFlags};
pub use rational::Rational;
