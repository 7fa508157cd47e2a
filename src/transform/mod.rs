//! # Frame transforms
//!
//! Stages that sit between a decoder and a consumer:
//!
//! - [`Scaler`]: video geometry and pixel format conversion
//! - [`Resampler`]: audio rate, sample format and channel layout conversion
//!
//! Video conversion is stateless. Audio conversion keeps interpolation state
//! across frames and must be flushed at end of stream.
//!
//! ```rust
//! use avpipe::av::{Frame, FrameFormat, PixelFormat, DEFAULT_ALIGN};
//! use avpipe::transform::{Geometry, ScaleAlgorithm, Scaler};
//!
//! # fn main() -> avpipe::Result<()> {
//! let mut src = Frame::new();
//! src.allocate(FrameFormat::video(64, 48, PixelFormat::Gray8), DEFAULT_ALIGN)?;
//! src.fill_plane(0, 255)?;
//!
//! let mut scaler = Scaler::new(
//!     Geometry::new(64, 48, PixelFormat::Gray8),
//!     Geometry::new(16, 12, PixelFormat::Rgb24),
//!     ScaleAlgorithm::Bilinear,
//! )?;
//! let mut dst = Frame::new();
//! assert_eq!(scaler.scale(&src, &mut dst)?, 12);
//! assert_eq!(&dst.row(0, 0).unwrap()[..3], &[255, 255, 255]);
//! # Ok(())
//! # }
//! ```

mod color;
mod resample;
mod scale;

pub use resample::{AudioSpec, Resampler};
pub use scale::{Geometry, ScaleAlgorithm, Scaler};
