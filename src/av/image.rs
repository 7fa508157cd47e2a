//! Only lossless 8-bit formats with an exact `image` counterpart are bridged:
//!
//! | [`PixelFormat`] | [`DynamicImage`]  |
//! |-----------------|-------------------|
//! | `Gray8`         | `ImageLuma8`      |
//! | `Rgb24`         | `ImageRgb8`       |
//! | `Rgba`          | `ImageRgba8`      |
//!
//! Anything else fails with [`AvError::UnsupportedFormat`] instead of being
//! guessed; convert with a [`crate::transform::Scaler`] first.

use super::{Frame, FrameFormat, PixelFormat};
use crate::{AvError, Result};
use ::image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;

fn unsupported(what: impl std::fmt::Display) -> AvError {
    AvError::UnsupportedFormat(format!("no image mapping for {what}"))
}

impl Frame {
    /// Copies the pixels of a Gray8, Rgb24 or Rgba frame into a pixel grid.
    pub fn to_image(&self) -> Result<DynamicImage> {
        let format = match self.format() {
            Some(FrameFormat::Video { format, .. }) => format,
            Some(FrameFormat::Audio { .. }) => return Err(unsupported("audio frames")),
            None => return Err(AvError::contract("frame has no declared format")),
        };
        let (width, height) = (self.width(), self.height());
        let mut pixels = Vec::with_capacity(format.image_size(width, height).unwrap_or(0));
        for y in 0..height as usize {
            let row = self
                .row(0, y)
                .ok_or_else(|| AvError::contract("frame has no allocated memory"))?;
            pixels.extend_from_slice(row);
        }
        let short = || AvError::contract("frame rows do not cover the declared geometry");
        let image = match format {
            PixelFormat::Gray8 => {
                DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, pixels).ok_or_else(short)?)
            }
            PixelFormat::Rgb24 => {
                DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, pixels).ok_or_else(short)?)
            }
            PixelFormat::Rgba => {
                DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, pixels).ok_or_else(short)?)
            }
            other => return Err(unsupported(other)),
        };
        Ok(image)
    }

    /// Builds a frame from a Luma8, Rgb8 or Rgba8 image, rows aligned to `align`.
    pub fn from_image(image: &DynamicImage, align: usize) -> Result<Frame> {
        let mut frame = Frame::new();
        frame.fill_from_image(image, align)?;
        Ok(frame)
    }

    /// Reallocates this frame to the image geometry and copies its pixels.
    pub fn fill_from_image(&mut self, image: &DynamicImage, align: usize) -> Result<()> {
        let format = match image {
            DynamicImage::ImageLuma8(_) => PixelFormat::Gray8,
            DynamicImage::ImageRgb8(_) => PixelFormat::Rgb24,
            DynamicImage::ImageRgba8(_) => PixelFormat::Rgba,
            other => return Err(unsupported(format!("{:?}", other.color()))),
        };
        let (width, height) = (image.width(), image.height());
        self.allocate(FrameFormat::video(width, height, format), align)?;
        let row_bytes = width as usize * format.bytes_per_pixel();
        let pixels = image.as_bytes();
        for y in 0..height as usize {
            self.row_mut(0, y)?
                .copy_from_slice(&pixels[y * row_bytes..(y + 1) * row_bytes]);
        }
        Ok(())
    }
}

/// Decodes a PNG file held in memory.
pub fn decode_png(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(::image::load_from_memory_with_format(bytes, ImageFormat::Png)?)
}

/// Encodes an image as PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{Luma, Rgb, Rgba};
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_rgb_round_trip() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(5, 3, |x, y| {
            Rgb([x as u8, y as u8, (x * y) as u8])
        }));
        let frame = Frame::from_image(&image, 32).unwrap();
        assert_eq!(frame.pixel_format(), Some(PixelFormat::Rgb24));
        assert_eq!(frame.linesize(0), 32);
        assert_eq!(frame.to_image().unwrap(), image);
    }

    #[test]
    fn test_unsupported_formats_fail_closed() {
        let mut frame = Frame::new();
        frame
            .allocate(FrameFormat::video(4, 4, PixelFormat::Yuv420p), 1)
            .unwrap();
        assert!(matches!(
            frame.to_image(),
            Err(AvError::UnsupportedFormat(_))
        ));

        let image = DynamicImage::ImageLumaA8(::image::GrayAlphaImage::new(2, 2));
        assert!(matches!(
            Frame::from_image(&image, 1),
            Err(AvError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_png_round_trip() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4])));
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(decode_png(&png).unwrap(), image);
        assert!(decode_png(b"not a png").is_err());
    }

    #[quickcheck]
    fn prop_gray_round_trip(pixels: Vec<u8>, width: u8, align: u8) -> bool {
        let width = (width as u32 % 16) + 1;
        let height = (pixels.len() as u32 / width).max(1);
        let image = DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
            Luma([pixels.get((y * width + x) as usize).copied().unwrap_or(0)])
        }));
        let frame = Frame::from_image(&image, 1 << (align % 6)).unwrap();
        frame.to_image().unwrap() == image
    }
}
