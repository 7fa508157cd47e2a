use super::color::{self, ColorModel};
use crate::av::{Frame, FrameFormat, PixelFormat, DEFAULT_ALIGN};
use crate::{AvError, Result};
use std::fmt;

/// Interpolation used when the geometry changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScaleAlgorithm {
    /// Nearest source pixel
    Point,
    /// Weighted average of the four nearest source pixels
    #[default]
    Bilinear,
}

/// Width, height and pixel format of a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
}

impl Geometry {
    /// Builds a geometry from its parts.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// Geometry of an allocated video frame.
    pub fn of(frame: &Frame) -> Option<Self> {
        match frame.format()? {
            FrameFormat::Video {
                width,
                height,
                format,
            } => Some(Self::new(width, height, format)),
            FrameFormat::Audio { .. } => None,
        }
    }

    /// The frame format of a picture with this geometry.
    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat::video(self.width, self.height, self.format)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

/// Where one channel of a pixel lives inside a frame.
#[derive(Debug, Clone, Copy)]
struct Channel {
    plane: usize,
    offset: usize,
    step: usize,
    shift: (u32, u32),
}

impl Channel {
    const fn packed(offset: usize, step: usize) -> Option<Self> {
        Some(Self {
            plane: 0,
            offset,
            step,
            shift: (0, 0),
        })
    }
}

/// Channels in model order; the fourth is alpha.
#[derive(Debug, Clone, Copy)]
struct Layout {
    model: ColorModel,
    channels: [Option<Channel>; 4],
}

fn layout(format: PixelFormat) -> Layout {
    let shift = format.chroma_shift();
    let chroma = |plane, offset, step| {
        Some(Channel {
            plane,
            offset,
            step,
            shift,
        })
    };
    let (model, channels) = match format {
        PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => (
            ColorModel::Yuv,
            [Channel::packed(0, 1), chroma(1, 0, 1), chroma(2, 0, 1), None],
        ),
        PixelFormat::Nv12 => (
            ColorModel::Yuv,
            [Channel::packed(0, 1), chroma(1, 0, 2), chroma(1, 1, 2), None],
        ),
        PixelFormat::Gray8 => (ColorModel::Gray, [Channel::packed(0, 1), None, None, None]),
        PixelFormat::Rgb24 => (
            ColorModel::Rgb,
            [Channel::packed(0, 3), Channel::packed(1, 3), Channel::packed(2, 3), None],
        ),
        PixelFormat::Bgr24 => (
            ColorModel::Rgb,
            [Channel::packed(2, 3), Channel::packed(1, 3), Channel::packed(0, 3), None],
        ),
        PixelFormat::Rgba => (
            ColorModel::Rgb,
            [
                Channel::packed(0, 4),
                Channel::packed(1, 4),
                Channel::packed(2, 4),
                Channel::packed(3, 4),
            ],
        ),
        PixelFormat::Bgra => (
            ColorModel::Rgb,
            [
                Channel::packed(2, 4),
                Channel::packed(1, 4),
                Channel::packed(0, 4),
                Channel::packed(3, 4),
            ],
        ),
    };
    Layout { model, channels }
}

/// Source indices and the weight (0..=256) of the second one.
#[derive(Debug, Clone, Copy)]
struct Tap {
    first: usize,
    second: usize,
    weight: u32,
}

/// Taps for every destination position along one axis, for a source plane
/// subsampled by `shift`.
fn taps(src_len: u32, dst_len: u32, shift: u32, algorithm: ScaleAlgorithm) -> Vec<Tap> {
    let plane_len = ((src_len as usize + (1 << shift) - 1) >> shift).max(1);
    let last = plane_len - 1;
    let ratio = f64::from(src_len) / f64::from(dst_len);
    (0..dst_len)
        .map(|d| {
            let luma = (f64::from(d) + 0.5) * ratio - 0.5;
            let pos = (luma + 0.5) / f64::from(1u32 << shift) - 0.5;
            match algorithm {
                ScaleAlgorithm::Point => {
                    let index = ((pos + 0.5).floor().max(0.0) as usize).min(last);
                    Tap {
                        first: index,
                        second: index,
                        weight: 0,
                    }
                }
                ScaleAlgorithm::Bilinear if pos <= 0.0 => Tap {
                    first: 0,
                    second: 0,
                    weight: 0,
                },
                ScaleAlgorithm::Bilinear => {
                    let base = pos.floor();
                    let first = (base as usize).min(last);
                    Tap {
                        first,
                        second: (first + 1).min(last),
                        weight: ((pos - base) * 256.0).round() as u32,
                    }
                }
            }
        })
        .collect()
}

fn lerp(a: u8, b: u8, weight: u32) -> u32 {
    (u32::from(a) * (256 - weight) + u32::from(b) * weight + 128) >> 8
}

/// Converts pictures between two fixed geometries.
///
/// Every supported pixel format can be converted to every other one; YUV
/// and RGB meet through BT.601 limited-range coefficients, gray is treated
/// as full-range luminance. Chroma is upsampled by the chosen algorithm and
/// downsampled by averaging.
pub struct Scaler {
    src: Geometry,
    dst: Geometry,
    algorithm: ScaleAlgorithm,
    src_layout: Layout,
    dst_layout: Layout,
    /// Horizontal and vertical taps, indexed by the log2 subsampling factor
    taps_x: [Vec<Tap>; 2],
    taps_y: [Vec<Tap>; 2],
    /// Destination pixels in the destination color model, full resolution
    pixels: Vec<[u8; 4]>,
}

impl Scaler {
    /// Builds a scaler from `src` to `dst`. Empty geometries are a contract violation.
    pub fn new(src: Geometry, dst: Geometry, algorithm: ScaleAlgorithm) -> Result<Self> {
        for geometry in [src, dst] {
            if geometry.width == 0 || geometry.height == 0 {
                return Err(AvError::contract(format!(
                    "cannot scale with empty geometry {geometry}"
                )));
            }
        }
        Ok(Self {
            src,
            dst,
            algorithm,
            src_layout: layout(src.format),
            dst_layout: layout(dst.format),
            taps_x: [0, 1].map(|s| taps(src.width, dst.width, s, algorithm)),
            taps_y: [0, 1].map(|s| taps(src.height, dst.height, s, algorithm)),
            pixels: vec![[0; 4]; dst.width as usize * dst.height as usize],
        })
    }

    /// Input geometry.
    pub fn source(&self) -> Geometry {
        self.src
    }

    /// Output geometry.
    pub fn destination(&self) -> Geometry {
        self.dst
    }

    /// Interpolation used.
    pub fn algorithm(&self) -> ScaleAlgorithm {
        self.algorithm
    }

    /// A frame allocated for the output geometry.
    pub fn prepare_destination(&self) -> Result<Frame> {
        let mut frame = Frame::new();
        frame.allocate(self.dst.frame_format(), DEFAULT_ALIGN)?;
        Ok(frame)
    }

    /// Scales `src` into `dst` and returns the number of rows produced.
    ///
    /// An empty `dst` is allocated first. A `dst` that already carries a
    /// different format, or a `src` that does not match the input geometry,
    /// is a contract violation.
    pub fn scale(&mut self, src: &Frame, dst: &mut Frame) -> Result<usize> {
        if src.format() != Some(self.src.frame_format()) || !src.is_allocated() {
            return Err(AvError::contract(format!(
                "source frame {:?} does not match scaler input {}",
                src.format(),
                self.src
            )));
        }
        let target = self.dst.frame_format();
        match dst.format() {
            Some(format) if format != target => {
                return Err(AvError::contract(format!(
                    "destination frame {format:?} does not match scaler output {}",
                    self.dst
                )));
            }
            Some(_) if dst.is_allocated() => dst.make_writable()?,
            _ => dst.allocate(target, DEFAULT_ALIGN)?,
        }

        self.sample(src)?;
        self.store(dst)?;
        dst.pts = src.pts;
        dst.time_base = src.time_base;
        dst.keyframe = src.keyframe;
        Ok(self.dst.height as usize)
    }

    /// Fills `pixels` from the source frame.
    fn sample(&mut self, src: &Frame) -> Result<()> {
        let mut planes = Vec::with_capacity(src.plane_count());
        for index in 0..src.plane_count() {
            let data = src
                .plane(index)
                .ok_or_else(|| AvError::contract(format!("source plane {index} is missing")))?;
            planes.push((data, src.linesize(index)));
        }

        let width = self.dst.width as usize;
        for (i, pixel) in self.pixels.iter_mut().enumerate() {
            let (x, y) = (i % width, i / width);
            let mut value = [0, 0, 0, 255];
            for (slot, channel) in value.iter_mut().zip(&self.src_layout.channels) {
                let Some(ch) = channel else { continue };
                let tx = self.taps_x[ch.shift.0 as usize][x];
                let ty = self.taps_y[ch.shift.1 as usize][y];
                let (data, linesize) = planes[ch.plane];
                let at = |row: usize, col: usize| data[row * linesize + col * ch.step + ch.offset];
                *slot = if tx.weight == 0 && ty.weight == 0 {
                    at(ty.first, tx.first)
                } else {
                    let top = lerp(at(ty.first, tx.first), at(ty.first, tx.second), tx.weight);
                    let bottom = lerp(at(ty.second, tx.first), at(ty.second, tx.second), tx.weight);
                    lerp(top as u8, bottom as u8, ty.weight) as u8
                };
            }
            *pixel = color::convert(value, self.src_layout.model, self.dst_layout.model);
        }
        Ok(())
    }

    /// Writes `pixels` into the destination planes, averaging subsampled
    /// chroma over the pixels each sample covers.
    fn store(&self, dst: &mut Frame) -> Result<()> {
        let (width, height) = (self.dst.width as usize, self.dst.height as usize);
        for (index, channel) in self.dst_layout.channels.iter().enumerate() {
            let Some(ch) = channel else { continue };
            let linesize = dst.linesize(ch.plane);
            let plane = dst.plane_mut(ch.plane)?;
            let (sx, sy) = (ch.shift.0 as usize, ch.shift.1 as usize);
            let cols = (width + (1 << sx) - 1) >> sx;
            let rows = (height + (1 << sy) - 1) >> sy;
            for cy in 0..rows {
                for cx in 0..cols {
                    let xs = (cx << sx)..((cx + 1) << sx).min(width);
                    let ys = (cy << sy)..((cy + 1) << sy).min(height);
                    let count = (xs.len() * ys.len()) as u32;
                    let sum: u32 = ys
                        .flat_map(|y| xs.clone().map(move |x| (x, y)))
                        .map(|(x, y)| u32::from(self.pixels[y * width + x][index]))
                        .sum();
                    plane[cy * linesize + cx * ch.step + ch.offset] = ((sum + count / 2) / count) as u8;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Scaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scaler")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}
