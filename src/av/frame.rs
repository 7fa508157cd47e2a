use super::{ChannelLayout, PixelFormat, Rational, SampleFormat};
use crate::{AvError, Result};
use std::sync::Arc;

/// Line size alignment used when a caller has no preference.
pub const DEFAULT_ALIGN: usize = 32;

/// Geometry and data layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// A pixel grid.
    Video {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// Pixel layout
        format: PixelFormat,
    },
    /// A block of audio samples.
    Audio {
        /// Samples per channel
        samples: usize,
        /// Samples per second
        sample_rate: u32,
        /// Sample encoding
        format: SampleFormat,
        /// Channel arrangement
        layout: ChannelLayout,
    },
}

impl FrameFormat {
    /// Shorthand for [`FrameFormat::Video`].
    pub fn video(width: u32, height: u32, format: PixelFormat) -> Self {
        FrameFormat::Video {
            width,
            height,
            format,
        }
    }

    /// Shorthand for [`FrameFormat::Audio`].
    pub fn audio(
        samples: usize,
        sample_rate: u32,
        format: SampleFormat,
        layout: ChannelLayout,
    ) -> Self {
        FrameFormat::Audio {
            samples,
            sample_rate,
            format,
            layout,
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            FrameFormat::Video { width, height, .. } if width == 0 || height == 0 => Err(
                AvError::contract(format!("invalid video geometry {width}x{height}")),
            ),
            FrameFormat::Audio {
                sample_rate,
                layout,
                ..
            } if sample_rate == 0 || layout.channels() == 0 => Err(AvError::contract(format!(
                "invalid audio format: {sample_rate} Hz, {layout}"
            ))),
            _ => Ok(()),
        }
    }

    /// Visible bytes per row and row count of every plane.
    fn plane_shapes(&self) -> Vec<(usize, usize)> {
        match *self {
            FrameFormat::Video {
                width,
                height,
                format,
            } => (0..format.plane_count())
                .map(|p| format.plane_dimensions(p, width, height))
                .collect(),
            FrameFormat::Audio {
                samples,
                format,
                layout,
                ..
            } => {
                let channels = layout.channels() as usize;
                if format.is_planar() {
                    vec![(samples * format.bytes_per_sample(), 1); channels]
                } else {
                    vec![(samples * channels * format.bytes_per_sample(), 1)]
                }
            }
        }
    }
}

/// Placement of one plane inside a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Offset of the first row in the buffer
    pub offset: usize,
    /// Distance between the starts of two consecutive rows
    pub linesize: usize,
    /// Meaningful bytes per row
    pub row_bytes: usize,
    /// Number of rows
    pub rows: usize,
}

fn check_align(align: usize) -> Result<()> {
    if align == 0 || !align.is_power_of_two() {
        return Err(AvError::contract(format!(
            "alignment must be a power of two, got {align}"
        )));
    }
    Ok(())
}

fn align_up(value: usize, align: usize) -> Option<usize> {
    Some(value.checked_add(align - 1)? & !(align - 1))
}

fn compute_layout(format: &FrameFormat, align: usize) -> Result<(Vec<PlaneLayout>, usize)> {
    check_align(align)?;
    format.validate()?;
    let too_large = || AvError::contract(format!("frame {format:?} does not fit in memory"));
    let mut offset = 0usize;
    let mut planes = Vec::new();
    for (row_bytes, rows) in format.plane_shapes() {
        let linesize = align_up(row_bytes, align).ok_or_else(too_large)?;
        planes.push(PlaneLayout {
            offset,
            linesize,
            row_bytes,
            rows,
        });
        offset = linesize
            .checked_mul(rows)
            .and_then(|size| offset.checked_add(size))
            .ok_or_else(too_large)?;
    }
    Ok((planes, offset))
}

/// Decoded (or synthetic) pixel or sample memory.
///
/// All planes live in one reference-counted buffer. Cloning a frame shares
/// the buffer; [`Frame::make_writable`] gives the frame a private copy before
/// in-place writes. The declared format always matches the buffer layout
/// exactly.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    format: Option<FrameFormat>,
    buffer: Option<Arc<Vec<u8>>>,
    planes: Vec<PlaneLayout>,
    /// Presentation timestamp in `time_base` units
    pub pts: Option<i64>,
    /// Time base of `pts`
    pub time_base: Rational,
    /// Set for frames decoded from keyframe packets
    pub keyframe: bool,
}

impl Frame {
    /// Creates an empty frame without format or memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unallocated audio frame that only describes a desired
    /// output format. Used as the destination of a [`crate::transform::Resampler`].
    pub fn audio_template(sample_rate: u32, format: SampleFormat, layout: ChannelLayout) -> Self {
        Self {
            format: Some(FrameFormat::audio(0, sample_rate, format, layout)),
            ..Self::default()
        }
    }

    /// Allocates zeroed memory for `format` with line sizes rounded up to
    /// `align` bytes. An unshared buffer is reused.
    pub fn allocate(&mut self, format: FrameFormat, align: usize) -> Result<()> {
        let (planes, size) = compute_layout(&format, align)?;
        match self.buffer.as_mut().and_then(Arc::get_mut) {
            Some(buffer) => {
                buffer.clear();
                buffer.resize(size, 0);
            }
            None => self.buffer = Some(Arc::new(vec![0; size])),
        }
        self.planes = planes;
        self.format = Some(format);
        Ok(())
    }

    /// Makes sure the frame holds writable memory for `format`, reallocating
    /// only when the layout changes or the buffer is shared.
    pub(crate) fn ensure_allocated(&mut self, format: FrameFormat, align: usize) -> Result<()> {
        if self.format == Some(format) && self.is_allocated() && self.is_writable() {
            return Ok(());
        }
        self.allocate(format, align)
    }

    /// Releases the memory and clears every field.
    pub fn unref(&mut self) {
        *self = Frame::default();
    }

    /// Declared format, if any.
    pub fn format(&self) -> Option<FrameFormat> {
        self.format
    }

    /// Returns true once memory has been allocated.
    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Returns true if no other frame shares the buffer.
    pub fn is_writable(&self) -> bool {
        self.buffer
            .as_ref()
            .is_some_and(|b| Arc::strong_count(b) == 1 && Arc::weak_count(b) == 0)
    }

    /// Guarantees the buffer is not shared, copying it if needed.
    pub fn make_writable(&mut self) -> Result<()> {
        match self.buffer.as_mut() {
            Some(buffer) => {
                Arc::make_mut(buffer);
                Ok(())
            }
            None => Err(AvError::contract("frame has no allocated memory")),
        }
    }

    /// Width in pixels, 0 for audio or empty frames.
    pub fn width(&self) -> u32 {
        match self.format {
            Some(FrameFormat::Video { width, .. }) => width,
            _ => 0,
        }
    }

    /// Height in pixels, 0 for audio or empty frames.
    pub fn height(&self) -> u32 {
        match self.format {
            Some(FrameFormat::Video { height, .. }) => height,
            _ => 0,
        }
    }

    /// Pixel format of a video frame.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        match self.format {
            Some(FrameFormat::Video { format, .. }) => Some(format),
            _ => None,
        }
    }

    /// Samples per channel, 0 for video or empty frames.
    pub fn samples(&self) -> usize {
        match self.format {
            Some(FrameFormat::Audio { samples, .. }) => samples,
            _ => 0,
        }
    }

    /// Sample rate of an audio frame.
    pub fn sample_rate(&self) -> Option<u32> {
        match self.format {
            Some(FrameFormat::Audio { sample_rate, .. }) => Some(sample_rate),
            _ => None,
        }
    }

    /// Sample format of an audio frame.
    pub fn sample_format(&self) -> Option<SampleFormat> {
        match self.format {
            Some(FrameFormat::Audio { format, .. }) => Some(format),
            _ => None,
        }
    }

    /// Channel layout of an audio frame.
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        match self.format {
            Some(FrameFormat::Audio { layout, .. }) => Some(layout),
            _ => None,
        }
    }

    /// Number of allocated planes.
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Layout of plane `index`.
    pub fn plane_layout(&self, index: usize) -> Option<PlaneLayout> {
        self.planes.get(index).copied()
    }

    /// Line size of plane `index`, 0 if the plane does not exist.
    pub fn linesize(&self, index: usize) -> usize {
        self.planes.get(index).map(|p| p.linesize).unwrap_or(0)
    }

    /// Bytes of plane `index`, including row padding.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let plane = self.planes.get(index)?;
        let buffer = self.buffer.as_ref()?;
        buffer.get(plane.offset..plane.offset + plane.linesize * plane.rows)
    }

    /// Mutable bytes of plane `index`. The frame must be writable.
    pub fn plane_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let plane = *self
            .planes
            .get(index)
            .ok_or_else(|| AvError::contract(format!("plane {index} does not exist")))?;
        let buffer = self.writable_buffer()?;
        Ok(&mut buffer[plane.offset..plane.offset + plane.linesize * plane.rows])
    }

    /// Meaningful bytes of row `y` in plane `index`.
    pub fn row(&self, index: usize, y: usize) -> Option<&[u8]> {
        let plane = self.planes.get(index)?;
        if y >= plane.rows {
            return None;
        }
        let start = plane.offset + y * plane.linesize;
        self.buffer.as_ref()?.get(start..start + plane.row_bytes)
    }

    /// Mutable meaningful bytes of row `y` in plane `index`.
    pub fn row_mut(&mut self, index: usize, y: usize) -> Result<&mut [u8]> {
        let plane = *self
            .planes
            .get(index)
            .ok_or_else(|| AvError::contract(format!("plane {index} does not exist")))?;
        if y >= plane.rows {
            return Err(AvError::contract(format!(
                "row {y} out of range for plane {index} with {} rows",
                plane.rows
            )));
        }
        let start = plane.offset + y * plane.linesize;
        let buffer = self.writable_buffer()?;
        Ok(&mut buffer[start..start + plane.row_bytes])
    }

    /// Sets every meaningful byte of plane `index` to `value`.
    pub fn fill_plane(&mut self, index: usize, value: u8) -> Result<()> {
        let plane = self
            .plane_layout(index)
            .ok_or_else(|| AvError::contract(format!("plane {index} does not exist")))?;
        for y in 0..plane.rows {
            self.row_mut(index, y)?.fill(value);
        }
        Ok(())
    }

    /// Size of the contiguous representation produced by [`Frame::as_bytes`].
    pub fn buffer_size(&self, align: usize) -> Result<usize> {
        let format = self.declared_format()?;
        compute_layout(&format, align).map(|(_, size)| size)
    }

    /// Copies every plane into one contiguous buffer whose rows are padded
    /// to `align` bytes. Padding bytes are zero.
    pub fn as_bytes(&self, align: usize) -> Result<Vec<u8>> {
        let format = self.declared_format()?;
        let (layout, size) = compute_layout(&format, align)?;
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| AvError::contract("frame has no allocated memory"))?;
        let mut out = vec![0u8; size];
        for (dst, src) in layout.iter().zip(&self.planes) {
            for y in 0..src.rows {
                let from = src.offset + y * src.linesize;
                let to = dst.offset + y * dst.linesize;
                out[to..to + src.row_bytes].copy_from_slice(&buffer[from..from + src.row_bytes]);
            }
        }
        Ok(out)
    }

    /// Inverse of [`Frame::as_bytes`]: fills the frame from a contiguous
    /// buffer laid out with `align`. The length must match exactly.
    ///
    /// Only the meaningful bytes of every row are copied. Row padding in
    /// `bytes` is ignored, so `as_bytes(from_bytes(b))` equals `b` only when
    /// the padding of `b` was zero.
    pub fn from_bytes(&mut self, bytes: &[u8], align: usize) -> Result<()> {
        let format = self.declared_format()?;
        let (layout, size) = compute_layout(&format, align)?;
        if bytes.len() != size {
            return Err(AvError::contract(format!(
                "buffer of {} bytes does not match frame layout of {size} bytes",
                bytes.len()
            )));
        }
        if !self.is_allocated() {
            self.allocate(format, DEFAULT_ALIGN)?;
        }
        let planes = self.planes.clone();
        let buffer = self.writable_buffer()?;
        for (src, dst) in layout.iter().zip(&planes) {
            for y in 0..dst.rows {
                let from = src.offset + y * src.linesize;
                let to = dst.offset + y * dst.linesize;
                buffer[to..to + dst.row_bytes].copy_from_slice(&bytes[from..from + dst.row_bytes]);
            }
        }
        Ok(())
    }

    fn declared_format(&self) -> Result<FrameFormat> {
        self.format
            .ok_or_else(|| AvError::contract("frame has no declared format"))
    }

    fn writable_buffer(&mut self) -> Result<&mut Vec<u8>> {
        self.buffer
            .as_mut()
            .ok_or_else(|| AvError::contract("frame has no allocated memory"))
            .and_then(|b| {
                Arc::get_mut(b).ok_or_else(|| {
                    AvError::contract("frame memory is shared; call make_writable first")
                })
            })
    }
}
