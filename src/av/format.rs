use std::fmt;
use std::str::FromStr;

/// Kind of media carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Video stream
    Video,
    /// Audio stream
    Audio,
    /// Private or timed data (PES private streams, metadata tracks)
    Data,
    /// Anything else
    Other,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Data => "data",
            MediaKind::Other => "other",
        })
    }
}

/// Raw video pixel layouts understood by frames and the scaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar Y, U, V with 2x2 chroma subsampling
    Yuv420p,
    /// Planar Y, U, V with horizontal chroma subsampling
    Yuv422p,
    /// Planar Y, U, V without subsampling
    Yuv444p,
    /// Y plane followed by interleaved U/V at 2x2 subsampling
    Nv12,
    /// Single 8-bit luma plane
    Gray8,
    /// Packed 8-bit R, G, B
    Rgb24,
    /// Packed 8-bit B, G, R
    Bgr24,
    /// Packed 8-bit R, G, B, A
    Rgba,
    /// Packed 8-bit B, G, R, A
    Bgra,
}

impl PixelFormat {
    /// Every supported pixel format.
    pub const ALL: [PixelFormat; 9] = [
        PixelFormat::Yuv420p,
        PixelFormat::Yuv422p,
        PixelFormat::Yuv444p,
        PixelFormat::Nv12,
        PixelFormat::Gray8,
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Rgba,
        PixelFormat::Bgra,
    ];

    /// Number of planes in a frame of this format.
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => 3,
            PixelFormat::Nv12 => 2,
            _ => 1,
        }
    }

    /// Log2 of the horizontal and vertical chroma subsampling factors.
    pub fn chroma_shift(&self) -> (u32, u32) {
        match self {
            PixelFormat::Yuv420p | PixelFormat::Nv12 => (1, 1),
            PixelFormat::Yuv422p => (1, 0),
            _ => (0, 0),
        }
    }

    /// Bytes per pixel of a packed format, or of the luma plane of a planar one.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
            _ => 1,
        }
    }

    /// Returns true for the Y'CbCr family.
    pub fn is_yuv(&self) -> bool {
        matches!(
            self,
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p | PixelFormat::Nv12
        )
    }

    /// Visible bytes per row and number of rows of `plane` for a `width` x `height` image.
    pub fn plane_dimensions(&self, plane: usize, width: u32, height: u32) -> (usize, usize) {
        let (w, h) = (width as usize, height as usize);
        if plane == 0 {
            return (w * self.bytes_per_pixel(), h);
        }
        let (sx, sy) = self.chroma_shift();
        let cw = (w + (1 << sx) - 1) >> sx;
        let ch = (h + (1 << sy) - 1) >> sy;
        match self {
            PixelFormat::Nv12 => (cw * 2, ch),
            _ => (cw, ch),
        }
    }

    /// Tightly packed size of one image in bytes, or `None` when it does not
    /// fit in `usize`.
    pub fn image_size(&self, width: u32, height: u32) -> Option<usize> {
        (0..self.plane_count()).try_fold(0usize, |total, p| {
            let (row, rows) = self.plane_dimensions(p, width, height);
            total.checked_add(row.checked_mul(rows)?)
        })
    }

    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Gray8 => "gray",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = crate::AvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        PixelFormat::ALL
            .iter()
            .copied()
            .find(|f| f.name() == lower || (lower == "gray8" && *f == PixelFormat::Gray8))
            .ok_or_else(|| crate::AvError::UnsupportedFormat(format!("pixel format {s}")))
    }
}

/// Audio sample encodings. The `p` variants store one plane per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit, interleaved
    U8,
    /// Signed 16-bit, interleaved
    S16,
    /// Signed 32-bit, interleaved
    S32,
    /// 32-bit float, interleaved
    F32,
    /// 64-bit float, interleaved
    F64,
    /// Unsigned 8-bit, planar
    U8p,
    /// Signed 16-bit, planar
    S16p,
    /// Signed 32-bit, planar
    S32p,
    /// 32-bit float, planar
    F32p,
    /// 64-bit float, planar
    F64p,
}

impl SampleFormat {
    /// Size of a single sample in bytes.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::U8p => 1,
            SampleFormat::S16 | SampleFormat::S16p => 2,
            SampleFormat::S32 | SampleFormat::S32p | SampleFormat::F32 | SampleFormat::F32p => 4,
            SampleFormat::F64 | SampleFormat::F64p => 8,
        }
    }

    /// Returns true when each channel has its own plane.
    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            SampleFormat::U8p
                | SampleFormat::S16p
                | SampleFormat::S32p
                | SampleFormat::F32p
                | SampleFormat::F64p
        )
    }

    /// The interleaved counterpart.
    pub fn packed(&self) -> SampleFormat {
        match self {
            SampleFormat::U8p => SampleFormat::U8,
            SampleFormat::S16p => SampleFormat::S16,
            SampleFormat::S32p => SampleFormat::S32,
            SampleFormat::F32p => SampleFormat::F32,
            SampleFormat::F64p => SampleFormat::F64,
            other => *other,
        }
    }

    /// The planar counterpart.
    pub fn planar(&self) -> SampleFormat {
        match self {
            SampleFormat::U8 => SampleFormat::U8p,
            SampleFormat::S16 => SampleFormat::S16p,
            SampleFormat::S32 => SampleFormat::S32p,
            SampleFormat::F32 => SampleFormat::F32p,
            SampleFormat::F64 => SampleFormat::F64p,
            other => *other,
        }
    }

    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "flt",
            SampleFormat::F64 => "dbl",
            SampleFormat::U8p => "u8p",
            SampleFormat::S16p => "s16p",
            SampleFormat::S32p => "s32p",
            SampleFormat::F32p => "fltp",
            SampleFormat::F64p => "dblp",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Audio channel arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// One channel
    Mono,
    /// Front left, front right
    Stereo,
    /// Front left/right, back left/right
    Quad,
    /// Front left/right/center, LFE, back left/right
    Surround51,
    /// Any other channel count without positional information
    Unordered(u16),
}

impl ChannelLayout {
    /// Number of channels.
    pub fn channels(&self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Quad => 4,
            ChannelLayout::Surround51 => 6,
            ChannelLayout::Unordered(n) => *n,
        }
    }

    /// Default layout for a channel count.
    pub fn from_channels(channels: u16) -> ChannelLayout {
        match channels {
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::Stereo,
            4 => ChannelLayout::Quad,
            6 => ChannelLayout::Surround51,
            n => ChannelLayout::Unordered(n),
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLayout::Mono => f.write_str("mono"),
            ChannelLayout::Stereo => f.write_str("stereo"),
            ChannelLayout::Quad => f.write_str("quad"),
            ChannelLayout::Surround51 => f.write_str("5.1"),
            ChannelLayout::Unordered(n) => write!(f, "{n} channels"),
        }
    }
}
