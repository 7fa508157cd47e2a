use super::{ChannelLayout, MediaKind, PixelFormat, Rational, SampleFormat};
use bytes::Bytes;
use std::fmt;

/// Codec identifiers known to the built-in backend.
///
/// Streams whose codec has no registered decoder are still listed by the
/// session; the decoder table simply refuses to register them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// Uncompressed video in one of the [`PixelFormat`]s
    RawVideo,
    /// Unsigned 8-bit PCM
    PcmU8,
    /// Signed 16-bit little-endian PCM
    PcmS16Le,
    /// Signed 24-bit little-endian PCM
    PcmS24Le,
    /// Signed 32-bit little-endian PCM
    PcmS32Le,
    /// 32-bit little-endian float PCM
    PcmF32Le,
    /// 64-bit little-endian float PCM
    PcmF64Le,
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    Hevc,
    /// AAC (ADTS in transport streams)
    Aac,
    /// MPEG-1/2 audio layers I-III
    MpegAudio,
    /// Anything the demuxer could not identify
    Unknown,
}

impl CodecId {
    /// Media kind carried by streams of this codec.
    pub fn media_kind(&self) -> MediaKind {
        match self {
            CodecId::RawVideo | CodecId::H264 | CodecId::Hevc => MediaKind::Video,
            CodecId::Unknown => MediaKind::Other,
            _ => MediaKind::Audio,
        }
    }

    /// Returns true for the uncompressed PCM family.
    pub fn is_pcm(&self) -> bool {
        matches!(
            self,
            CodecId::PcmU8
                | CodecId::PcmS16Le
                | CodecId::PcmS24Le
                | CodecId::PcmS32Le
                | CodecId::PcmF32Le
                | CodecId::PcmF64Le
        )
    }

    /// Bytes per sample of a PCM codec as stored in the container.
    pub fn pcm_sample_bytes(&self) -> Option<usize> {
        match self {
            CodecId::PcmU8 => Some(1),
            CodecId::PcmS16Le => Some(2),
            CodecId::PcmS24Le => Some(3),
            CodecId::PcmS32Le | CodecId::PcmF32Le => Some(4),
            CodecId::PcmF64Le => Some(8),
            _ => None,
        }
    }

    /// Sample format a PCM decoder produces. 24-bit input widens to S32.
    pub fn pcm_sample_format(&self) -> Option<SampleFormat> {
        match self {
            CodecId::PcmU8 => Some(SampleFormat::U8),
            CodecId::PcmS16Le => Some(SampleFormat::S16),
            CodecId::PcmS24Le | CodecId::PcmS32Le => Some(SampleFormat::S32),
            CodecId::PcmF32Le => Some(SampleFormat::F32),
            CodecId::PcmF64Le => Some(SampleFormat::F64),
            _ => None,
        }
    }

    /// PCM codec for an integer/float WAVE-style sample description.
    pub fn from_pcm_bits(bits: u16, float: bool) -> Option<CodecId> {
        match (bits, float) {
            (8, false) => Some(CodecId::PcmU8),
            (16, false) => Some(CodecId::PcmS16Le),
            (24, false) => Some(CodecId::PcmS24Le),
            (32, false) => Some(CodecId::PcmS32Le),
            (32, true) => Some(CodecId::PcmF32Le),
            (64, true) => Some(CodecId::PcmF64Le),
            _ => None,
        }
    }

    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            CodecId::RawVideo => "rawvideo",
            CodecId::PcmU8 => "pcm_u8",
            CodecId::PcmS16Le => "pcm_s16le",
            CodecId::PcmS24Le => "pcm_s24le",
            CodecId::PcmS32Le => "pcm_s32le",
            CodecId::PcmF32Le => "pcm_f32le",
            CodecId::PcmF64Le => "pcm_f64le",
            CodecId::H264 => "h264",
            CodecId::Hevc => "hevc",
            CodecId::Aac => "aac",
            CodecId::MpegAudio => "mp3",
            CodecId::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Video-specific stream parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoParams {
    /// Coded width in pixels, 0 if unknown
    pub width: u32,
    /// Coded height in pixels, 0 if unknown
    pub height: u32,
    /// Pixel layout of decoded pictures
    pub pixel_format: Option<PixelFormat>,
    /// Nominal frames per second
    pub frame_rate: Option<Rational>,
    /// Rows are stored last-to-first (bottom-up DIBs in AVI)
    pub bottom_up: bool,
    /// U and V planes are stored swapped (YV12)
    pub swap_uv: bool,
}

/// Audio-specific stream parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioParams {
    /// Samples per second
    pub sample_rate: Option<u32>,
    /// Channel arrangement
    pub channel_layout: Option<ChannelLayout>,
    /// Encoding of decoded samples
    pub sample_format: Option<SampleFormat>,
    /// Bytes per interleaved sample frame, 0 if unknown
    pub block_align: usize,
}

impl AudioParams {
    /// Number of channels, 0 if unknown.
    pub fn channels(&self) -> u16 {
        self.channel_layout.map(|l| l.channels()).unwrap_or(0)
    }
}

/// Parameters specific to the stream's media kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaParams {
    /// Picture parameters
    Video(VideoParams),
    /// Sound parameters
    Audio(AudioParams),
    /// Data, subtitle or unknown streams
    Other,
}

/// Everything a decoder needs to know about a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParameters {
    /// Codec of the stream's packets
    pub codec_id: CodecId,
    /// Kind-specific parameters
    pub media: MediaParams,
    /// Average bits per second, when declared
    pub bit_rate: Option<u64>,
    /// Codec-private setup bytes (AudioSpecificConfig, parameter sets)
    pub extradata: Bytes,
}

impl CodecParameters {
    /// Parameters for a video stream.
    pub fn video(codec_id: CodecId, params: VideoParams) -> Self {
        Self {
            codec_id,
            media: MediaParams::Video(params),
            bit_rate: None,
            extradata: Bytes::new(),
        }
    }

    /// Parameters for an audio stream.
    pub fn audio(codec_id: CodecId, params: AudioParams) -> Self {
        Self {
            codec_id,
            media: MediaParams::Audio(params),
            bit_rate: None,
            extradata: Bytes::new(),
        }
    }

    /// Parameters for a stream that is neither audio nor video.
    pub fn other(codec_id: CodecId) -> Self {
        Self {
            codec_id,
            media: MediaParams::Other,
            bit_rate: None,
            extradata: Bytes::new(),
        }
    }

    /// Sets the declared bit rate.
    pub fn with_bit_rate(mut self, bit_rate: u64) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    /// Sets the codec-private setup bytes.
    pub fn with_extradata(mut self, extradata: impl Into<Bytes>) -> Self {
        self.extradata = extradata.into();
        self
    }

    /// Video parameters, if this is a video stream.
    pub fn as_video(&self) -> Option<&VideoParams> {
        match &self.media {
            MediaParams::Video(v) => Some(v),
            _ => None,
        }
    }

    /// Audio parameters, if this is an audio stream.
    pub fn as_audio(&self) -> Option<&AudioParams> {
        match &self.media {
            MediaParams::Audio(a) => Some(a),
            _ => None,
        }
    }

    /// Copies fields that are unknown here but known in `other`. Known
    /// values are never overwritten.
    pub fn fill_missing(&mut self, other: &CodecParameters) {
        if self.bit_rate.is_none() {
            self.bit_rate = other.bit_rate;
        }
        if self.extradata.is_empty() {
            self.extradata = other.extradata.clone();
        }
        match (&mut self.media, &other.media) {
            (MediaParams::Video(v), MediaParams::Video(o)) => {
                if v.width == 0 || v.height == 0 {
                    v.width = o.width;
                    v.height = o.height;
                }
                v.pixel_format = v.pixel_format.or(o.pixel_format);
                v.frame_rate = v.frame_rate.or(o.frame_rate);
            }
            (MediaParams::Audio(a), MediaParams::Audio(o)) => {
                a.sample_rate = a.sample_rate.or(o.sample_rate);
                a.channel_layout = a.channel_layout.or(o.channel_layout);
                a.sample_format = a.sample_format.or(o.sample_format);
                if a.block_align == 0 {
                    a.block_align = o.block_align;
                }
            }
            _ => {}
        }
    }

    /// Returns true when everything a decoder and the transform stages need
    /// is known: geometry and pixel format for video, rate and layout for audio.
    pub fn is_complete(&self) -> bool {
        match &self.media {
            MediaParams::Video(v) => v.width > 0 && v.height > 0 && v.pixel_format.is_some(),
            MediaParams::Audio(a) => {
                a.sample_rate.is_some_and(|r| r > 0) && a.channel_layout.is_some()
            }
            MediaParams::Other => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_id_kinds() {
        assert_eq!(CodecId::H264.media_kind(), MediaKind::Video);
        assert_eq!(CodecId::PcmS24Le.media_kind(), MediaKind::Audio);
        assert_eq!(CodecId::from_pcm_bits(24, false), Some(CodecId::PcmS24Le));
        assert_eq!(CodecId::from_pcm_bits(16, true), None);
        assert_eq!(CodecId::PcmS24Le.pcm_sample_bytes(), Some(3));
        assert_eq!(CodecId::Hevc.to_string(), "hevc");
    }

    #[test]
    fn test_completeness() {
        let mut params = CodecParameters::audio(CodecId::Aac, AudioParams::default());
        assert!(!params.is_complete());

        params.fill_missing(&CodecParameters::audio(
            CodecId::Aac,
            AudioParams {
                sample_rate: Some(48_000),
                channel_layout: Some(ChannelLayout::Stereo),
                ..AudioParams::default()
            },
        ));
        assert!(params.is_complete());

        let video = CodecParameters::video(
            CodecId::RawVideo,
            VideoParams {
                width: 16,
                height: 16,
                ..Default::default()
            },
        );
        assert!(!video.is_complete());
    }

    #[test]
    fn test_fill_missing_keeps_known_values() {
        let mut params = CodecParameters::audio(
            CodecId::Aac,
            AudioParams {
                sample_rate: Some(48_000),
                ..Default::default()
            },
        );
        let probed = CodecParameters::audio(
            CodecId::Aac,
            AudioParams {
                sample_rate: Some(44_100),
                channel_layout: Some(ChannelLayout::Stereo),
                ..Default::default()
            },
        )
        .with_extradata(vec![0x12, 0x10]);
        params.fill_missing(&probed);

        let audio = params.as_audio().unwrap();
        assert_eq!(audio.sample_rate, Some(48_000));
        assert_eq!(audio.channel_layout, Some(ChannelLayout::Stereo));
        assert_eq!(&params.extradata[..], &[0x12, 0x10]);
    }
}
