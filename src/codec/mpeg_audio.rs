//! MPEG-1/2/2.5 audio frame headers (layers I to III).

use crate::av::{AudioParams, ChannelLayout, CodecId, CodecParameters, SampleFormat};
use crate::{AvError, Result};

const SAMPLE_RATES: [u32; 3] = [44_100, 48_000, 32_000];

/// MPEG audio version from the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    /// MPEG-1, 32 to 48 kHz
    Mpeg1,
    /// MPEG-2 low sampling frequencies
    Mpeg2,
    /// Unofficial MPEG 2.5 extension
    Mpeg25,
}

/// The four-byte header in front of every MPEG audio frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpegAudioHeader {
    /// Version
    pub version: MpegVersion,
    /// 1, 2 or 3
    pub layer: u8,
    /// Samples per second
    pub sample_rate: u32,
    /// 1 for mono, 2 otherwise
    pub channels: u16,
}

impl MpegAudioHeader {
    /// Parses the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = data
            .get(..4)
            .ok_or_else(|| AvError::Codec("MPEG audio header needs 4 bytes".into()))?;
        if header[0] != 0xFF || header[1] & 0xE0 != 0xE0 {
            return Err(AvError::Codec("missing MPEG audio sync".into()));
        }
        let version = match (header[1] >> 3) & 0x03 {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return Err(AvError::Codec("reserved MPEG audio version".into())),
        };
        let layer = match (header[1] >> 1) & 0x03 {
            1 => 3,
            2 => 2,
            3 => 1,
            _ => return Err(AvError::Codec("reserved MPEG audio layer".into())),
        };
        if header[2] >> 4 == 0x0F {
            return Err(AvError::Codec("bad MPEG audio bitrate index".into()));
        }
        let base = *SAMPLE_RATES
            .get(usize::from((header[2] >> 2) & 0x03))
            .ok_or_else(|| AvError::Codec("reserved MPEG audio sample rate".into()))?;
        let sample_rate = match version {
            MpegVersion::Mpeg1 => base,
            MpegVersion::Mpeg2 => base / 2,
            MpegVersion::Mpeg25 => base / 4,
        };
        let channels = if header[3] >> 6 == 0x03 { 1 } else { 2 };
        Ok(Self {
            version,
            layer,
            sample_rate,
            channels,
        })
    }

    /// First parsable header in `data`.
    pub fn find(data: &[u8]) -> Option<Self> {
        (0..data.len().saturating_sub(3))
            .filter(|&i| data[i] == 0xFF && data[i + 1] & 0xE0 == 0xE0)
            .find_map(|i| Self::parse(&data[i..]).ok())
    }

    /// Stream parameters implied by the header.
    pub fn codec_parameters(&self) -> CodecParameters {
        CodecParameters::audio(
            CodecId::MpegAudio,
            AudioParams {
                sample_rate: Some(self.sample_rate),
                channel_layout: Some(ChannelLayout::from_channels(self.channels)),
                sample_format: Some(SampleFormat::F32p),
                block_align: 0,
            },
        )
    }
}
