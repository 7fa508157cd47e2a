//! ADTS framing of AAC, as carried in MPEG transport streams.

use crate::av::{AudioParams, ChannelLayout, CodecId, CodecParameters, SampleFormat};
use crate::utils::BitReader;
use crate::{AvError, Result};

const SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025,
    8_000, 7_350,
];

/// Samples per channel in one AAC frame.
pub const SAMPLES_PER_FRAME: u32 = 1024;

/// AAC object type signalled in the two-bit ADTS profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacProfile {
    /// AAC Main
    Main,
    /// AAC Low Complexity
    Lc,
    /// AAC Scalable Sample Rate
    Ssr,
    /// AAC Long Term Prediction
    Ltp,
}

impl AacProfile {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => AacProfile::Main,
            1 => AacProfile::Lc,
            2 => AacProfile::Ssr,
            _ => AacProfile::Ltp,
        }
    }

    /// MPEG-4 audio object type (profile + 1).
    pub fn object_type(&self) -> u8 {
        match self {
            AacProfile::Main => 1,
            AacProfile::Lc => 2,
            AacProfile::Ssr => 3,
            AacProfile::Ltp => 4,
        }
    }
}

/// Fixed and variable parts of an ADTS header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdtsHeader {
    /// ID bit: MPEG-2 rather than MPEG-4 framing
    pub mpeg2: bool,
    /// No CRC follows the header
    pub protection_absent: bool,
    /// Audio object type
    pub profile: AacProfile,
    /// Index into the MPEG-4 sample rate table
    pub sample_rate_index: u8,
    /// MPEG-4 channel configuration, 0 when signalled in-band
    pub channel_configuration: u8,
    /// Frame length including the header
    pub frame_length: u16,
    /// Decoder buffer fullness, 0x7FF for variable bit rate
    pub buffer_fullness: u16,
    /// Raw data blocks in the frame minus one
    pub raw_blocks: u8,
}

impl AdtsHeader {
    /// Parses the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 7 {
            return Err(AvError::Codec("ADTS header needs 7 bytes".into()));
        }
        let mut reader = BitReader::new(data);
        if reader.read_bits(12)? != 0xFFF {
            return Err(AvError::Codec("missing ADTS sync word".into()));
        }
        let mpeg2 = reader.read_flag()?;
        if reader.read_bits(2)? != 0 {
            return Err(AvError::Codec("ADTS layer must be 0".into()));
        }
        let protection_absent = reader.read_flag()?;
        let profile = AacProfile::from_bits(reader.read_bits(2)?);
        let sample_rate_index = reader.read_bits(4)? as u8;
        reader.skip_bits(1)?; // private bit
        let channel_configuration = reader.read_bits(3)? as u8;
        reader.skip_bits(4)?; // original/copy, home, copyright bits
        let frame_length = reader.read_bits(13)? as u16;
        let buffer_fullness = reader.read_bits(11)? as u16;
        let raw_blocks = reader.read_bits(2)? as u8;

        let header = AdtsHeader {
            mpeg2,
            protection_absent,
            profile,
            sample_rate_index,
            channel_configuration,
            frame_length,
            buffer_fullness,
            raw_blocks,
        };
        if header.sample_rate().is_none() {
            return Err(AvError::Codec(format!(
                "reserved ADTS sample rate index {sample_rate_index}"
            )));
        }
        if (header.frame_length as usize) < header.header_len() {
            return Err(AvError::Codec(format!("ADTS frame length {frame_length} too small")));
        }
        Ok(header)
    }

    /// Finds and parses the first ADTS header in `data`.
    pub fn find(data: &[u8]) -> Option<(usize, Self)> {
        (0..data.len().saturating_sub(6))
            .filter(|&i| data[i] == 0xFF && data[i + 1] & 0xF6 == 0xF0)
            .find_map(|i| AdtsHeader::parse(&data[i..]).ok().map(|h| (i, h)))
    }

    /// Sample rate in Hz, `None` for a reserved index.
    pub fn sample_rate(&self) -> Option<u32> {
        SAMPLE_RATES.get(self.sample_rate_index as usize).copied()
    }

    /// Header size: 7 bytes, 9 with a CRC.
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            7
        } else {
            9
        }
    }

    /// Channel layout, `None` when the configuration is carried in-band (0).
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        match self.channel_configuration {
            0 => None,
            7 => Some(ChannelLayout::Unordered(8)),
            n => Some(ChannelLayout::from_channels(u16::from(n))),
        }
    }

    /// The two-byte MPEG-4 AudioSpecificConfig equivalent of this header.
    pub fn audio_specific_config(&self) -> [u8; 2] {
        let object_type = self.profile.object_type();
        [
            (object_type << 3) | (self.sample_rate_index >> 1),
            ((self.sample_rate_index & 1) << 7) | (self.channel_configuration << 3),
        ]
    }

    /// Stream parameters derived from the header.
    pub fn codec_parameters(&self) -> CodecParameters {
        let params = AudioParams {
            sample_rate: self.sample_rate(),
            channel_layout: self.channel_layout(),
            sample_format: Some(SampleFormat::F32p),
            block_align: 0,
        };
        CodecParameters::audio(CodecId::Aac, params).with_extradata(self.audio_specific_config().to_vec())
    }
}
