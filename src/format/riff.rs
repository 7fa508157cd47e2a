//! Chunk plumbing shared by the WAV and AVI demuxers.

use crate::av::{AudioParams, ChannelLayout, CodecId, CodecParameters, Metadata};
use crate::io::IoContext;
use crate::{AvError, Result};

pub(crate) const WAVE_FORMAT_PCM: u16 = 0x0001;
pub(crate) const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub(crate) const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// An 8-byte chunk header: four-character id plus little-endian size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkHeader {
    pub id: [u8; 4],
    pub size: u32,
}

impl ChunkHeader {
    /// Payload size including the pad byte of odd-sized chunks.
    pub fn padded_size(&self) -> u64 {
        u64::from(self.size) + u64::from(self.size & 1)
    }
}

/// Reads the next chunk header, or `None` at a clean end of stream.
pub(crate) fn read_chunk_header(io: &mut IoContext) -> Result<Option<ChunkHeader>> {
    Ok(io.try_read_array::<8>()?.map(|raw| ChunkHeader {
        id: [raw[0], raw[1], raw[2], raw[3]],
        size: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
    }))
}

/// Reads a whole chunk payload and skips its pad byte.
pub(crate) fn read_chunk_body(io: &mut IoContext, header: &ChunkHeader) -> Result<Vec<u8>> {
    let mut body = vec![0u8; header.size as usize];
    io.read_exact(&mut body)?;
    io.skip(u64::from(header.size & 1));
    Ok(body)
}

/// Checks the 12-byte `RIFF <size> <form>` preamble.
pub(crate) fn is_riff_form(data: &[u8], form: &[u8; 4]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == form
}

pub(crate) fn fourcc(id: &[u8; 4]) -> String {
    id.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}

fn info_key(tag: &[u8; 4]) -> Option<&'static str> {
    Some(match tag {
        b"INAM" => "title",
        b"IART" => "artist",
        b"ICMT" => "comment",
        b"ICRD" => "date",
        b"IGNR" => "genre",
        b"ISFT" => "encoder",
        b"ICOP" => "copyright",
        b"IPRD" => "album",
        b"IENG" => "engineer",
        _ => return None,
    })
}

/// Walks the chunks packed in an in-memory list payload. A truncated last
/// chunk ends the walk.
pub(crate) fn sub_chunks(data: &[u8]) -> SubChunks<'_> {
    SubChunks { data }
}

pub(crate) struct SubChunks<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for SubChunks<'a> {
    type Item = ([u8; 4], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 8 {
            return None;
        }
        let id = [self.data[0], self.data[1], self.data[2], self.data[3]];
        let size = u32::from_le_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]) as usize;
        let body = self.data.get(8..8 + size)?;
        let advance = (8 + size + (size & 1)).min(self.data.len());
        self.data = &self.data[advance..];
        Some((id, body))
    }
}

/// Parses the sub-chunks of a `LIST/INFO` payload (after the `INFO` tag)
/// into `metadata`. Unknown tags are ignored.
pub(crate) fn parse_info(data: &[u8], metadata: &mut Metadata) {
    for (tag, value) in sub_chunks(data) {
        if let Some(key) = info_key(&tag) {
            let text = String::from_utf8_lossy(value);
            let text = text.trim_end_matches('\0').trim();
            if !text.is_empty() {
                metadata.insert(key, text);
            }
        }
    }
}

/// A `WAVEFORMATEX` record, with the sub-format of the extensible form
/// already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaveFormat {
    pub tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    /// Parses a WAVEFORMAT(EX) body.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 16 {
            return Err(AvError::format(format!(
                "wave format record is {} bytes, need 16",
                data.len()
            )));
        }
        let u16_at = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        let mut format = WaveFormat {
            tag: u16_at(0),
            channels: u16_at(2),
            sample_rate: u32_at(4),
            byte_rate: u32_at(8),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
        };
        if format.tag == WAVE_FORMAT_EXTENSIBLE {
            // cbSize, valid bits, channel mask, then the sub-format GUID whose
            // first two bytes carry the real tag.
            if data.len() < 40 {
                return Err(AvError::format("truncated WAVE_FORMAT_EXTENSIBLE record"));
            }
            format.tag = u16_at(24);
        }
        Ok(format)
    }

    /// Codec parameters for PCM and float tags.
    pub fn codec_parameters(&self) -> Result<CodecParameters> {
        let float = match self.tag {
            WAVE_FORMAT_PCM => false,
            WAVE_FORMAT_IEEE_FLOAT => true,
            other => {
                return Err(AvError::UnsupportedFormat(format!(
                    "wave format tag 0x{other:04x}"
                )))
            }
        };
        let codec_id = CodecId::from_pcm_bits(self.bits_per_sample, float).ok_or_else(|| {
            AvError::UnsupportedFormat(format!(
                "{}-bit {} samples",
                self.bits_per_sample,
                if float { "float" } else { "integer" }
            ))
        })?;
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(AvError::format("wave format with zero channels or rate"));
        }
        let block_align = match self.block_align as usize {
            0 => codec_id.pcm_sample_bytes().unwrap_or(1) * self.channels as usize,
            n => n,
        };
        let params = AudioParams {
            sample_rate: Some(self.sample_rate),
            channel_layout: Some(ChannelLayout::from_channels(self.channels)),
            sample_format: codec_id.pcm_sample_format(),
            block_align,
        };
        let mut params = CodecParameters::audio(codec_id, params);
        if self.byte_rate > 0 {
            params = params.with_bit_rate(u64::from(self.byte_rate) * 8);
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::SampleFormat;
    use pretty_assertions::assert_eq;

    fn format_bytes(tag: u16, channels: u16, rate: u32, bits: u16) -> Vec<u8> {
        let align = channels * bits / 8;
        let mut out = Vec::new();
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * u32::from(align)).to_le_bytes());
        out.extend_from_slice(&align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out
    }

    #[test]
    fn test_pcm_format() {
        let format = WaveFormat::parse(&format_bytes(1, 2, 44_100, 16)).unwrap();
        let params = format.codec_parameters().unwrap();
        assert_eq!(params.codec_id, CodecId::PcmS16Le);
        let audio = params.as_audio().unwrap();
        assert_eq!(audio.block_align, 4);
        assert_eq!(audio.sample_format, Some(SampleFormat::S16));
        assert_eq!(params.bit_rate, Some(1_411_200));
    }

    #[test]
    fn test_extensible_float() {
        let mut data = format_bytes(WAVE_FORMAT_EXTENSIBLE, 1, 48_000, 32);
        data.extend_from_slice(&22u16.to_le_bytes());
        data.extend_from_slice(&32u16.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&WAVE_FORMAT_IEEE_FLOAT.to_le_bytes());
        data.extend_from_slice(&[0u8; 14]);
        let format = WaveFormat::parse(&data).unwrap();
        assert_eq!(format.codec_parameters().unwrap().codec_id, CodecId::PcmF32Le);
    }

    #[test]
    fn test_rejects_compressed_tags() {
        let format = WaveFormat::parse(&format_bytes(0x55, 2, 44_100, 0)).unwrap();
        assert!(matches!(
            format.codec_parameters(),
            Err(AvError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_parse_info() {
        let mut data = Vec::new();
        for (tag, value) in [(b"INAM", &b"Song\0"[..]), (b"IXYZ", &b"skip"[..]), (b"IART", &b"Band"[..])] {
            data.extend_from_slice(tag);
            data.extend_from_slice(&(value.len() as u32).to_le_bytes());
            data.extend_from_slice(value);
            if value.len() % 2 == 1 {
                data.push(0);
            }
        }
        let mut metadata = Metadata::new();
        parse_info(&data, &mut metadata);
        assert_eq!(metadata.get("title"), Some("Song"));
        assert_eq!(metadata.get("artist"), Some("Band"));
        assert_eq!(metadata.len(), 2);
    }
}
