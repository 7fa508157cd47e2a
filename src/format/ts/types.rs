use crate::av::{AudioParams, CodecId, CodecParameters, MediaKind, VideoParams};

/// First byte of every transport packet.
pub const SYNC_BYTE: u8 = 0x47;

// PIDs
/// PID carrying the program association table.
pub const PID_PAT: u16 = 0x0000;
/// Stuffing packets.
pub const PID_NULL: u16 = 0x1FFF;

// Table IDs
/// Program association section.
pub const TABLE_ID_PAT: u8 = 0x00;
/// Program map section.
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary stream types
/// ISO/IEC 11172-3 audio.
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
/// ISO/IEC 13818-3 audio.
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
/// PES private data.
pub const STREAM_TYPE_PRIVATE_DATA: u8 = 0x06;
/// AAC in ADTS framing.
pub const STREAM_TYPE_AAC: u8 = 0x0F;
/// H.264 Annex B.
pub const STREAM_TYPE_H264: u8 = 0x1B;
/// HEVC Annex B.
pub const STREAM_TYPE_H265: u8 = 0x24;

// Descriptor tags
/// ISO 639 language descriptor.
pub const DESCRIPTOR_ISO_639: u8 = 0x0A;

/// Size of a plain transport packet.
pub const TS_PACKET_SIZE: usize = 188;
/// M2TS prepends a four-byte arrival timestamp to every packet
pub const M2TS_PACKET_SIZE: usize = 192;
/// Size of the fixed packet header.
pub const TS_HEADER_SIZE: usize = 4;
/// Clock rate of PES timestamps.
pub const PTS_HZ: u64 = 90_000;

/// One program listed in a PAT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PATEntry {
    /// Program number, 0 for the network PID
    pub program_number: u16,
    /// PMT PID, or the network PID for program 0
    pub pid: u16,
}

impl PATEntry {
    /// Returns true for the network information entry.
    pub fn is_network(&self) -> bool {
        self.program_number == 0
    }
}

/// Program association table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PAT {
    /// Transport stream id
    pub transport_stream_id: u16,
    /// Listed programs, network entry included
    pub entries: Vec<PATEntry>,
}

impl PAT {
    /// Entries that point at a PMT.
    pub fn programs(&self) -> impl Iterator<Item = &PATEntry> {
        self.entries.iter().filter(|e| !e.is_network())
    }
}

/// A raw PSI descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Descriptor tag
    pub tag: u8,
    /// Descriptor payload
    pub data: Vec<u8>,
}

/// One elementary stream of a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    /// `stream_type`, see the `STREAM_TYPE_*` constants
    pub stream_type: u8,
    /// PID carrying the stream's PES packets
    pub elementary_pid: u16,
    /// Stream descriptors
    pub descriptors: Vec<Descriptor>,
}

impl ElementaryStreamInfo {
    /// Language code from an ISO 639 descriptor.
    pub fn language(&self) -> Option<String> {
        let desc = self.descriptors.iter().find(|d| d.tag == DESCRIPTOR_ISO_639)?;
        let code = desc.data.get(..3)?;
        if code.iter().all(u8::is_ascii_alphabetic) {
            Some(String::from_utf8_lossy(code).to_ascii_lowercase())
        } else {
            None
        }
    }

    /// Media kind implied by the stream type.
    pub fn media_kind(&self) -> MediaKind {
        stream_type_codec(self.stream_type).1
    }

    /// Initial codec parameters; everything beyond the codec is filled in
    /// while probing.
    pub fn codec_parameters(&self) -> CodecParameters {
        match stream_type_codec(self.stream_type) {
            (codec, MediaKind::Video) => CodecParameters::video(codec, VideoParams::default()),
            (codec, MediaKind::Audio) => CodecParameters::audio(codec, AudioParams::default()),
            (codec, _) => CodecParameters::other(codec),
        }
    }
}

/// Codec and media kind carried by a PMT stream type.
pub fn stream_type_codec(stream_type: u8) -> (CodecId, MediaKind) {
    match stream_type {
        STREAM_TYPE_H264 => (CodecId::H264, MediaKind::Video),
        STREAM_TYPE_H265 => (CodecId::Hevc, MediaKind::Video),
        STREAM_TYPE_AAC => (CodecId::Aac, MediaKind::Audio),
        STREAM_TYPE_MPEG1_AUDIO | STREAM_TYPE_MPEG2_AUDIO => (CodecId::MpegAudio, MediaKind::Audio),
        _ => (CodecId::Unknown, MediaKind::Data),
    }
}

/// Program map table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PMT {
    /// Program described by this table
    pub program_number: u16,
    /// PID carrying the program clock reference
    pub pcr_pid: u16,
    /// Program-level descriptors
    pub program_descriptors: Vec<Descriptor>,
    /// Streams in table order
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

/// The adaptation field fields the demuxer uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptationField {
    /// Discontinuity indicator
    pub discontinuity: bool,
    /// Random access indicator
    pub random_access: bool,
    /// Program clock reference in 27 MHz units
    pub pcr: Option<u64>,
}

/// Fixed four-byte transport packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSHeader {
    /// Transport error indicator
    pub transport_error: bool,
    /// A PES packet or PSI section starts in this packet
    pub payload_unit_start: bool,
    /// Packet identifier
    pub pid: u16,
    /// Non-zero when the payload is scrambled
    pub scrambling_control: u8,
    /// An adaptation field follows the header
    pub adaptation_field_exists: bool,
    /// The packet carries payload bytes
    pub contains_payload: bool,
    /// Four-bit per-PID counter
    pub continuity_counter: u8,
}

/// A PSI section with its CRC already checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    /// Table id
    pub table_id: u8,
    /// Transport stream id for a PAT, program number for a PMT
    pub table_id_extension: u16,
    /// Version number
    pub version: u8,
    /// The table is currently applicable
    pub current_next: bool,
    /// Table payload between the section header and the CRC
    pub body: &'a [u8],
}

/// The fields of a PES header the demuxer uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesHeader {
    /// PES stream id
    pub stream_id: u8,
    /// Bytes following the length field, 0 when unbounded (video)
    pub packet_length: u16,
    /// Presentation timestamp in 90 kHz units
    pub pts: Option<i64>,
    /// Decode timestamp in 90 kHz units
    pub dts: Option<i64>,
    /// Offset of the elementary stream data
    pub header_len: usize,
}

impl PesHeader {
    /// Payload bytes the PES declares, when bounded.
    pub fn payload_len(&self) -> Option<usize> {
        match self.packet_length {
            0 => None,
            n => Some((usize::from(n) + 6).saturating_sub(self.header_len)),
        }
    }
}
