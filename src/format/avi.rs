use super::riff::{self, WaveFormat};
use super::{ContainerInfo, Demuxer, DemuxerFactory, ReadStatus, Stream};
use crate::av::{
    AudioParams, ChannelLayout, CodecId, CodecParameters, MediaKind, MediaParams, Packet,
    PixelFormat, Rational, VideoParams,
};
use crate::config::Config;
use crate::io::IoContext;
use crate::logging::{self, Logger};
use crate::{AvError, Result};
use std::time::Duration;

pub(crate) struct AviFactory;

impl DemuxerFactory for AviFactory {
    fn name(&self) -> &'static str {
        "avi"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["avi"]
    }

    fn probe(&self, data: &[u8]) -> u32 {
        if riff::is_riff_form(data, b"AVI ") || riff::is_riff_form(data, b"AVIX") {
            100
        } else {
            0
        }
    }

    fn create(&self, _config: &Config, logger: &Logger) -> Box<dyn Demuxer> {
        Box::new(AviDemuxer {
            logger: logger.clone(),
            tracks: Vec::new(),
            movi_end: None,
        })
    }
}

/// Per-stream packet clock.
#[derive(Debug)]
struct Track {
    kind: MediaKind,
    /// PCM audio advances by sample frames instead of chunks
    block_align: Option<usize>,
    next_pts: i64,
}

struct AviDemuxer {
    logger: Logger,
    tracks: Vec<Track>,
    /// End offset of the current `movi` list; `None` outside one
    movi_end: Option<u64>,
}

/// Fields of `avih` that matter here.
#[derive(Debug, Default)]
struct MainHeader {
    micros_per_frame: u32,
    total_frames: u32,
}

/// Fields of `strh`.
#[derive(Debug)]
struct StreamHeader {
    kind: [u8; 4],
    handler: [u8; 4],
    scale: u32,
    rate: u32,
    length: u32,
}

fn u16_at(data: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([data[i], data[i + 1]])
}

fn u32_at(data: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]])
}

fn parse_main_header(data: &[u8]) -> Result<MainHeader> {
    if data.len() < 40 {
        return Err(AvError::format("avih chunk too short"));
    }
    Ok(MainHeader {
        micros_per_frame: u32_at(data, 0),
        total_frames: u32_at(data, 16),
    })
}

fn parse_stream_header(data: &[u8]) -> Result<StreamHeader> {
    if data.len() < 36 {
        return Err(AvError::format("strh chunk too short"));
    }
    Ok(StreamHeader {
        kind: [data[0], data[1], data[2], data[3]],
        handler: [data[4], data[5], data[6], data[7]],
        scale: u32_at(data, 20),
        rate: u32_at(data, 24),
        length: u32_at(data, 32),
    })
}

/// Maps a `BITMAPINFOHEADER` to codec parameters.
fn video_parameters(strf: &[u8], handler: &[u8; 4]) -> Result<CodecParameters> {
    if strf.len() < 20 {
        return Err(AvError::format("video strf chunk too short"));
    }
    let width = u32_at(strf, 4) as i32;
    let height = u32_at(strf, 8) as i32;
    let bit_count = u16_at(strf, 14);
    let compression = [strf[16], strf[17], strf[18], strf[19]];

    let mut video = VideoParams {
        width: width.unsigned_abs(),
        height: height.unsigned_abs(),
        ..VideoParams::default()
    };
    let codec_id = match &compression {
        [0, 0, 0, 0] => {
            video.pixel_format = match bit_count {
                24 => Some(PixelFormat::Bgr24),
                32 => Some(PixelFormat::Bgra),
                8 => Some(PixelFormat::Gray8),
                other => {
                    return Err(AvError::UnsupportedFormat(format!("{other}-bit BI_RGB video")))
                }
            };
            // A positive height marks a bottom-up DIB.
            video.bottom_up = height > 0;
            CodecId::RawVideo
        }
        b"I420" | b"IYUV" => {
            video.pixel_format = Some(PixelFormat::Yuv420p);
            CodecId::RawVideo
        }
        b"YV12" => {
            video.pixel_format = Some(PixelFormat::Yuv420p);
            video.swap_uv = true;
            CodecId::RawVideo
        }
        b"Y800" | b"GREY" | b"Y8  " => {
            video.pixel_format = Some(PixelFormat::Gray8);
            CodecId::RawVideo
        }
        b"NV12" => {
            video.pixel_format = Some(PixelFormat::Nv12);
            CodecId::RawVideo
        }
        b"H264" | b"h264" | b"X264" | b"x264" | b"avc1" | b"AVC1" => CodecId::H264,
        b"HEVC" | b"hevc" | b"H265" | b"hvc1" => CodecId::Hevc,
        _ => match handler {
            b"H264" | b"h264" | b"avc1" => CodecId::H264,
            _ => CodecId::Unknown,
        },
    };
    let mut params = CodecParameters::video(codec_id, video);
    if strf.len() > 40 {
        params = params.with_extradata(strf[40..].to_vec());
    }
    Ok(params)
}

/// Maps a `WAVEFORMATEX` to codec parameters. Compressed tags are listed
/// with what the record says, for a decoder that may not exist.
fn audio_parameters(strf: &[u8]) -> Result<CodecParameters> {
    let format = WaveFormat::parse(strf)?;
    match format.codec_parameters() {
        Ok(params) => Ok(params),
        Err(AvError::UnsupportedFormat(_)) => {
            let codec_id = match format.tag {
                0x0050 | 0x0055 => CodecId::MpegAudio,
                0x00FF | 0x1600 | 0x706D => CodecId::Aac,
                _ => CodecId::Unknown,
            };
            let audio = AudioParams {
                sample_rate: (format.sample_rate > 0).then_some(format.sample_rate),
                channel_layout: (format.channels > 0)
                    .then(|| ChannelLayout::from_channels(format.channels)),
                sample_format: None,
                block_align: format.block_align as usize,
            };
            let mut params = CodecParameters::audio(codec_id, audio);
            if format.byte_rate > 0 {
                params = params.with_bit_rate(u64::from(format.byte_rate) * 8);
            }
            Ok(params)
        }
        Err(err) => Err(err),
    }
}

impl AviDemuxer {
    fn parse_stream_list(
        &mut self,
        data: &[u8],
        index: usize,
        main: &MainHeader,
    ) -> Result<Stream> {
        let mut header = None;
        let mut strf = None;
        let mut title = None;
        for (id, body) in riff::sub_chunks(data) {
            match &id {
                b"strh" => header = Some(parse_stream_header(body)?),
                b"strf" => strf = Some(body),
                b"strn" => {
                    let name = String::from_utf8_lossy(body);
                    title = Some(name.trim_end_matches('\0').trim().to_string());
                }
                _ => {}
            }
        }
        let header = header.ok_or_else(|| AvError::format(format!("stream {index} has no strh")))?;

        let header_base = if header.scale > 0 && header.rate > 0 {
            Rational::new(header.scale as i32, header.rate as i32)
        } else if main.micros_per_frame > 0 {
            Rational::new(main.micros_per_frame as i32, 1_000_000)
        } else {
            Rational::new(1, 25)
        };

        let (stream, track) = match &header.kind {
            b"vids" => {
                let strf = strf.ok_or_else(|| AvError::format(format!("stream {index} has no strf")))?;
                let mut params = video_parameters(strf, &header.handler)?;
                if let MediaParams::Video(video) = &mut params.media {
                    video.frame_rate = Some(header_base.invert());
                }
                let stream = Stream::new(index, params, header_base)
                    .with_duration(i64::from(header.length))
                    .with_frame_count(u64::from(header.length));
                let track = Track {
                    kind: MediaKind::Video,
                    block_align: None,
                    next_pts: 0,
                };
                (stream, track)
            }
            b"auds" => {
                let strf = strf.ok_or_else(|| AvError::format(format!("stream {index} has no strf")))?;
                let params = audio_parameters(strf)?;
                let pcm = params.codec_id.is_pcm();
                let audio = params.as_audio().cloned().unwrap_or_default();
                let time_base = match audio.sample_rate {
                    Some(rate) if pcm => Rational::new(1, rate as i32),
                    _ => header_base,
                };
                let duration = header_base.rescale(i64::from(header.length), time_base);
                let track = Track {
                    kind: MediaKind::Audio,
                    block_align: pcm.then_some(audio.block_align.max(1)),
                    next_pts: 0,
                };
                (Stream::new(index, params, time_base).with_duration(duration), track)
            }
            other => {
                logging::av_debug!(
                    self.logger,
                    "AVI: stream {} of type {} is passed through as data",
                    index,
                    riff::fourcc(other)
                );
                let stream = Stream::new(index, CodecParameters::other(CodecId::Unknown), header_base)
                    .with_kind(MediaKind::Data);
                let track = Track {
                    kind: MediaKind::Data,
                    block_align: None,
                    next_pts: 0,
                };
                (stream, track)
            }
        };
        self.tracks.push(track);

        let mut stream = stream;
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            stream.metadata.insert("title", title);
        }
        Ok(stream)
    }

    fn parse_header_list(&mut self, data: &[u8], info: &mut ContainerInfo) -> Result<()> {
        let mut main = MainHeader::default();
        for (id, body) in riff::sub_chunks(data) {
            match &id {
                b"avih" => main = parse_main_header(body)?,
                b"LIST" if body.starts_with(b"strl") => {
                    let index = info.streams.len();
                    let stream = self.parse_stream_list(&body[4..], index, &main)?;
                    info.streams.push(stream);
                }
                b"LIST" if body.starts_with(b"INFO") => {
                    riff::parse_info(&body[4..], &mut info.metadata)
                }
                _ => {}
            }
        }
        if main.micros_per_frame > 0 && main.total_frames > 0 {
            info.duration = Some(Duration::from_micros(
                u64::from(main.micros_per_frame) * u64::from(main.total_frames),
            ));
        }
        Ok(())
    }

    /// Moves to the next `movi` list after the current one ended, following
    /// OpenDML `AVIX` extensions. Returns false at end of file.
    fn next_movi(&mut self, io: &mut IoContext) -> Result<bool> {
        while let Some(header) = riff::read_chunk_header(io)? {
            match &header.id {
                b"RIFF" => {
                    // Enter the extension; its lists follow directly.
                    io.skip(4);
                }
                b"LIST" => {
                    let list_type = io.read_array::<4>()?;
                    if &list_type == b"movi" {
                        self.movi_end = Some(io.position() + header.padded_size() - 4);
                        return Ok(true);
                    }
                    io.skip(header.padded_size().saturating_sub(4));
                }
                _ => io.skip(header.padded_size()),
            }
        }
        Ok(false)
    }
}

/// Stream number and chunk kind of a `movi` chunk id like `01wb`.
fn data_chunk(id: &[u8; 4]) -> Option<(usize, [u8; 2])> {
    if !id[0].is_ascii_digit() || !id[1].is_ascii_digit() {
        return None;
    }
    let number = usize::from(id[0] - b'0') * 10 + usize::from(id[1] - b'0');
    Some((number, [id[2], id[3]]))
}

impl Demuxer for AviDemuxer {
    fn read_header(&mut self, io: &mut IoContext) -> Result<ContainerInfo> {
        let preamble = io.read_array::<12>()?;
        if !riff::is_riff_form(&preamble, b"AVI ") {
            return Err(AvError::format("missing RIFF/AVI preamble"));
        }

        let mut info = ContainerInfo::default();
        let mut saw_header = false;
        while let Some(header) = riff::read_chunk_header(io)? {
            if &header.id != b"LIST" {
                io.skip(header.padded_size());
                continue;
            }
            let list_type = io.read_array::<4>()?;
            match &list_type {
                b"movi" => {
                    self.movi_end = Some(io.position() + header.padded_size() - 4);
                    break;
                }
                b"hdrl" | b"INFO" => {
                    let mut body = vec![0u8; header.size.saturating_sub(4) as usize];
                    io.read_exact(&mut body)?;
                    io.skip(u64::from(header.size & 1));
                    if &list_type == b"hdrl" {
                        self.parse_header_list(&body, &mut info)?;
                        saw_header = true;
                    } else {
                        riff::parse_info(&body, &mut info.metadata);
                    }
                }
                _ => io.skip(header.padded_size().saturating_sub(4)),
            }
        }

        if !saw_header {
            return Err(AvError::format("no hdrl list"));
        }
        if self.movi_end.is_none() {
            return Err(AvError::format("no movi list"));
        }
        logging::av_debug!(
            self.logger,
            "AVI: {} stream(s), movi ends at {:?}",
            info.streams.len(),
            self.movi_end
        );
        Ok(info)
    }

    fn read_packet(&mut self, io: &mut IoContext, packet: &mut Packet) -> Result<ReadStatus> {
        loop {
            let in_movi = self.movi_end.is_some_and(|end| io.position() < end);
            if !in_movi {
                self.movi_end = None;
                if !self.next_movi(io)? {
                    return Ok(ReadStatus::EndOfStream);
                }
                continue;
            }

            let offset = io.position();
            let Some(header) = riff::read_chunk_header(io)? else {
                return Ok(ReadStatus::EndOfStream);
            };
            if &header.id == b"LIST" {
                let list_type = io.read_array::<4>()?;
                if &list_type != b"rec " {
                    io.skip(header.padded_size().saturating_sub(4));
                }
                // `rec ` groups are flattened: their chunks follow.
                continue;
            }

            let Some((number, kind)) = data_chunk(&header.id) else {
                io.skip(header.padded_size());
                continue;
            };
            let Some(track) = self.tracks.get_mut(number) else {
                logging::av_warn!(
                    self.logger,
                    "AVI: chunk {} for missing stream {}",
                    riff::fourcc(&header.id),
                    number
                );
                io.skip(header.padded_size());
                continue;
            };
            if &kind == b"pc" || header.size == 0 {
                // Palette changes are not forwarded; empty chunks repeat the
                // previous frame but still take a tick.
                if header.size == 0 && track.block_align.is_none() {
                    track.next_pts += 1;
                }
                io.skip(header.padded_size());
                continue;
            }

            let got = io.read_into(packet.payload_mut(), header.size as usize)?;
            io.skip(u64::from(header.size & 1));
            if got < header.size as usize {
                logging::av_warn!(
                    self.logger,
                    "AVI: chunk at {} truncated to {} of {} bytes",
                    offset,
                    got,
                    header.size
                );
                packet.flags.corrupt = true;
            }

            let ticks = match track.block_align {
                Some(align) => (got / align) as i64,
                None => 1,
            };
            packet.stream_index = number;
            packet.pts = Some(track.next_pts);
            packet.dts = Some(track.next_pts);
            packet.duration = Some(ticks);
            packet.pos = Some(offset);
            packet.flags.keyframe = &kind != b"dc" || track.next_pts == 0 || track.kind != MediaKind::Video;
            track.next_pts += ticks;
            return Ok(ReadStatus::Populated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemorySource, SourceBinding};
    use pretty_assertions::assert_eq;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn list(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
        let mut body = kind.to_vec();
        for child in children {
            body.extend_from_slice(child);
        }
        chunk(b"LIST", &body)
    }

    fn strh(kind: &[u8; 4], scale: u32, rate: u32, length: u32) -> Vec<u8> {
        let mut body = kind.to_vec();
        body.extend_from_slice(&[0u8; 16]);
        body.extend_from_slice(&scale.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&length.to_le_bytes());
        body.extend_from_slice(&[0u8; 20]);
        chunk(b"strh", &body)
    }

    fn bitmap(width: i32, height: i32, bits: u16, compression: &[u8; 4]) -> Vec<u8> {
        let mut body = 40u32.to_le_bytes().to_vec();
        body.extend_from_slice(&width.to_le_bytes());
        body.extend_from_slice(&height.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        body.extend_from_slice(compression);
        body.extend_from_slice(&[0u8; 20]);
        chunk(b"strf", &body)
    }

    fn avi(streams: Vec<Vec<u8>>, movi: Vec<Vec<u8>>) -> Vec<u8> {
        let mut avih = vec![0u8; 56];
        avih[0..4].copy_from_slice(&40_000u32.to_le_bytes());
        avih[16..20].copy_from_slice(&2u32.to_le_bytes());
        let mut hdrl = vec![chunk(b"avih", &avih)];
        hdrl.extend(streams);
        let mut body = b"AVI ".to_vec();
        body.extend(list(b"hdrl", &hdrl));
        body.extend(chunk(b"JUNK", &[0u8; 7]));
        body.extend(list(b"movi", &movi));
        chunk(b"RIFF", &body)
    }

    fn read_all(data: Vec<u8>) -> (ContainerInfo, Vec<Packet>) {
        let mut io = IoContext::new(SourceBinding::owned(MemorySource::new(data)));
        let mut demuxer = AviFactory.create(&Config::default(), &Logger::discard());
        let info = demuxer.read_header(&mut io).unwrap();
        let mut packets = Vec::new();
        loop {
            let mut packet = Packet::new();
            if demuxer.read_packet(&mut io, &mut packet).unwrap() == ReadStatus::EndOfStream {
                return (info, packets);
            }
            packets.push(packet);
        }
    }

    #[test]
    fn test_raw_video_and_pcm() {
        let mut wave = Vec::new();
        wave.extend_from_slice(&1u16.to_le_bytes());
        wave.extend_from_slice(&1u16.to_le_bytes());
        wave.extend_from_slice(&8_000u32.to_le_bytes());
        wave.extend_from_slice(&16_000u32.to_le_bytes());
        wave.extend_from_slice(&2u16.to_le_bytes());
        wave.extend_from_slice(&16u16.to_le_bytes());

        let streams = vec![
            list(
                b"strl",
                &[
                    strh(b"vids", 1, 25, 2),
                    bitmap(2, 2, 24, &[0; 4]),
                    chunk(b"strn", b"camera\0"),
                ],
            ),
            list(b"strl", &[strh(b"auds", 2, 16_000, 4), chunk(b"strf", &wave)]),
        ];
        let frame = vec![0u8; 16];
        let movi = vec![
            chunk(b"00db", &frame),
            chunk(b"01wb", &[0u8; 4]),
            list(b"rec ", &[chunk(b"00db", &frame), chunk(b"01wb", &[0u8; 4])]),
        ];
        let (info, packets) = read_all(avi(streams, movi));

        assert_eq!(info.streams.len(), 2);
        assert_eq!(info.duration, Some(Duration::from_millis(80)));
        let video = &info.streams[0];
        assert_eq!(video.time_base, Rational::new(1, 25));
        assert_eq!(video.metadata.get("title"), Some("camera"));
        let params = video.params.as_video().unwrap();
        assert_eq!(params.pixel_format, Some(PixelFormat::Bgr24));
        assert!(params.bottom_up);
        let audio = &info.streams[1];
        assert_eq!(audio.params.codec_id, CodecId::PcmS16Le);
        assert_eq!(audio.time_base, Rational::new(1, 8_000));
        assert_eq!(audio.duration, Some(4));

        let seen: Vec<(usize, Option<i64>)> = packets.iter().map(|p| (p.stream_index, p.pts)).collect();
        assert_eq!(seen, vec![(0, Some(0)), (1, Some(0)), (0, Some(1)), (1, Some(2))]);
    }

    #[test]
    fn test_yv12_and_text_stream() {
        let streams = vec![
            list(b"strl", &[strh(b"vids", 1, 30, 1), bitmap(4, -4, 12, b"YV12")]),
            list(b"strl", &[strh(b"txts", 1, 30, 1)]),
        ];
        let (info, packets) = read_all(avi(streams, vec![chunk(b"00dc", &[0u8; 24]), chunk(b"01tx", b"hi")]));
        let video = info.streams[0].params.as_video().unwrap();
        assert_eq!(video.pixel_format, Some(PixelFormat::Yuv420p));
        assert!(video.swap_uv);
        assert!(!video.bottom_up);
        assert_eq!(info.streams[1].kind, MediaKind::Data);
        assert_eq!(packets.len(), 2);
        assert!(packets[0].flags.keyframe);
    }

    #[test]
    fn test_oversized_chunk_length_is_truncated() {
        let streams = vec![list(b"strl", &[strh(b"vids", 1, 25, 1), bitmap(2, 2, 24, &[0; 4])])];
        // A data chunk claiming 1.5 GiB with only 16 bytes behind it
        let mut bogus = b"00db".to_vec();
        bogus.extend_from_slice(&0x6000_0000u32.to_le_bytes());
        bogus.extend_from_slice(&[7u8; 16]);
        let (_, packets) = read_all(avi(streams, vec![bogus]));

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data(), &[7u8; 16]);
        assert!(packets[0].flags.corrupt);
        assert!(packets[0].capacity() < 64 * 1024, "capacity {}", packets[0].capacity());
    }

    #[test]
    fn test_missing_hdrl_is_format_error() {
        let mut body = b"AVI ".to_vec();
        body.extend(list(b"movi", &[]));
        let data = chunk(b"RIFF", &body);
        let mut io = IoContext::new(SourceBinding::owned(MemorySource::new(data)));
        let mut demuxer = AviFactory.create(&Config::default(), &Logger::discard());
        assert!(matches!(demuxer.read_header(&mut io), Err(AvError::Format(_))));
    }
}
