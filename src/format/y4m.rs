use super::{ContainerInfo, Demuxer, DemuxerFactory, ReadStatus, Stream};
use crate::av::{CodecId, CodecParameters, Metadata, Packet, PixelFormat, Rational, VideoParams};
use crate::config::Config;
use crate::io::IoContext;
use crate::logging::{self, Logger};
use crate::{AvError, Result};

const MAGIC: &[u8] = b"YUV4MPEG2";
const FRAME: &[u8] = b"FRAME";
const MAX_LINE: usize = 4096;
/// Largest picture accepted from a header, 1 GiB.
const MAX_FRAME_BYTES: usize = 1 << 30;

pub(crate) struct Y4mFactory;

impl DemuxerFactory for Y4mFactory {
    fn name(&self) -> &'static str {
        "y4m"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["y4m"]
    }

    fn probe(&self, data: &[u8]) -> u32 {
        if data.starts_with(MAGIC) {
            100
        } else {
            0
        }
    }

    fn create(&self, _config: &Config, logger: &Logger) -> Box<dyn Demuxer> {
        Box::new(Y4mDemuxer {
            logger: logger.clone(),
            frame_size: 0,
            frames_read: 0,
        })
    }
}

/// YUV4MPEG2 reader: a text header, then `FRAME` lines each followed by one
/// raw picture.
struct Y4mDemuxer {
    logger: Logger,
    frame_size: usize,
    frames_read: i64,
}

/// Reads up to and excluding the next `\n`. `None` at a clean end of stream.
fn read_line(io: &mut IoContext) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    loop {
        let Some([byte]) = io.try_read_array::<1>()? else {
            return if line.is_empty() {
                Ok(None)
            } else {
                Err(AvError::format("unterminated header line"))
            };
        };
        if byte == b'\n' {
            return Ok(Some(line));
        }
        if line.len() == MAX_LINE {
            return Err(AvError::format(format!("header line longer than {MAX_LINE} bytes")));
        }
        line.push(byte);
    }
}

fn parse_ratio(token: &str) -> Result<Rational> {
    let (num, den) = token
        .split_once(':')
        .ok_or_else(|| AvError::format(format!("expected n:d, got {token:?}")))?;
    let parse = |s: &str| {
        s.parse::<i32>()
            .map_err(|_| AvError::format(format!("bad ratio {token:?}")))
    };
    Ok(Rational::new(parse(num)?, parse(den)?))
}

fn parse_colorspace(token: &str) -> Result<PixelFormat> {
    match token {
        "420" | "420jpeg" | "420paldv" | "420mpeg2" => Ok(PixelFormat::Yuv420p),
        "422" => Ok(PixelFormat::Yuv422p),
        "444" => Ok(PixelFormat::Yuv444p),
        "mono" => Ok(PixelFormat::Gray8),
        other => Err(AvError::UnsupportedFormat(format!("y4m colorspace C{other}"))),
    }
}

impl Demuxer for Y4mDemuxer {
    fn read_header(&mut self, io: &mut IoContext) -> Result<ContainerInfo> {
        let line = read_line(io)?.ok_or_else(|| AvError::format("empty y4m stream"))?;
        let line = String::from_utf8(line).map_err(|_| AvError::format("y4m header is not text"))?;
        let mut tokens = line.split_ascii_whitespace();
        if tokens.next().map(str::as_bytes) != Some(MAGIC) {
            return Err(AvError::format("missing YUV4MPEG2 signature"));
        }

        let mut width = 0u32;
        let mut height = 0u32;
        let mut frame_rate = None;
        let mut pixel_format = PixelFormat::Yuv420p;
        let mut metadata = Metadata::new();
        for token in tokens {
            let (tag, value) = token.split_at(1);
            let number = || {
                value
                    .parse::<u32>()
                    .map_err(|_| AvError::format(format!("bad y4m token {token:?}")))
            };
            match tag {
                "W" => width = number()?,
                "H" => height = number()?,
                "F" => frame_rate = Some(parse_ratio(value)?),
                "C" => pixel_format = parse_colorspace(value)?,
                "A" => {
                    let aspect = parse_ratio(value)?;
                    if !aspect.is_unknown() {
                        metadata.insert("sample_aspect_ratio", aspect.to_string());
                    }
                }
                "I" => {
                    let order = match value {
                        "p" => "progressive",
                        "t" => "top_first",
                        "b" => "bottom_first",
                        "m" => "mixed",
                        _ => "unknown",
                    };
                    metadata.insert("field_order", order);
                }
                "X" => match value.split_once('=') {
                    Some((key, val)) => metadata.insert(key.to_ascii_lowercase(), val),
                    None => metadata.insert("comment", value),
                },
                _ => logging::av_debug!(self.logger, "Y4M: ignoring token {}", token),
            }
        }
        if width == 0 || height == 0 {
            return Err(AvError::format("y4m header lacks W or H"));
        }
        let frame_rate = frame_rate
            .filter(|r| !r.is_unknown())
            .unwrap_or(Rational::new(25, 1));
        self.frame_size = pixel_format
            .image_size(width, height)
            .filter(|&size| size <= MAX_FRAME_BYTES)
            .ok_or_else(|| AvError::format(format!("y4m picture {width}x{height} {pixel_format} is too large")))?;

        let params = CodecParameters::video(
            CodecId::RawVideo,
            VideoParams {
                width,
                height,
                pixel_format: Some(pixel_format),
                frame_rate: Some(frame_rate),
                ..VideoParams::default()
            },
        );
        let mut stream = Stream::new(0, params, frame_rate.invert());
        stream.metadata = metadata;

        // With a known size and no per-frame parameters the frame count is exact.
        let header_len = io.position();
        if let Some(size) = io.size() {
            let per_frame = (FRAME.len() + 1 + self.frame_size) as u64;
            let body = size.saturating_sub(header_len);
            if body % per_frame == 0 {
                let frames = body / per_frame;
                stream = stream.with_duration(frames as i64).with_frame_count(frames);
            }
        }
        let duration = stream.duration_time();

        logging::av_debug!(
            self.logger,
            "Y4M: {}x{} {} at {} fps",
            width,
            height,
            pixel_format,
            frame_rate
        );
        Ok(ContainerInfo {
            streams: vec![stream],
            duration,
            ..ContainerInfo::default()
        })
    }

    fn read_packet(&mut self, io: &mut IoContext, packet: &mut Packet) -> Result<ReadStatus> {
        let offset = io.position();
        let Some(line) = read_line(io)? else {
            return Ok(ReadStatus::EndOfStream);
        };
        if !line.starts_with(FRAME) {
            return Err(AvError::format(format!("expected FRAME at offset {offset}")));
        }

        let got = io.read_into(packet.payload_mut(), self.frame_size)?;
        if got < self.frame_size {
            logging::av_warn!(
                self.logger,
                "Y4M: dropping truncated frame {} ({} of {} bytes)",
                self.frames_read,
                got,
                self.frame_size
            );
            packet.payload_mut().clear();
            return Ok(ReadStatus::EndOfStream);
        }

        packet.stream_index = 0;
        packet.pts = Some(self.frames_read);
        packet.dts = Some(self.frames_read);
        packet.duration = Some(1);
        packet.flags.keyframe = true;
        packet.pos = Some(offset);
        self.frames_read += 1;
        Ok(ReadStatus::Populated)
    }
}
