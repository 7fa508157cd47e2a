use super::riff::{self, WaveFormat};
use super::{ContainerInfo, Demuxer, DemuxerFactory, ReadStatus, Stream};
use crate::av::{Metadata, Packet, Rational};
use crate::config::Config;
use crate::io::IoContext;
use crate::logging::{self, Logger};
use crate::{AvError, Result};

pub(crate) struct WavFactory;

impl DemuxerFactory for WavFactory {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["wav", "wave"]
    }

    fn probe(&self, data: &[u8]) -> u32 {
        if riff::is_riff_form(data, b"WAVE") {
            100
        } else {
            0
        }
    }

    fn create(&self, config: &Config, logger: &Logger) -> Box<dyn Demuxer> {
        Box::new(WavDemuxer {
            packet_samples: config.audio_packet_samples.max(1),
            logger: logger.clone(),
            block_align: 0,
            remaining: None,
            samples_read: 0,
        })
    }
}

/// RIFF WAVE reader. Everything up to the `data` chunk is parsed up front;
/// the payload is then cut into packets of whole sample frames.
struct WavDemuxer {
    packet_samples: usize,
    logger: Logger,
    block_align: usize,
    /// Payload bytes left, `None` when the header gave no usable size
    remaining: Option<u64>,
    samples_read: i64,
}

impl Demuxer for WavDemuxer {
    fn read_header(&mut self, io: &mut IoContext) -> Result<ContainerInfo> {
        let preamble = io.read_array::<12>()?;
        if !riff::is_riff_form(&preamble, b"WAVE") {
            return Err(AvError::format("missing RIFF/WAVE preamble"));
        }

        let mut format = None;
        let mut metadata = Metadata::new();
        let data_size = loop {
            let header = riff::read_chunk_header(io)?
                .ok_or_else(|| AvError::format("no data chunk before end of file"))?;
            match &header.id {
                b"fmt " => format = Some(WaveFormat::parse(&riff::read_chunk_body(io, &header)?)?),
                b"LIST" => {
                    let body = riff::read_chunk_body(io, &header)?;
                    if body.starts_with(b"INFO") {
                        riff::parse_info(&body[4..], &mut metadata);
                    }
                }
                b"data" => break header.size,
                other => {
                    logging::av_trace!(self.logger, "Skipping WAV chunk {}", riff::fourcc(other));
                    io.skip(header.padded_size());
                }
            }
        };

        let format = format.ok_or_else(|| AvError::format("data chunk before fmt chunk"))?;
        let params = format.codec_parameters()?;
        self.block_align = params.as_audio().map(|a| a.block_align).unwrap_or(1).max(1);
        // Streaming writers leave the size at 0 or all ones.
        self.remaining = match data_size {
            0 | u32::MAX => None,
            n => Some(u64::from(n)),
        };

        let mut stream = Stream::new(0, params, Rational::new(1, format.sample_rate as i32));
        if let Some(bytes) = self.remaining {
            let frames = bytes / self.block_align as u64;
            stream = stream.with_duration(frames as i64).with_frame_count(frames);
        }
        let duration = stream.duration_time();

        logging::av_debug!(
            self.logger,
            "WAV: {} Hz, {} channel(s), {} bits, data size {:?}",
            format.sample_rate,
            format.channels,
            format.bits_per_sample,
            self.remaining
        );

        Ok(ContainerInfo {
            streams: vec![stream],
            metadata,
            programs: Vec::new(),
            duration,
        })
    }

    fn read_packet(&mut self, io: &mut IoContext, packet: &mut Packet) -> Result<ReadStatus> {
        let mut want = (self.packet_samples * self.block_align) as u64;
        if let Some(remaining) = self.remaining {
            want = want.min(remaining);
        }
        let want = want as usize / self.block_align * self.block_align;
        if want == 0 {
            return Ok(ReadStatus::EndOfStream);
        }

        let offset = io.position();
        let got = io.read_into(packet.payload_mut(), want)?;
        let whole = got / self.block_align * self.block_align;
        if whole < got {
            logging::av_warn!(
                self.logger,
                "WAV: dropping {} trailing byte(s) of a partial sample frame",
                got - whole
            );
            packet.payload_mut().truncate(whole);
        }
        if whole == 0 {
            self.remaining = Some(0);
            return Ok(ReadStatus::EndOfStream);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= got as u64;
        }

        let samples = (whole / self.block_align) as i64;
        packet.stream_index = 0;
        packet.pts = Some(self.samples_read);
        packet.dts = Some(self.samples_read);
        packet.duration = Some(samples);
        packet.flags.keyframe = true;
        packet.pos = Some(offset);
        self.samples_read += samples;
        Ok(ReadStatus::Populated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{ChannelLayout, CodecId};
    use crate::io::{CallbackSource, MemorySource, SourceBinding};
    use pretty_assertions::assert_eq;

    fn wav(samples: usize, with_info: bool) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&8_000u32.to_le_bytes());
        body.extend_from_slice(&32_000u32.to_le_bytes());
        body.extend_from_slice(&4u16.to_le_bytes());
        body.extend_from_slice(&16u16.to_le_bytes());
        if with_info {
            let mut info = b"INFO".to_vec();
            info.extend_from_slice(b"INAM");
            info.extend_from_slice(&3u32.to_le_bytes());
            info.extend_from_slice(b"abc\0");
            body.extend_from_slice(b"LIST");
            body.extend_from_slice(&(info.len() as u32).to_le_bytes());
            body.extend_from_slice(&info);
        }
        body.extend_from_slice(b"data");
        body.extend_from_slice(&((samples * 4) as u32).to_le_bytes());
        for i in 0..samples {
            body.extend_from_slice(&(i as i16).to_le_bytes());
            body.extend_from_slice(&(-(i as i16)).to_le_bytes());
        }
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    fn demux(io: &mut IoContext, packet_samples: usize) -> (ContainerInfo, Vec<Packet>) {
        let config = Config {
            audio_packet_samples: packet_samples,
            ..Config::default()
        };
        let mut demuxer = WavFactory.create(&config, &Logger::discard());
        let info = demuxer.read_header(io).unwrap();
        let mut packets = Vec::new();
        loop {
            let mut packet = Packet::new();
            if demuxer.read_packet(io, &mut packet).unwrap() == ReadStatus::EndOfStream {
                break;
            }
            packets.push(packet);
        }
        (info, packets)
    }

    #[test]
    fn test_header_and_packets() {
        let mut io = IoContext::new(SourceBinding::owned(MemorySource::new(wav(10, true))));
        let (info, packets) = demux(&mut io, 4);

        let stream = &info.streams[0];
        assert_eq!(stream.params.codec_id, CodecId::PcmS16Le);
        assert_eq!(
            stream.params.as_audio().unwrap().channel_layout,
            Some(ChannelLayout::Stereo)
        );
        assert_eq!(stream.time_base, Rational::new(1, 8_000));
        assert_eq!(stream.duration, Some(10));
        assert_eq!(info.metadata.get("title"), Some("abc"));

        let sizes: Vec<usize> = packets.iter().map(Packet::len).collect();
        assert_eq!(sizes, vec![16, 16, 8]);
        let pts: Vec<Option<i64>> = packets.iter().map(|p| p.pts).collect();
        assert_eq!(pts, vec![Some(0), Some(4), Some(8)]);
    }

    #[test]
    fn test_sequential_source() {
        let data = wav(5, false);
        let mut offset = 0;
        let source = CallbackSource::new(move |buf: &mut [u8]| {
            let n = buf.len().min(data.len() - offset);
            buf[..n].copy_from_slice(&data[offset..offset + n]);
            offset += n;
            Ok(n)
        });
        let mut io = IoContext::new(SourceBinding::owned(source));
        io.probe(16).unwrap();
        let (_, packets) = demux(&mut io, 1024);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 20);
    }

    #[test]
    fn test_truncated_data_stops_cleanly() {
        let mut data = wav(4, false);
        data.truncate(data.len() - 5);
        let mut io = IoContext::new(SourceBinding::owned(MemorySource::new(data)));
        let (_, packets) = demux(&mut io, 1024);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 8);
    }

    #[test]
    fn test_probe_score() {
        assert_eq!(WavFactory.probe(&wav(1, false)), 100);
        assert_eq!(WavFactory.probe(b"RIFF\0\0\0\0AVI "), 0);
    }
}
