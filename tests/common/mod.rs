//! Container builders shared by the integration tests.
#![allow(dead_code)]

use avpipe::config::Config;
use avpipe::format::ContainerSession;
use avpipe::io::{MemorySource, SourceBinding};
use avpipe::logging::Logger;
use avpipe::utils::Crc32Mpeg2;

pub fn open(data: Vec<u8>) -> ContainerSession {
    let source = SourceBinding::owned(MemorySource::new(data));
    ContainerSession::open(source, None, &Config::default(), Logger::discard()).unwrap()
}

pub fn riff_chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    out
}

pub fn riff_list(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let mut body = kind.to_vec();
    for child in children {
        body.extend_from_slice(child);
    }
    riff_chunk(b"LIST", &body)
}

/// A WAVEFORMATEX body for integer PCM.
pub fn wave_format(channels: u16, rate: u32, bits: u16) -> Vec<u8> {
    let block_align = channels * bits / 8;
    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&channels.to_le_bytes());
    body.extend_from_slice(&rate.to_le_bytes());
    body.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
    body.extend_from_slice(&block_align.to_le_bytes());
    body.extend_from_slice(&bits.to_le_bytes());
    body
}

/// A 16-bit PCM WAV file holding interleaved `samples`.
pub fn wav(channels: u16, rate: u32, samples: &[i16]) -> Vec<u8> {
    let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let mut body = b"WAVE".to_vec();
    body.extend(riff_chunk(b"fmt ", &wave_format(channels, rate, 16)));
    body.extend(riff_chunk(b"data", &data));
    riff_chunk(b"RIFF", &body)
}

/// A YUV4MPEG2 stream at 25 fps.
pub fn y4m(width: u32, height: u32, colorspace: &str, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut out = format!("YUV4MPEG2 W{width} H{height} F25:1 Ip A1:1 C{colorspace}\n").into_bytes();
    for frame in frames {
        out.extend_from_slice(b"FRAME\n");
        out.extend_from_slice(frame);
    }
    out
}

/// One planar 4:2:0 picture with constant planes.
pub fn yuv420_frame(width: usize, height: usize, y: u8, u: u8, v: u8) -> Vec<u8> {
    let chroma = width.div_ceil(2) * height.div_ceil(2);
    let mut frame = vec![y; width * height];
    frame.extend(std::iter::repeat(u).take(chroma));
    frame.extend(std::iter::repeat(v).take(chroma));
    frame
}

pub fn avi_stream_header(kind: &[u8; 4], scale: u32, rate: u32, length: u32) -> Vec<u8> {
    let mut body = kind.to_vec();
    body.extend_from_slice(&[0u8; 16]);
    body.extend_from_slice(&scale.to_le_bytes());
    body.extend_from_slice(&rate.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&length.to_le_bytes());
    body.extend_from_slice(&[0u8; 20]);
    riff_chunk(b"strh", &body)
}

/// An uncompressed BITMAPINFOHEADER.
pub fn avi_bitmap(width: i32, height: i32, bits: u16) -> Vec<u8> {
    let mut body = 40u32.to_le_bytes().to_vec();
    body.extend_from_slice(&width.to_le_bytes());
    body.extend_from_slice(&height.to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&bits.to_le_bytes());
    body.extend_from_slice(&[0u8; 24]);
    riff_chunk(b"strf", &body)
}

pub fn avi(streams: Vec<Vec<u8>>, movi: Vec<Vec<u8>>) -> Vec<u8> {
    let mut avih = vec![0u8; 56];
    avih[0..4].copy_from_slice(&40_000u32.to_le_bytes());
    avih[24..28].copy_from_slice(&(streams.len() as u32).to_le_bytes());
    let mut hdrl = vec![riff_chunk(b"avih", &avih)];
    hdrl.extend(streams);
    let mut body = b"AVI ".to_vec();
    body.extend(riff_list(b"hdrl", &hdrl));
    body.extend(riff_list(b"movi", &movi));
    riff_chunk(b"RIFF", &body)
}

pub const STREAM_TYPE_AAC: u8 = 0x0F;
pub const STREAM_TYPE_H264: u8 = 0x1B;

/// Writes 188-byte transport stream packets.
#[derive(Default)]
pub struct TsWriter {
    out: Vec<u8>,
    counters: std::collections::HashMap<u16, u8>,
}

impl TsWriter {
    fn packet(&mut self, pid: u16, unit_start: bool, payload: &[u8]) -> usize {
        let take = payload.len().min(184);
        let stuffing = 184 - take;
        let cc = self.counters.entry(pid).or_insert(0);
        let counter = *cc;
        *cc = (*cc + 1) & 0x0F;

        self.out.push(0x47);
        self.out.push((u8::from(unit_start) << 6) | (pid >> 8) as u8);
        self.out.push(pid as u8);
        if stuffing > 0 {
            self.out.push(0x30 | counter);
            self.out.push((stuffing - 1) as u8);
            if stuffing > 1 {
                self.out.push(0x00);
                self.out.extend(std::iter::repeat(0xFF).take(stuffing - 2));
            }
        } else {
            self.out.push(0x10 | counter);
        }
        self.out.extend_from_slice(&payload[..take]);
        take
    }

    fn section(&mut self, pid: u16, table_id: u8, extension: u16, body: &[u8]) {
        let length = 5 + body.len() + 4;
        let mut section = vec![table_id, 0xB0 | (length >> 8) as u8, length as u8];
        section.extend_from_slice(&extension.to_be_bytes());
        section.extend_from_slice(&[0xC1, 0x00, 0x00]);
        section.extend_from_slice(body);
        let crc = Crc32Mpeg2::checksum(&section);
        section.extend_from_slice(&crc.to_be_bytes());

        let mut payload = vec![0x00];
        payload.extend_from_slice(&section);
        payload.resize(184, 0xFF);
        self.packet(pid, true, &payload);
    }

    pub fn pat(&mut self, programs: &[(u16, u16)]) {
        let mut body = Vec::new();
        for &(program, pid) in programs {
            body.extend_from_slice(&program.to_be_bytes());
            body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
        }
        self.section(0x0000, 0x00, 1, &body);
    }

    /// PMT listing `(stream_type, pid)` entries.
    pub fn pmt(&mut self, pid: u16, program: u16, streams: &[(u8, u16)]) {
        let pcr_pid = streams.first().map_or(0x1FFF, |s| s.1);
        let mut body = (0xE000 | pcr_pid).to_be_bytes().to_vec();
        body.extend_from_slice(&[0xF0, 0x00]);
        for &(stream_type, es_pid) in streams {
            body.push(stream_type);
            body.extend_from_slice(&(0xE000 | es_pid).to_be_bytes());
            body.extend_from_slice(&[0xF0, 0x00]);
        }
        self.section(pid, 0x02, program, &body);
    }

    /// One unbounded PES unit with a PTS.
    pub fn pes(&mut self, pid: u16, stream_id: u8, pts: i64, data: &[u8]) {
        let mut unit = vec![0x00, 0x00, 0x01, stream_id, 0x00, 0x00, 0x80, 0x80, 0x05];
        unit.extend_from_slice(&[
            0x21 | ((pts >> 29) & 0x0E) as u8,
            (pts >> 22) as u8,
            ((pts >> 14) & 0xFE) as u8 | 1,
            (pts >> 7) as u8,
            ((pts << 1) & 0xFE) as u8 | 1,
        ]);
        unit.extend_from_slice(data);

        let mut offset = self.packet(pid, true, &unit);
        while offset < unit.len() {
            offset += self.packet(pid, false, &unit[offset..]);
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// An ADTS frame of `len` bytes: AAC-LC, 48 kHz, stereo.
pub fn adts_frame(len: usize) -> Vec<u8> {
    let mut frame = vec![0xFF, 0xF1, 0x4C, 0x80, 0, 0, 0xFC];
    frame[3] |= ((len >> 11) & 0x03) as u8;
    frame[4] = (len >> 3) as u8;
    frame[5] = (((len & 0x07) << 5) as u8) | 0x1F;
    frame.resize(len, 0x21);
    frame
}
