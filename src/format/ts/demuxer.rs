use super::parser::TSPacketParser;
use super::types::*;
use crate::av::{CodecId, CodecParameters, MediaKind, Metadata, Packet, Rational};
use crate::codec::aac::AdtsHeader;
use crate::codec::h264;
use crate::codec::mpeg_audio::MpegAudioHeader;
use crate::config::Config;
use crate::format::{ContainerInfo, Demuxer, DemuxerFactory, Program, ReadStatus, Stream};
use crate::io::IoContext;
use crate::logging::{self, Logger};
use crate::{AvError, Result};
use bytes::BytesMut;
use std::collections::{HashMap, VecDeque};

type RawPacket = [u8; TS_PACKET_SIZE];

/// Packet size and sync byte offset of the first layout that lines up, with
/// the number of packets that matched and whether the data ran out (rather
/// than a sync byte going missing).
fn detect_layout(data: &[u8]) -> Option<(usize, usize, usize, bool)> {
    [(TS_PACKET_SIZE, 0), (M2TS_PACKET_SIZE, 4)]
        .into_iter()
        .map(|(size, offset)| {
            let matched = (0..)
                .take_while(|k| data.get(offset + k * size) == Some(&SYNC_BYTE))
                .count();
            let ran_out = offset + matched * size >= data.len();
            (size, offset, matched, ran_out)
        })
        .filter(|&(_, _, matched, _)| matched > 0)
        .max_by_key(|&(size, _, matched, _)| (matched, size == TS_PACKET_SIZE))
}

/// Detects and creates [`TsDemuxer`]s.
pub struct TsFactory;

impl DemuxerFactory for TsFactory {
    fn name(&self) -> &'static str {
        "mpegts"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "m2ts", "mts"]
    }

    fn probe(&self, data: &[u8]) -> u32 {
        match detect_layout(data) {
            Some((_, _, matched, _)) if matched >= 3 => 100,
            Some((_, _, _, true)) if data.len() >= TS_PACKET_SIZE => 25,
            _ => 0,
        }
    }

    fn create(&self, config: &Config, logger: &Logger) -> Box<dyn Demuxer> {
        Box::new(TsDemuxer::new(config, logger.clone()))
    }
}

/// A PES unit being reassembled.
struct PesBuffer {
    data: BytesMut,
    pts: Option<i64>,
    dts: Option<i64>,
    keyframe: bool,
    corrupt: bool,
    pos: u64,
    /// Declared payload size of a bounded PES
    expected: Option<usize>,
}

/// Demuxing state of one elementary PID.
struct PidState {
    stream_index: usize,
    kind: MediaKind,
    codec: CodecId,
    last_cc: Option<u8>,
    pes: Option<PesBuffer>,
}

impl PidState {
    fn is_complete(&self) -> bool {
        self.pes
            .as_ref()
            .is_some_and(|pes| pes.expected.is_some_and(|n| pes.data.len() >= n))
    }

    /// Turns the unit in progress into a packet.
    fn flush(&mut self, ready: &mut VecDeque<Packet>) {
        let Some(mut pes) = self.pes.take() else {
            return;
        };
        if let Some(expected) = pes.expected {
            if pes.data.len() < expected {
                pes.corrupt = true;
            } else {
                pes.data.truncate(expected);
            }
        }
        if pes.data.is_empty() {
            return;
        }

        let mut packet = Packet::new();
        packet.flags.keyframe =
            pes.keyframe || (self.codec == CodecId::H264 && h264::contains_idr(&pes.data));
        packet.flags.corrupt = pes.corrupt;
        *packet.payload_mut() = pes.data;
        packet.stream_index = self.stream_index;
        packet.pts = pes.pts;
        packet.dts = pes.dts.or(pes.pts);
        packet.pos = Some(pes.pos);
        ready.push_back(packet);
    }
}

/// MPEG-2 transport stream reader.
///
/// The header scan reads packets until the PAT and every PMT it lists have
/// been seen; packets read along the way are kept and demuxed afterwards, so
/// nothing is lost on sequential sources.
pub struct TsDemuxer {
    logger: Logger,
    probe_window: usize,
    parser: TSPacketParser,
    sync_offset: usize,
    pids: HashMap<u16, PidState>,
    pending: VecDeque<(u64, RawPacket)>,
    ready: VecDeque<Packet>,
    eof: bool,
    scrambled_warned: bool,
}

impl TsDemuxer {
    /// Creates a demuxer that has not read anything yet.
    pub fn new(config: &Config, logger: Logger) -> Self {
        Self {
            logger,
            probe_window: config.probe_window,
            parser: TSPacketParser::new(),
            sync_offset: 0,
            pids: HashMap::new(),
            pending: VecDeque::new(),
            ready: VecDeque::new(),
            eof: false,
            scrambled_warned: false,
        }
    }

    /// Reads the next 188-byte packet, skipping M2TS prefixes and garbage
    /// between packets. Returns its offset in the stream.
    fn read_raw(&mut self, io: &mut IoContext) -> Result<Option<(u64, RawPacket)>> {
        io.skip(self.sync_offset as u64);
        let mut pos = io.position();
        let mut buf = [0u8; TS_PACKET_SIZE];
        let mut filled = io.read_exact_or_eof(&mut buf)?;
        let mut discarded = 0;
        loop {
            if filled < TS_PACKET_SIZE {
                if filled > 0 {
                    logging::av_warn!(
                        self.logger,
                        "TS: dropping {filled} byte(s) of a truncated packet at offset {pos}"
                    );
                }
                return Ok(None);
            }
            if buf[0] == SYNC_BYTE {
                break;
            }
            let shift = buf[1..]
                .iter()
                .position(|&b| b == SYNC_BYTE)
                .map_or(TS_PACKET_SIZE, |p| p + 1);
            buf.copy_within(shift.., 0);
            filled -= shift;
            discarded += shift;
            pos += shift as u64;
            filled += io.read_exact_or_eof(&mut buf[filled..])?;
        }
        if discarded > 0 {
            logging::av_warn!(self.logger, "TS: lost sync, skipped {discarded} byte(s)");
        }
        Ok(Some((pos, buf)))
    }

    fn process(&mut self, raw: &RawPacket, pos: u64) -> Result<()> {
        let header = self.parser.parse_header(raw)?;
        if header.transport_error {
            logging::av_trace!(self.logger, "TS: transport error on PID {}", header.pid);
            return Ok(());
        }
        let Some(state) = self.pids.get_mut(&header.pid) else {
            return Ok(());
        };
        if header.scrambling_control != 0 {
            if !self.scrambled_warned {
                logging::av_warn!(self.logger, "TS: skipping scrambled packets on PID {}", header.pid);
                self.scrambled_warned = true;
            }
            return Ok(());
        }

        let adaptation = match self.parser.parse_adaptation_field(raw, &header) {
            Ok(adaptation) => adaptation.unwrap_or_default(),
            Err(err) => {
                logging::av_warn!(self.logger, "TS: PID {}: {err}", header.pid);
                if let Some(pes) = state.pes.as_mut() {
                    pes.corrupt = true;
                }
                return Ok(());
            }
        };

        if header.contains_payload {
            if let Some(last) = state.last_cc {
                if !adaptation.discontinuity {
                    if header.continuity_counter == last {
                        // Duplicate packet
                        return Ok(());
                    }
                    if header.continuity_counter != (last + 1) & 0x0F {
                        logging::av_debug!(
                            self.logger,
                            "TS: continuity gap on PID {} ({} -> {})",
                            header.pid,
                            last,
                            header.continuity_counter
                        );
                        if let Some(pes) = state.pes.as_mut() {
                            pes.corrupt = true;
                        }
                    }
                }
            }
            state.last_cc = Some(header.continuity_counter);
        }

        let payload = self.parser.payload(raw, &header)?;
        if payload.is_empty() {
            return Ok(());
        }
        if header.payload_unit_start {
            state.flush(&mut self.ready);
            match self.parser.parse_pes_header(payload) {
                Ok(pes) => {
                    let body = &payload[pes.header_len.min(payload.len())..];
                    state.pes = Some(PesBuffer {
                        data: BytesMut::from(body),
                        pts: pes.pts,
                        dts: pes.dts,
                        keyframe: adaptation.random_access || state.kind == MediaKind::Audio,
                        corrupt: false,
                        pos,
                        expected: pes.payload_len(),
                    });
                }
                Err(err) => {
                    logging::av_warn!(self.logger, "TS: PID {}: {err}, dropping unit", header.pid);
                }
            }
        } else if let Some(pes) = state.pes.as_mut() {
            pes.data.extend_from_slice(payload);
        }

        if state.is_complete() {
            state.flush(&mut self.ready);
        }
        Ok(())
    }

    /// Emits the units still in progress, in stream order.
    fn flush_all(&mut self) {
        let mut states: Vec<&mut PidState> = self.pids.values_mut().collect();
        states.sort_by_key(|state| state.stream_index);
        for state in states {
            state.flush(&mut self.ready);
        }
    }
}

impl Demuxer for TsDemuxer {
    fn read_header(&mut self, io: &mut IoContext) -> Result<ContainerInfo> {
        let (packet_size, sync_offset, _, _) = detect_layout(io.probe(M2TS_PACKET_SIZE * 4)?)
            .ok_or_else(|| AvError::format("no MPEG-TS sync byte pattern"))?;
        self.sync_offset = sync_offset;

        let mut pat: Option<PAT> = None;
        let mut pmts: HashMap<u16, PMT> = HashMap::new();
        let start = io.position();
        while pat
            .as_ref()
            .map_or(true, |pat| pat.programs().any(|e| !pmts.contains_key(&e.program_number)))
        {
            if io.position() - start >= self.probe_window as u64 {
                break;
            }
            let Some((pos, raw)) = self.read_raw(io)? else {
                break;
            };
            self.pending.push_back((pos, raw));

            let header = self.parser.parse_header(&raw)?;
            if header.transport_error {
                continue;
            }
            let is_pat = header.pid == PID_PAT;
            let is_pmt = pat
                .as_ref()
                .is_some_and(|pat| pat.programs().any(|e| e.pid == header.pid));
            if !is_pat && !is_pmt {
                continue;
            }
            let payload = self.parser.payload(&raw, &header)?;
            for data in self.parser.push_section_data(header.pid, header.payload_unit_start, payload) {
                let section = match self.parser.parse_section(&data) {
                    Ok(section) if section.current_next => section,
                    Ok(_) => continue,
                    Err(err) => {
                        logging::av_warn!(self.logger, "TS: PID {}: {err}", header.pid);
                        continue;
                    }
                };
                match section.table_id {
                    TABLE_ID_PAT if is_pat && pat.is_none() => {
                        pat = Some(self.parser.parse_pat(&section)?);
                    }
                    TABLE_ID_PMT if is_pmt => {
                        let pmt = self.parser.parse_pmt(&section)?;
                        let listed = pat
                            .as_ref()
                            .is_some_and(|pat| pat.programs().any(|e| e.program_number == pmt.program_number));
                        if listed {
                            pmts.entry(pmt.program_number).or_insert(pmt);
                        }
                    }
                    _ => {}
                }
            }
        }

        let scanned = io.position() - start;
        let pat = pat.ok_or_else(|| {
            AvError::format(format!("no program association table in the first {scanned} bytes"))
        })?;
        if pmts.is_empty() {
            return Err(AvError::format(format!(
                "no program map table in the first {scanned} bytes"
            )));
        }

        let mut streams: Vec<Stream> = Vec::new();
        let mut programs = Vec::new();
        for entry in pat.programs() {
            let Some(pmt) = pmts.get(&entry.program_number) else {
                logging::av_warn!(
                    self.logger,
                    "TS: program {} has no PMT within the probe window",
                    entry.program_number
                );
                continue;
            };
            let mut members = Vec::new();
            for es in &pmt.elementary_stream_infos {
                let index = match self.pids.get(&es.elementary_pid) {
                    Some(state) => state.stream_index,
                    None => {
                        let index = streams.len();
                        let mut stream = Stream::new(index, es.codec_parameters(), Rational::MPEG_90K)
                            .with_id(u32::from(es.elementary_pid))
                            .with_kind(es.media_kind());
                        if let Some(language) = es.language() {
                            stream.metadata.insert("language", language);
                        }
                        self.pids.insert(
                            es.elementary_pid,
                            PidState {
                                stream_index: index,
                                kind: stream.kind,
                                codec: stream.params.codec_id,
                                last_cc: None,
                                pes: None,
                            },
                        );
                        streams.push(stream);
                        index
                    }
                };
                if !members.contains(&index) {
                    members.push(index);
                }
            }
            programs.push(Program {
                id: u32::from(entry.program_number),
                streams: members,
                metadata: Metadata::new(),
            });
        }

        logging::av_debug!(
            self.logger,
            "TS: {}-byte packets, {} program(s), {} stream(s), header scan {} bytes",
            packet_size,
            programs.len(),
            streams.len(),
            scanned
        );

        Ok(ContainerInfo {
            streams,
            metadata: Metadata::new(),
            programs,
            duration: None,
        })
    }

    fn read_packet(&mut self, io: &mut IoContext, packet: &mut Packet) -> Result<ReadStatus> {
        loop {
            if let Some(ready) = self.ready.pop_front() {
                packet.fill_from(&ready);
                return Ok(ReadStatus::Populated);
            }
            if self.eof {
                return Ok(ReadStatus::EndOfStream);
            }
            let next = match self.pending.pop_front() {
                Some(raw) => Some(raw),
                None => self.read_raw(io)?,
            };
            match next {
                Some((pos, raw)) => self.process(&raw, pos)?,
                None => {
                    self.eof = true;
                    self.flush_all();
                }
            }
        }
    }

    fn refine(&mut self, stream: &Stream, packet: &Packet) -> Option<CodecParameters> {
        match stream.params.codec_id {
            CodecId::Aac => AdtsHeader::find(packet.data()).map(|(_, header)| header.codec_parameters()),
            CodecId::H264 => h264::find_sps(packet.data()).map(|(sps, nal)| sps.codec_parameters(nal)),
            CodecId::MpegAudio => MpegAudioHeader::find(packet.data()).map(|h| h.codec_parameters()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_layout() {
        let mut ts = vec![0u8; TS_PACKET_SIZE * 3];
        for k in 0..3 {
            ts[k * TS_PACKET_SIZE] = SYNC_BYTE;
        }
        assert_eq!(detect_layout(&ts), Some((TS_PACKET_SIZE, 0, 3, true)));
        assert_eq!(TsFactory.probe(&ts), 100);
        assert_eq!(TsFactory.probe(&ts[..TS_PACKET_SIZE]), 25);

        let mut m2ts = vec![0u8; M2TS_PACKET_SIZE * 3];
        for k in 0..3 {
            m2ts[4 + k * M2TS_PACKET_SIZE] = SYNC_BYTE;
        }
        assert_eq!(detect_layout(&m2ts).map(|l| (l.0, l.1)), Some((M2TS_PACKET_SIZE, 4)));
        assert_eq!(TsFactory.probe(&m2ts), 100);

        assert_eq!(TsFactory.probe(b"GIF89a and then some text that goes on for a while"), 0);
    }
}
