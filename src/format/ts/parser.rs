use super::types::*;
use crate::utils::Crc32Mpeg2;
use crate::{AvError, Result};
use std::collections::HashMap;

/// Packet, section and PES header parsing. Holds the partial PSI sections of
/// every PID it is fed.
#[derive(Debug, Default)]
pub struct TSPacketParser {
    sections: HashMap<u16, Vec<u8>>,
}

fn read_timestamp(data: &[u8]) -> i64 {
    (((i64::from(data[0]) >> 1) & 0x07) << 30)
        | (i64::from(data[1]) << 22)
        | ((i64::from(data[2]) >> 1) << 15)
        | (i64::from(data[3]) << 7)
        | (i64::from(data[4]) >> 1)
}

impl TSPacketParser {
    /// Creates a parser with no partial sections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the four-byte packet header.
    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(AvError::format("TS packet too short"));
        }
        if data[0] != SYNC_BYTE {
            return Err(AvError::format(format!("invalid sync byte 0x{:02x}", data[0])));
        }
        Ok(TSHeader {
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            pid: (u16::from(data[1] & 0x1F) << 8) | u16::from(data[2]),
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Parses the adaptation field, if the header announces one.
    pub fn parse_adaptation_field(
        &self,
        data: &[u8],
        header: &TSHeader,
    ) -> Result<Option<AdaptationField>> {
        if !header.adaptation_field_exists {
            return Ok(None);
        }
        let length = usize::from(*data.get(TS_HEADER_SIZE).ok_or_else(|| {
            AvError::format("adaptation field length missing")
        })?);
        if length == 0 {
            return Ok(Some(AdaptationField::default()));
        }
        let start = TS_HEADER_SIZE + 1;
        let field = data
            .get(start..start + length)
            .ok_or_else(|| AvError::format("adaptation field too long"))?;

        let flags = field[0];
        let mut adaptation = AdaptationField {
            discontinuity: (flags & 0x80) != 0,
            random_access: (flags & 0x40) != 0,
            pcr: None,
        };
        if flags & 0x10 != 0 {
            let pcr = field
                .get(1..7)
                .ok_or_else(|| AvError::format("PCR data too short"))?;
            let base = (u64::from(pcr[0]) << 25)
                | (u64::from(pcr[1]) << 17)
                | (u64::from(pcr[2]) << 9)
                | (u64::from(pcr[3]) << 1)
                | (u64::from(pcr[4]) >> 7);
            let ext = (u64::from(pcr[4] & 0x01) << 8) | u64::from(pcr[5]);
            adaptation.pcr = Some(base * 300 + ext);
        }
        Ok(Some(adaptation))
    }

    /// The payload of a packet, after the header and adaptation field.
    pub fn payload<'a>(&self, data: &'a [u8], header: &TSHeader) -> Result<&'a [u8]> {
        if !header.contains_payload {
            return Ok(&[]);
        }
        let mut offset = TS_HEADER_SIZE;
        if header.adaptation_field_exists {
            offset += 1 + usize::from(data.get(TS_HEADER_SIZE).copied().unwrap_or(0));
        }
        data.get(offset..)
            .ok_or_else(|| AvError::format(format!("adaptation field overruns PID {} packet", header.pid)))
    }

    /// Feeds the payload of a PSI packet and returns the sections it completes.
    pub fn push_section_data(&mut self, pid: u16, unit_start: bool, payload: &[u8]) -> Vec<Vec<u8>> {
        let mut complete = Vec::new();
        if unit_start {
            let Some((&pointer, rest)) = payload.split_first() else {
                return complete;
            };
            let pointer = usize::from(pointer).min(rest.len());
            if let Some(mut pending) = self.sections.remove(&pid) {
                pending.extend_from_slice(&rest[..pointer]);
                if let Some(section) = take_section(&mut pending) {
                    complete.push(section);
                }
            }
            let start = &rest[pointer..];
            if start.first().is_some_and(|&table_id| table_id != 0xFF) {
                self.sections.insert(pid, start.to_vec());
            }
        } else if let Some(pending) = self.sections.get_mut(&pid) {
            pending.extend_from_slice(payload);
        }

        if let Some(pending) = self.sections.get_mut(&pid) {
            if let Some(section) = take_section(pending) {
                complete.push(section);
                self.sections.remove(&pid);
            }
        }
        complete
    }

    /// Checks the section header and CRC.
    pub fn parse_section<'a>(&self, data: &'a [u8]) -> Result<Section<'a>> {
        if data.len() < 3 {
            return Err(AvError::format("PSI section too short"));
        }
        if data[1] & 0x80 == 0 {
            return Err(AvError::format(format!(
                "table 0x{:02x} lacks the section syntax",
                data[0]
            )));
        }
        let total = 3 + ((usize::from(data[1] & 0x0F) << 8) | usize::from(data[2]));
        if total < 12 || data.len() < total {
            return Err(AvError::format(format!(
                "table 0x{:02x} has bad section length {total}",
                data[0]
            )));
        }
        let data = &data[..total];
        if !Crc32Mpeg2::verify(data) {
            return Err(AvError::format(format!("CRC mismatch in table 0x{:02x}", data[0])));
        }
        Ok(Section {
            table_id: data[0],
            table_id_extension: u16::from_be_bytes([data[3], data[4]]),
            version: (data[5] >> 1) & 0x1F,
            current_next: data[5] & 0x01 != 0,
            body: &data[8..total - 4],
        })
    }

    /// Decodes a program association section.
    pub fn parse_pat(&self, section: &Section<'_>) -> Result<PAT> {
        if section.table_id != TABLE_ID_PAT {
            return Err(AvError::format("not a PAT section"));
        }
        let entries = section
            .body
            .chunks_exact(4)
            .map(|entry| PATEntry {
                program_number: u16::from_be_bytes([entry[0], entry[1]]),
                pid: u16::from_be_bytes([entry[2] & 0x1F, entry[3]]),
            })
            .collect();
        Ok(PAT {
            transport_stream_id: section.table_id_extension,
            entries,
        })
    }

    /// Decodes a program map section.
    pub fn parse_pmt(&self, section: &Section<'_>) -> Result<PMT> {
        if section.table_id != TABLE_ID_PMT {
            return Err(AvError::format("not a PMT section"));
        }
        let data = section.body;
        if data.len() < 4 {
            return Err(AvError::format("PMT too short"));
        }
        let mut pmt = PMT {
            program_number: section.table_id_extension,
            pcr_pid: u16::from_be_bytes([data[0] & 0x1F, data[1]]),
            ..PMT::default()
        };

        let program_info_length = (usize::from(data[2] & 0x0F) << 8) | usize::from(data[3]);
        let mut pos = 4;
        let info = data
            .get(pos..pos + program_info_length)
            .ok_or_else(|| AvError::format("PMT program info too long"))?;
        pmt.program_descriptors = self.parse_descriptors(info)?;
        pos += program_info_length;

        while pos + 5 <= data.len() {
            let stream_type = data[pos];
            let elementary_pid = u16::from_be_bytes([data[pos + 1] & 0x1F, data[pos + 2]]);
            let es_info_length = (usize::from(data[pos + 3] & 0x0F) << 8) | usize::from(data[pos + 4]);
            pos += 5;

            let info = data
                .get(pos..pos + es_info_length)
                .ok_or_else(|| AvError::format("PMT ES info too long"))?;
            let descriptors = self.parse_descriptors(info)?;
            pos += es_info_length;

            pmt.elementary_stream_infos.push(ElementaryStreamInfo {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }
        Ok(pmt)
    }

    fn parse_descriptors(&self, data: &[u8]) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut pos = 0;
        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = usize::from(data[pos + 1]);
            pos += 2;
            let body = data
                .get(pos..pos + length)
                .ok_or_else(|| AvError::format("descriptor data too short"))?;
            descriptors.push(Descriptor {
                tag,
                data: body.to_vec(),
            });
            pos += length;
        }
        Ok(descriptors)
    }

    /// Parses the PES header at the start of a unit.
    pub fn parse_pes_header(&self, data: &[u8]) -> Result<PesHeader> {
        if data.len() < 6 || data[..3] != [0, 0, 1] {
            return Err(AvError::format("missing PES start code"));
        }
        let stream_id = data[3];
        let packet_length = u16::from_be_bytes([data[4], data[5]]);
        // Stream ids without the optional header fields
        if matches!(stream_id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF) {
            return Ok(PesHeader {
                stream_id,
                packet_length,
                pts: None,
                dts: None,
                header_len: 6,
            });
        }
        if data.len() < 9 {
            return Err(AvError::format("PES header too short"));
        }
        let header_len = 9 + usize::from(data[8]);
        if data.len() < header_len {
            return Err(AvError::format("PES header data overruns the packet"));
        }
        let (pts, dts) = match data[7] >> 6 {
            0b10 if header_len >= 14 => (Some(read_timestamp(&data[9..14])), None),
            0b11 if header_len >= 19 => (
                Some(read_timestamp(&data[9..14])),
                Some(read_timestamp(&data[14..19])),
            ),
            _ => (None, None),
        };
        Ok(PesHeader {
            stream_id,
            packet_length,
            pts,
            dts,
            header_len,
        })
    }
}

/// Splits a finished section off the front of `pending`.
fn take_section(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
    if pending.len() < 3 {
        return None;
    }
    let total = 3 + ((usize::from(pending[1] & 0x0F) << 8) | usize::from(pending[2]));
    if pending.len() < total {
        return None;
    }
    pending.truncate(total);
    Some(std::mem::take(pending))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn section(table_id: u8, extension: u16, body: &[u8]) -> Vec<u8> {
        let length = 5 + body.len() + 4;
        let mut out = vec![table_id, 0xB0 | (length >> 8) as u8, length as u8];
        out.extend_from_slice(&extension.to_be_bytes());
        out.extend_from_slice(&[0xC1, 0x00, 0x00]);
        out.extend_from_slice(body);
        let crc = Crc32Mpeg2::checksum(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    #[test]
    fn test_parse_ts_header() {
        let parser = TSPacketParser::new();
        let header = parser.parse_header(&[0x47, 0x41, 0x00, 0x3A]).unwrap();
        assert!(header.payload_unit_start);
        assert_eq!(header.pid, 0x100);
        assert!(header.adaptation_field_exists);
        assert!(header.contains_payload);
        assert_eq!(header.continuity_counter, 0x0A);
        assert!(parser.parse_header(&[0x46, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_adaptation_field_and_payload() {
        let parser = TSPacketParser::new();
        let mut packet = vec![0x47, 0x41, 0x00, 0x30, 7, 0x50, 0, 0, 0, 1, 0x7E, 0];
        packet.extend_from_slice(&[0xAB; 4]);
        let header = parser.parse_header(&packet).unwrap();
        let field = parser.parse_adaptation_field(&packet, &header).unwrap().unwrap();
        assert!(field.random_access);
        assert_eq!(field.pcr, Some(2 * 300));
        assert_eq!(parser.payload(&packet, &header).unwrap(), &[0xAB; 4]);
    }

    #[test]
    fn test_parse_pat() {
        let parser = TSPacketParser::new();
        let raw = section(TABLE_ID_PAT, 7, &[0x00, 0x00, 0xE0, 0x10, 0x00, 0x01, 0xF0, 0x00]);
        let section = parser.parse_section(&raw).unwrap();
        let pat = parser.parse_pat(&section).unwrap();
        assert_eq!(pat.transport_stream_id, 7);
        assert_eq!(pat.entries.len(), 2);
        let programs: Vec<(u16, u16)> = pat.programs().map(|e| (e.program_number, e.pid)).collect();
        assert_eq!(programs, vec![(1, 0x1000)]);
    }

    #[test]
    fn test_parse_pmt_with_descriptors() {
        let parser = TSPacketParser::new();
        let body = [
            0xE1, 0x00, 0xF0, 0x00, // PCR PID 0x100, no program info
            0x1B, 0xE1, 0x00, 0xF0, 0x00, // H.264 on 0x100
            0x0F, 0xE1, 0x01, 0xF0, 0x06, 0x0A, 0x04, b'f', b'r', b'a', 0x00,
        ];
        let raw = section(TABLE_ID_PMT, 3, &body);
        let pmt = parser.parse_pmt(&parser.parse_section(&raw).unwrap()).unwrap();
        assert_eq!(pmt.program_number, 3);
        assert_eq!(pmt.pcr_pid, 0x100);
        assert_eq!(pmt.elementary_stream_infos.len(), 2);
        assert_eq!(pmt.elementary_stream_infos[1].elementary_pid, 0x101);
        assert_eq!(pmt.elementary_stream_infos[1].language().as_deref(), Some("fra"));
    }

    #[test]
    fn test_crc_mismatch_is_rejected() {
        let parser = TSPacketParser::new();
        let mut raw = section(TABLE_ID_PAT, 1, &[0x00, 0x01, 0xF0, 0x00]);
        raw[9] ^= 0xFF;
        assert!(parser.parse_section(&raw).is_err());
    }

    #[test]
    fn test_section_spanning_packets() {
        let mut parser = TSPacketParser::new();
        let raw = section(TABLE_ID_PAT, 1, &[0x00, 0x01, 0xF0, 0x00]);
        let mut first = vec![0x00];
        first.extend_from_slice(&raw[..5]);
        assert!(parser.push_section_data(0, true, &first).is_empty());

        let mut rest = raw[5..].to_vec();
        rest.extend_from_slice(&[0xFF; 8]);
        let sections = parser.push_section_data(0, false, &rest);
        assert_eq!(sections, vec![raw]);
    }

    #[test]
    fn test_parse_pes_header() {
        let parser = TSPacketParser::new();
        // PTS 900, DTS 0
        let data = [
            0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0xC0, 0x0A, 0x31, 0x00, 0x01, 0x07, 0x09,
            0x11, 0x00, 0x01, 0x00, 0x01, 0xAA,
        ];
        let header = parser.parse_pes_header(&data).unwrap();
        assert_eq!(header.stream_id, 0xE0);
        assert_eq!(header.pts, Some(900));
        assert_eq!(header.dts, Some(0));
        assert_eq!(header.header_len, 19);
        assert_eq!(header.payload_len(), None);
        assert!(parser.parse_pes_header(&[0, 0, 2, 0xE0, 0, 0]).is_err());
    }
}
