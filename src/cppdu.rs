//! CP_PDU (CCSDS Path Protocol Data Unit) header parsing and reassembly.
//!
//! A CP_PDU is a variable-length unit carried fragmented across one or more
//! M_PDU packet zones: a fixed 6-byte header, a data field, and a trailing
//! 16-bit CRC. The header's `packet_data_length` gives the length of
//! everything after the header minus one (the standard CCSDS space packet
//! convention), which here includes the 2-byte CRC trailer.

use crate::bits::read_bits;
use crate::crc::Crc16Table;
use crate::error::CpPduError;

pub const HEADER_LEN: usize = 6;
pub const CRC_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqFlag {
    Continue,
    First,
    Last,
    Single,
}

impl SeqFlag {
    fn from_bits(v: u8) -> Result<Self, CpPduError> {
        match v {
            0 => Ok(SeqFlag::Continue),
            1 => Ok(SeqFlag::First),
            2 => Ok(SeqFlag::Last),
            3 => Ok(SeqFlag::Single),
            other => Err(CpPduError::BadSeqFlag(other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CpPduHeader {
    pub version: u8,
    pub type_flag: u8,
    pub secondary_header_flag: bool,
    pub apid: u16,
    pub seq_flag: SeqFlag,
    pub sequence_count: u16,
    /// Length in bytes of everything following the header, CRC included.
    pub data_length: usize,
}

/// Parses the fixed 6-byte CP_PDU header.
pub fn parse_header(bytes: &[u8]) -> Result<CpPduHeader, CpPduError> {
    if bytes.len() < HEADER_LEN {
        return Err(CpPduError::HeaderTooShort(bytes.len()));
    }
    let header_bits = &bytes[..HEADER_LEN];
    let total_bits = HEADER_LEN * 8;

    let version = read_bits(header_bits, 0, 3, total_bits)? as u8;
    let type_flag = read_bits(header_bits, 3, 1, total_bits)? as u8;
    let secondary_header_flag = read_bits(header_bits, 4, 1, total_bits)? != 0;
    let apid = read_bits(header_bits, 5, 11, total_bits)? as u16;
    let seq_flag = SeqFlag::from_bits(read_bits(header_bits, 16, 2, total_bits)? as u8)?;
    let sequence_count = read_bits(header_bits, 18, 14, total_bits)? as u16;
    let packet_length = read_bits(header_bits, 32, 16, total_bits)? as usize;

    Ok(CpPduHeader {
        version,
        type_flag,
        secondary_header_flag,
        apid,
        seq_flag,
        sequence_count,
        data_length: packet_length + 1,
    })
}

/// Accumulates M_PDU packet-zone fragments into a CP_PDU.
///
/// Unlike the legacy demuxer, bytes are never silently discarded by
/// `append` itself: the "short CP_PDU" edge case (trimming a complete CP_PDU
/// off the front of a buffer that also holds the start of the next one) is
/// handled explicitly by [`CpPduAssembler::split_excess`], so a caller can
/// still forward whatever it collected even when continuity loss left the
/// buffer short or long of the declared length.
pub struct CpPduAssembler {
    header: Option<CpPduHeader>,
    buf: Vec<u8>,
}

impl CpPduAssembler {
    pub fn new() -> Self {
        CpPduAssembler {
            header: None,
            buf: Vec::new(),
        }
    }

    fn declared_total(&self) -> Option<usize> {
        self.header.map(|h| HEADER_LEN + h.data_length)
    }

    /// Appends a chunk, parsing the header once enough bytes have arrived.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), CpPduError> {
        self.buf.extend_from_slice(chunk);
        if self.header.is_none() && self.buf.len() >= HEADER_LEN {
            self.header = Some(parse_header(&self.buf)?);
        }
        Ok(())
    }

    pub fn header(&self) -> Option<&CpPduHeader> {
        self.header.as_ref()
    }

    /// `true` once the declared length has been reached or passed.
    pub fn is_complete(&self) -> bool {
        self.declared_total().map(|t| self.buf.len() >= t).unwrap_or(false)
    }

    /// `true` iff this CP_PDU's header matches the EOF-marker pattern
    /// (APID 0, sequence counter 0, CONTINUE, declared length 1). Only the
    /// header is examined, matching the legacy demuxer, which checks this
    /// immediately after the header is parsed rather than after the payload
    /// is fully buffered.
    pub fn is_eof(&self) -> bool {
        self.header
            .map(|h| h.apid == 0 && h.sequence_count == 0 && matches!(h.seq_flag, SeqFlag::Continue) && h.data_length == 1)
            .unwrap_or(false)
    }

    /// Edge case (short CP_PDU): if this CP_PDU's header arrived late in an
    /// M_PDU packet zone, the whole declared length plus the start of the
    /// *next* CP_PDU's header can land in the same buffer (no further
    /// pointer marks the boundary, since only one pointer exists per M_PDU).
    /// Splits off and returns whatever sits past the declared length.
    pub fn split_excess(&mut self) -> Option<Vec<u8>> {
        let total = self.declared_total()?;
        if self.buf.len() > total {
            Some(self.buf.split_off(total))
        } else {
            None
        }
    }

    /// Finishes the CP_PDU regardless of whether it ever reached its
    /// declared length — packet loss can leave it short, and the legacy
    /// demuxer's lenient policy is to forward a mismatched CP_PDU to the
    /// TP_File stage rather than drop it. Returns the header, the payload
    /// with the CRC trailer stripped (best-effort if fewer than 2 bytes
    /// remain), whether the declared length was met, and whether the CRC
    /// checked out.
    pub fn finish(self, crc: &Crc16Table) -> Result<(CpPduHeader, Vec<u8>, bool, bool), CpPduError> {
        let header = self.header.ok_or(CpPduError::HeaderTooShort(self.buf.len()))?;
        let declared_total = HEADER_LEN + header.data_length;
        let length_ok = self.buf.len() == declared_total;

        let body_start = HEADER_LEN.min(self.buf.len());
        let body = &self.buf[body_start..];
        let (payload, crc_ok) = if body.len() >= CRC_LEN {
            let payload_end = body.len() - CRC_LEN;
            let computed = crc.checksum(&body[..payload_end]);
            let expected = u16::from_be_bytes([body[payload_end], body[payload_end + 1]]);
            (body[..payload_end].to_vec(), computed == expected)
        } else {
            (body.to_vec(), false)
        };

        Ok((header, payload, length_ok, crc_ok))
    }
}

impl Default for CpPduAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cppdu(apid: u16, seq_flag: u8, seq_count: u16, payload: &[u8], crc: &Crc16Table) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0] = 0b000_0_0000 | ((apid >> 8) as u8 & 0x07);
        buf[1] = (apid & 0xFF) as u8;
        buf[2] = (seq_flag << 6) | ((seq_count >> 8) as u8 & 0x3F);
        buf[3] = (seq_count & 0xFF) as u8;
        let data_len = payload.len() + CRC_LEN;
        let packet_length = (data_len - 1) as u16;
        buf[4] = (packet_length >> 8) as u8;
        buf[5] = (packet_length & 0xFF) as u8;
        buf.extend_from_slice(payload);
        let checksum = crc.checksum(&buf);
        buf.extend_from_slice(&checksum.to_be_bytes());
        buf
    }

    #[test]
    fn parses_header_and_reassembles_single_chunk() {
        let crc = Crc16Table::new();
        let frame = make_cppdu(100, 3, 7, b"hello world", &crc);
        let mut asm = CpPduAssembler::new();
        asm.append(&frame).unwrap();
        assert!(asm.is_complete());
        let (header, payload, length_ok, crc_ok) = asm.finish(&crc).unwrap();
        assert_eq!(header.apid, 100);
        assert_eq!(header.seq_flag, SeqFlag::Single);
        assert_eq!(header.sequence_count, 7);
        assert_eq!(payload, b"hello world");
        assert!(length_ok);
        assert!(crc_ok);
    }

    #[test]
    fn reassembles_across_fragments() {
        let crc = Crc16Table::new();
        let frame = make_cppdu(5, 1, 0, &[0xAB; 50], &crc);
        let mut asm = CpPduAssembler::new();
        let (first, rest) = frame.split_at(4);
        asm.append(first).unwrap();
        assert!(!asm.is_complete());
        asm.append(rest).unwrap();
        assert!(asm.is_complete());
        let (_, payload, length_ok, crc_ok) = asm.finish(&crc).unwrap();
        assert_eq!(payload, vec![0xAB; 50]);
        assert!(length_ok);
        assert!(crc_ok);
    }

    #[test]
    fn splits_trailing_bytes_belonging_to_next_cppdu() {
        let crc = Crc16Table::new();
        let frame = make_cppdu(5, 3, 0, b"abc", &crc);
        let mut asm = CpPduAssembler::new();
        let mut padded = frame.clone();
        padded.extend_from_slice(b"NEXTCPPDUHEADERBYTES");
        asm.append(&padded).unwrap();
        assert!(asm.is_complete());
        let extra = asm.split_excess().unwrap();
        assert_eq!(extra, b"NEXTCPPDUHEADERBYTES");
        let (_, payload, length_ok, _) = asm.finish(&crc).unwrap();
        assert_eq!(payload, b"abc");
        assert!(length_ok);
    }

    #[test]
    fn detects_bad_crc() {
        let crc = Crc16Table::new();
        let mut frame = make_cppdu(5, 3, 0, b"abc", &crc);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let mut asm = CpPduAssembler::new();
        asm.append(&frame).unwrap();
        let (_, _, length_ok, crc_ok) = asm.finish(&crc).unwrap();
        assert!(length_ok);
        assert!(!crc_ok);
    }

    #[test]
    fn forced_finish_on_short_buffer_reports_length_mismatch_not_an_error() {
        let crc = Crc16Table::new();
        let frame = make_cppdu(5, 0, 0, &[0x11; 40], &crc);
        let mut asm = CpPduAssembler::new();
        asm.append(&frame[..20]).unwrap();
        assert!(!asm.is_complete());
        let (_, _, length_ok, _) = asm.finish(&crc).unwrap();
        assert!(!length_ok);
    }

    #[test]
    fn eof_marker_detected_from_header_alone() {
        // APID=0, SEQ=CONTINUE(0), COUNTER=0, LENGTH field 0 => data_length=1,
        // matching the EOF-marker pattern exactly (no CRC trailer at all).
        let header = [0x00u8, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut asm = CpPduAssembler::new();
        asm.append(&header).unwrap();
        assert!(asm.is_eof());
    }

    #[test]
    fn rejects_bad_seq_flag() {
        let crc = Crc16Table::new();
        let frame = make_cppdu(5, 3, 0, b"abc", &crc);
        // seq_flag lives in a 2-bit field; every encoding (0-3) is valid, so
        // BadSeqFlag can only be reached by constructing the error directly.
        assert!(parse_header(&frame).is_ok());
        let _ = SeqFlag::from_bits(4).unwrap_err();
    }
}
