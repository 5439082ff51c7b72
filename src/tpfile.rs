//! TP_File (Transport File) reassembly from a run of CP_PDU payloads.
//!
//! A TP_File is the concatenation of one or more CP_PDUs sharing an APID,
//! delimited by sequence flags: FIRST opens it, any number of CONTINUE
//! fragments extend it, LAST closes it. A SINGLE CP_PDU carries a complete
//! TP_File by itself and is handled as FIRST immediately followed by LAST.
//! The first 10 bytes of the reassembled byte stream are the TP_File header;
//! the rest is file data.

use crate::bits::read_bits;
use crate::error::TpFileError;

pub const HEADER_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpFileHeader {
    pub counter: u16,
    /// Length in bytes of the TP_File payload, header excluded.
    pub file_length: u32,
}

pub fn parse_header(bytes: &[u8]) -> Result<TpFileHeader, TpFileError> {
    if bytes.len() < HEADER_LEN {
        return Err(TpFileError::HeaderTooShort(bytes.len()));
    }
    let header_bits = &bytes[..HEADER_LEN];
    let total_bits = HEADER_LEN * 8;

    let counter = read_bits(header_bits, 0, 16, total_bits)? as u16;
    // Wire field is a 64-bit *bit* count; the byte length used everywhere
    // else in this crate is that value divided by 8.
    let file_length_bits = read_bits(header_bits, 16, 64, total_bits)?;
    let file_length = (file_length_bits / 8) as u32;

    Ok(TpFileHeader { counter, file_length })
}

/// Accumulates CP_PDU payloads belonging to one TP_File.
pub struct TpFileAssembler {
    header: Option<TpFileHeader>,
    buf: Vec<u8>,
}

impl TpFileAssembler {
    /// Opens a new TP_File from the payload of its FIRST (or SINGLE) CP_PDU.
    pub fn open(first_payload: &[u8]) -> Result<Self, TpFileError> {
        let header = parse_header(first_payload)?;
        Ok(TpFileAssembler {
            header: Some(header),
            buf: first_payload.to_vec(),
        })
    }

    /// Appends the payload of a CONTINUE (or the closing LAST) CP_PDU.
    pub fn append(&mut self, payload: &[u8]) {
        self.buf.extend_from_slice(payload);
    }

    pub fn header(&self) -> Option<&TpFileHeader> {
        self.header.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.header
            .map(|h| self.buf.len().saturating_sub(HEADER_LEN) >= h.file_length as usize)
            .unwrap_or(false)
    }

    /// Consumes the assembler on LAST, checking the accumulated payload
    /// (header bytes excluded) matches the header's declared `file_length`
    /// exactly. Returns the header and the file data (header bytes
    /// stripped).
    pub fn finish(self) -> Result<(TpFileHeader, Vec<u8>), TpFileError> {
        let header = self.header.ok_or(TpFileError::HeaderTooShort(self.buf.len()))?;
        let payload_len = self.buf.len().saturating_sub(HEADER_LEN);
        if payload_len != header.file_length as usize {
            return Err(TpFileError::LengthMismatch {
                declared: header.file_length as usize,
                actual: payload_len,
            });
        }
        let data = self.buf[HEADER_LEN..].to_vec();
        Ok((header, data))
    }
}
