//! Multiplexing PDU (M_PDU) header parsing.
//!
//! The M_PDU occupies the 886 bytes trailing a VCDU's primary header: a
//! 2-byte header carrying the first-header-pointer, followed by the 884-byte
//! packet zone containing (fragments of) CP_PDUs.

use crate::bits::read_bits;
use crate::error::MPduError;

pub const MPDU_HEADER_LEN: usize = 2;
pub const PACKET_ZONE_LEN: usize = 884;

/// Sentinel pointer value meaning "no CP_PDU starts in this packet zone".
pub const NO_HEADER: u16 = 0x7FF;

pub struct MPdu<'a> {
    /// Offset within `packet_zone` where a new CP_PDU begins, if any.
    pub first_header_pointer: u16,
    pub packet_zone: &'a [u8],
}

impl<'a> MPdu<'a> {
    /// Parses the 886-byte M_PDU trailing a VCDU primary header.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, MPduError> {
        let expected = MPDU_HEADER_LEN + PACKET_ZONE_LEN;
        if bytes.len() != expected {
            return Err(MPduError::WrongLength {
                expected,
                actual: bytes.len(),
            });
        }

        let header_bits = &bytes[..MPDU_HEADER_LEN];
        let total_bits = MPDU_HEADER_LEN * 8;

        let _spare = read_bits(header_bits, 0, 5, total_bits)?;
        let first_header_pointer = read_bits(header_bits, 5, 11, total_bits)? as u16;

        Ok(MPdu {
            first_header_pointer,
            packet_zone: &bytes[MPDU_HEADER_LEN..],
        })
    }

    /// `true` if a CP_PDU header starts somewhere in this packet zone.
    pub fn has_header(&self) -> bool {
        self.first_header_pointer != NO_HEADER
    }
}
