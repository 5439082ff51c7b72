//! Arbitrary-width unsigned integer extraction from fixed-size byte buffers.
//!
//! All of the wire formats in this crate are packed big-endian bitfields
//! (VCDU, M_PDU and CP_PDU headers in particular), so every other parser in
//! the crate is built on top of `read_bits`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitsError {
    #[error("bit width {0} exceeds 64 bits")]
    WidthTooWide(u32),
    #[error("bit width must be non-zero")]
    ZeroWidth,
    #[error("buffer has {actual} bits, but total_bits claims {claimed}")]
    BufferLengthMismatch { claimed: usize, actual: usize },
    #[error("bit range [{offset}, {end}) exceeds buffer of {total_bits} bits")]
    RangeExceedsBuffer {
        offset: usize,
        end: usize,
        total_bits: usize,
    },
}

/// Reads the unsigned integer spanning `[bit_offset, bit_offset + bit_width)`,
/// MSB-first, out of `buf`.
///
/// `total_bits` must equal `buf.len() * 8`; it exists purely so callers can't
/// silently pass a slice that doesn't match the frame they think they have.
pub fn read_bits(
    buf: &[u8],
    bit_offset: usize,
    bit_width: u32,
    total_bits: usize,
) -> Result<u64, BitsError> {
    if bit_width == 0 {
        return Err(BitsError::ZeroWidth);
    }
    if bit_width > 64 {
        return Err(BitsError::WidthTooWide(bit_width));
    }
    if buf.len() * 8 != total_bits {
        return Err(BitsError::BufferLengthMismatch {
            claimed: total_bits,
            actual: buf.len() * 8,
        });
    }

    let bit_end = bit_offset + bit_width as usize;
    if bit_end > total_bits {
        return Err(BitsError::RangeExceedsBuffer {
            offset: bit_offset,
            end: bit_end,
            total_bits,
        });
    }

    let mut value: u64 = 0;
    let mut bits_read: u32 = 0;
    let mut byte_index = bit_offset / 8;
    let mut bit_in_byte = bit_offset % 8;

    while bits_read < bit_width {
        let byte = buf[byte_index];
        let bits_available = 8 - bit_in_byte;
        let bits_to_take = bits_available.min((bit_width - bits_read) as usize);
        let shift = bits_available - bits_to_take;
        let mask: u8 = if bits_to_take == 8 {
            0xFF
        } else {
            ((1u16 << bits_to_take) - 1) as u8
        };
        let chunk = (byte >> shift) & mask;

        value = (value << bits_to_take) | u64::from(chunk);
        bits_read += bits_to_take as u32;
        byte_index += 1;
        bit_in_byte = 0;
    }

    Ok(value)
}
