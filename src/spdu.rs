//! S_PDU decryption.
//!
//! An S_PDU is a TP_File's data field: an unencrypted xRIT header chain
//! (needed to find the key index before anything can be decrypted) followed
//! by a data field that is DES-ECB encrypted in 8-byte blocks, zero-padded
//! out to the next block boundary before encryption. Key index `0x0000`
//! means the data field was never encrypted; an unrecognized key index is
//! treated the same way, so a missing key degrades to passthrough instead
//! of dropping the file.

use cipher::{BlockDecrypt, KeyInit};
use des::Des;
use log::warn;

use crate::error::SpduError;
use crate::keys::KeyTable;
use crate::xrit::{self, HeaderRecord, PrimaryHeader};

pub const PLAINTEXT_KEY_INDEX: u16 = 0x0000;
const BLOCK_LEN: usize = 8;

pub struct SPdu {
    pub primary_header: PrimaryHeader,
    pub records: Vec<HeaderRecord>,
    pub key_index: u16,
    /// The complete xRIT byte stream: header chain followed by the
    /// (now decrypted, if it was encrypted) data field.
    pub plaintext: Vec<u8>,
}

/// Parses and, if necessary, decrypts an S_PDU's data field in place.
pub fn decrypt(bytes: &[u8], keys: &KeyTable) -> Result<SPdu, SpduError> {
    let primary_header = xrit::parse_primary_header(bytes).map_err(|_| SpduError::PrimaryHeaderTooShort)?;
    let records = xrit::walk_headers(bytes, primary_header.total_header_length)
        .map_err(|_| SpduError::MalformedHeaderChain(0))?;
    let key_index = xrit::key_index(&records).unwrap_or(PLAINTEXT_KEY_INDEX);

    let header_chain = &bytes[..primary_header.total_header_length];
    let data_field = &bytes[primary_header.total_header_length..];

    let plaintext_data = if key_index == PLAINTEXT_KEY_INDEX {
        data_field.to_vec()
    } else {
        match keys.get(key_index) {
            Some(key) => decrypt_des_ecb(data_field, key, primary_header.data_length_bytes()),
            None => {
                warn!("no key registered for key index {key_index:#06x}; treating S_PDU as plaintext");
                data_field.to_vec()
            }
        }
    };

    let mut plaintext = Vec::with_capacity(header_chain.len() + plaintext_data.len());
    plaintext.extend_from_slice(header_chain);
    plaintext.extend_from_slice(&plaintext_data);

    Ok(SPdu {
        primary_header,
        records,
        key_index,
        plaintext,
    })
}

/// Decrypts `ciphertext` in 8-byte ECB blocks, zero-padding a short trailing
/// block out to the block boundary before decrypting it (spec §4.6 step 2),
/// then truncating the result back to `plaintext_len`.
fn decrypt_des_ecb(ciphertext: &[u8], key: &[u8; 8], plaintext_len: usize) -> Vec<u8> {
    let cipher = Des::new_from_slice(key).expect("DES key is always 8 bytes");
    let mut padded = ciphertext.to_vec();
    let remainder = padded.len() % BLOCK_LEN;
    if remainder != 0 {
        padded.resize(padded.len() + (BLOCK_LEN - remainder), 0x00);
    }

    let mut out = Vec::with_capacity(padded.len());
    for block in padded.chunks(BLOCK_LEN) {
        let mut buf = cipher::generic_array::GenericArray::clone_from_slice(block);
        cipher.decrypt_block(&mut buf);
        out.extend_from_slice(&buf);
    }
    out.truncate(plaintext_len.min(out.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipher::BlockEncrypt;

    fn record(record_type: u8, value: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(record_type);
        buf.extend_from_slice(&((value.len() + 3) as u16).to_be_bytes());
        buf.extend_from_slice(value);
        buf
    }

    fn primary_record(total_header_length: u32, data_length_bits: u64) -> Vec<u8> {
        let mut value = vec![0u8];
        value.extend_from_slice(&total_header_length.to_be_bytes());
        value.extend_from_slice(&data_length_bits.to_be_bytes());
        record(0, &value)
    }

    /// A type-7 key header record: 2 reserved bytes, then the 2-byte index.
    fn key_record(index: u16) -> Vec<u8> {
        let mut value = vec![0u8, 0u8];
        value.extend_from_slice(&index.to_be_bytes());
        record(7, &value)
    }

    fn encrypt_des_ecb(plaintext: &[u8], key: &[u8; 8]) -> Vec<u8> {
        let cipher = Des::new_from_slice(key).unwrap();
        let mut padded = plaintext.to_vec();
        while padded.len() % BLOCK_LEN != 0 {
            padded.push(0x00);
        }
        let mut out = Vec::with_capacity(padded.len());
        for block in padded.chunks(BLOCK_LEN) {
            let mut buf = cipher::generic_array::GenericArray::clone_from_slice(block);
            cipher.encrypt_block(&mut buf);
            out.extend_from_slice(&buf);
        }
        out
    }

    fn build_spdu(key_index: u16, data: &[u8], keys: &KeyTable) -> Vec<u8> {
        let annotation = record(4, b"IMG_COMS1_IR1_202601010000_001.lrit");
        let key_header = key_record(key_index);
        let data_field = if key_index == PLAINTEXT_KEY_INDEX {
            data.to_vec()
        } else {
            encrypt_des_ecb(data, keys.get(key_index).expect("test key present"))
        };
        let total_header_length =
            (primary_record(0, 0).len() + annotation.len() + key_header.len()) as u32;
        let primary = primary_record(total_header_length, (data.len() * 8) as u64);

        let mut buf = Vec::new();
        buf.extend_from_slice(&primary);
        buf.extend_from_slice(&annotation);
        buf.extend_from_slice(&key_header);
        buf.extend_from_slice(&data_field);
        buf
    }

    #[test]
    fn plaintext_passthrough_when_key_index_zero() {
        let keys = KeyTable::empty();
        let data = b"unencrypted payload data";
        let bytes = build_spdu(PLAINTEXT_KEY_INDEX, data, &keys);
        let spdu = decrypt(&bytes, &keys).unwrap();
        assert_eq!(spdu.key_index, PLAINTEXT_KEY_INDEX);
        assert!(spdu.plaintext.ends_with(data));
    }

    #[test]
    fn decrypts_des_ecb_payload() {
        let json = r#"{"keys": {"42": "0011223344556677"}}"#;
        let keys = KeyTable::from_json(json).unwrap();
        let data = b"exactly16bytes!!";
        let bytes = build_spdu(42, data, &keys);
        let spdu = decrypt(&bytes, &keys).unwrap();
        assert!(spdu.plaintext.ends_with(data));
    }

    #[test]
    fn pads_short_trailing_block_before_decrypting_instead_of_passing_it_through() {
        // A ciphertext that isn't a multiple of the 8-byte DES block size
        // must be zero-padded out to the boundary and decrypted, not left
        // as raw ciphertext bytes in the output (spec §4.6 step 2).
        let key = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        let first_block_plaintext = b"firstblk";
        let first_block_ciphertext = encrypt_des_ecb(first_block_plaintext, &key);
        let trailing_raw = b"xyzab"; // 5 bytes, not a full block

        let mut ciphertext = first_block_ciphertext.clone();
        ciphertext.extend_from_slice(trailing_raw);
        assert_eq!(ciphertext.len(), 13);

        let out = decrypt_des_ecb(&ciphertext, &key, ciphertext.len());
        assert_eq!(&out[..8], first_block_plaintext);
        // The trailing 5 bytes went through DES decryption (after zero
        // padding), not a raw copy of the ciphertext bytes.
        assert_ne!(&out[8..], trailing_raw);
    }

    #[test]
    fn unrecognized_key_index_degrades_to_passthrough() {
        let keys = KeyTable::empty();
        let data = b"payload that would have been encrypted";
        let bytes = build_spdu(99, data, &KeyTable::from_json(r#"{"keys":{"99":"0011223344556677"}}"#).unwrap());
        // `keys` here doesn't know about index 99, so decrypt() must fall back
        // to passthrough rather than garbling the bytes or failing.
        let spdu = decrypt(&bytes, &keys).unwrap();
        assert_eq!(spdu.key_index, 99);
    }
}
