//! xRIT file structure: header chain records, primary header, annotation
//! filename parsing and the on-disk output path convention.
//!
//! An xRIT file is a chain of variable-length header records followed by a
//! data field. Each record is `{type: u8, length: u16, value: [u8]}` where
//! `length` counts the whole record (3 header bytes plus `value`).

use std::path::PathBuf;

use crate::error::XritError;

pub const PRIMARY_HEADER_TYPE: u8 = 0;
pub const ANNOTATION_TYPE: u8 = 4;
pub const KEY_HEADER_TYPE: u8 = 7;

const RECORD_PREFIX_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct HeaderRecord {
    pub record_type: u8,
    pub value: Vec<u8>,
}

/// Walks a header chain starting at `bytes[0]`, stopping once
/// `total_header_length` bytes have been consumed.
pub fn walk_headers(bytes: &[u8], total_header_length: usize) -> Result<Vec<HeaderRecord>, XritError> {
    let mut records = Vec::new();
    let mut offset = 0usize;
    let limit = total_header_length.min(bytes.len());

    while offset < limit {
        if offset + RECORD_PREFIX_LEN > bytes.len() {
            return Err(XritError::MalformedHeaderChain(offset));
        }
        let record_type = bytes[offset];
        let record_len = u16::from_be_bytes([bytes[offset + 1], bytes[offset + 2]]) as usize;
        if record_len < RECORD_PREFIX_LEN || offset + record_len > bytes.len() {
            return Err(XritError::MalformedHeaderChain(offset));
        }
        let value = bytes[offset + RECORD_PREFIX_LEN..offset + record_len].to_vec();
        records.push(HeaderRecord { record_type, value });
        offset += record_len;
    }

    Ok(records)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub file_type: u8,
    /// Length in bytes of the entire header chain, this record included.
    pub total_header_length: usize,
    /// Length in bits of the data field following the header chain.
    pub data_length_bits: u64,
}

impl PrimaryHeader {
    pub fn data_length_bytes(&self) -> usize {
        ((self.data_length_bits + 7) / 8) as usize
    }
}

/// Length of the primary header record's value: file_type(1) +
/// total_header_length(4) + data_length_bits(8) = 13 bytes, for a 16-byte
/// record overall.
const PRIMARY_VALUE_LEN: usize = 13;

/// Parses the primary header (type 0), which must be the first record.
pub fn parse_primary_header(bytes: &[u8]) -> Result<PrimaryHeader, XritError> {
    if bytes.len() < RECORD_PREFIX_LEN + PRIMARY_VALUE_LEN {
        return Err(XritError::PrimaryHeaderTooShort);
    }
    if bytes[0] != PRIMARY_HEADER_TYPE {
        return Err(XritError::PrimaryHeaderTooShort);
    }
    let value = &bytes[RECORD_PREFIX_LEN..RECORD_PREFIX_LEN + PRIMARY_VALUE_LEN];
    let file_type = value[0];
    let total_header_length = u32::from_be_bytes([value[1], value[2], value[3], value[4]]) as usize;
    let data_length_bits = u64::from_be_bytes([
        value[5], value[6], value[7], value[8], value[9], value[10], value[11], value[12],
    ]);

    Ok(PrimaryHeader {
        file_type,
        total_header_length,
        data_length_bits,
    })
}

/// Human-readable label for a primary header's numeric `file_type`, or
/// `None` if unrecognized. Informational only; does not affect how a file
/// is written (every `file_type` is written to disk identically).
pub fn file_type_name(file_type: u8) -> Option<&'static str> {
    match file_type {
        0 => Some("Image"),
        1 => Some("GTS"),
        2 => Some("AlphanumericText"),
        3 => Some("KeyMessage"),
        128 => Some("CMDPS"),
        129 => Some("NWP"),
        130 => Some("GOCI"),
        131 => Some("Typhoon"),
        _ => None,
    }
}

/// Extracts the annotation filename (type 4 record) from a parsed chain.
pub fn annotation_filename(records: &[HeaderRecord]) -> Result<String, XritError> {
    records
        .iter()
        .find(|r| r.record_type == ANNOTATION_TYPE)
        .map(|r| String::from_utf8_lossy(&r.value).trim_end_matches('\0').to_string())
        .ok_or(XritError::MissingAnnotation)
}

/// Extracts the encryption key index (type 7 record), if present.
///
/// The index sits at byte offset +5 from the record's start, i.e. after the
/// 3-byte record prefix and 2 reserved bytes: `value[2..4]`.
pub fn key_index(records: &[HeaderRecord]) -> Option<u16> {
    records
        .iter()
        .find(|r| r.record_type == KEY_HEADER_TYPE)
        .filter(|r| r.value.len() >= 4)
        .map(|r| u16::from_be_bytes([r.value[2], r.value[3]]))
}

/// Destination path derived from an `IMG_`/`ADD_` style annotation filename:
/// `<output_root>/<date>/<mode>/<filename>`.
///
/// `IMG_<mode>_<seq>_<channel>_<date>_<time>_<segment>...`: mode is field 1,
/// date is field 4. `ADD_<mode>_<seq>_<date>_<time>_<segment>...`: mode is
/// field 1, date is field 3.
pub fn output_path(output_root: &std::path::Path, filename: &str) -> Result<PathBuf, XritError> {
    let fields: Vec<&str> = filename.split('_').collect();
    let (mode, date) = match fields.first().copied() {
        Some("IMG") if fields.len() > 4 => (fields[1], fields[4]),
        Some("ADD") if fields.len() > 3 => (fields[1], fields[3]),
        _ => return Err(XritError::UnrecognizedFilename(filename.to_string())),
    };

    let mut path = output_root.to_path_buf();
    path.push(date);
    path.push(mode);
    path.push(filename);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(record_type: u8, value: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(record_type);
        buf.extend_from_slice(&((value.len() + RECORD_PREFIX_LEN) as u16).to_be_bytes());
        buf.extend_from_slice(value);
        buf
    }

    fn primary_record(file_type: u8, total_header_length: u32, data_length_bits: u64) -> Vec<u8> {
        let mut value = vec![file_type];
        value.extend_from_slice(&total_header_length.to_be_bytes());
        value.extend_from_slice(&data_length_bits.to_be_bytes());
        record(PRIMARY_HEADER_TYPE, &value)
    }

    /// A type-7 key header record: 2 reserved bytes, then the 2-byte index.
    fn key_record(index: u16) -> Vec<u8> {
        let mut value = vec![0u8, 0u8];
        value.extend_from_slice(&index.to_be_bytes());
        record(KEY_HEADER_TYPE, &value)
    }

    #[test]
    fn walks_a_chain_of_records() {
        let primary = primary_record(0, 0, 0);
        let annotation = record(ANNOTATION_TYPE, b"IMG_COMS1_IR1_202601010000_001.lrit");
        let key = key_record(0x2A);
        let mut chain = Vec::new();
        chain.extend_from_slice(&primary);
        chain.extend_from_slice(&annotation);
        chain.extend_from_slice(&key);

        let records = walk_headers(&chain, chain.len()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(annotation_filename(&records).unwrap(), "IMG_COMS1_IR1_202601010000_001.lrit");
        assert_eq!(key_index(&records), Some(0x2A));
    }

    #[test]
    fn parses_primary_header_fields() {
        let primary = primary_record(1, 123, 4096);
        let header = parse_primary_header(&primary).unwrap();
        assert_eq!(header.file_type, 1);
        assert_eq!(header.total_header_length, 123);
        assert_eq!(header.data_length_bits, 4096);
        assert_eq!(header.data_length_bytes(), 512);
    }

    #[test]
    fn missing_annotation_is_an_error() {
        let records = vec![HeaderRecord { record_type: PRIMARY_HEADER_TYPE, value: vec![] }];
        assert!(matches!(annotation_filename(&records), Err(XritError::MissingAnnotation)));
    }

    #[test]
    fn missing_key_header_is_none_not_an_error() {
        let records = vec![HeaderRecord { record_type: PRIMARY_HEADER_TYPE, value: vec![] }];
        assert_eq!(key_index(&records), None);
    }

    #[test]
    fn derives_output_path_for_img_prefix() {
        let root = std::path::Path::new("/data/out");
        let path = output_path(root, "IMG_FD_001_VIS_20190101_000000_00.lrit").unwrap();
        assert_eq!(path, std::path::Path::new("/data/out/20190101/FD/IMG_FD_001_VIS_20190101_000000_00.lrit"));
    }

    #[test]
    fn derives_output_path_for_add_prefix() {
        let root = std::path::Path::new("/data/out");
        let path = output_path(root, "ADD_FD_001_20190101_000000_00.lrit").unwrap();
        assert_eq!(path, std::path::Path::new("/data/out/20190101/FD/ADD_FD_001_20190101_000000_00.lrit"));
    }

    #[test]
    fn rejects_unrecognized_prefix() {
        let root = std::path::Path::new("/data/out");
        assert!(matches!(
            output_path(root, "FOO_BAR.lrit"),
            Err(XritError::UnrecognizedFilename(_))
        ));
    }

    #[test]
    fn file_type_names_cover_known_types() {
        assert_eq!(file_type_name(0), Some("Image"));
        assert_eq!(file_type_name(131), Some("Typhoon"));
        assert_eq!(file_type_name(200), None);
    }

    #[test]
    fn detects_malformed_chain() {
        let mut chain = primary_record(0, 0, 0);
        chain.truncate(chain.len() - 2);
        assert!(matches!(walk_headers(&chain, 100), Err(XritError::MalformedHeaderChain(_))));
    }
}
