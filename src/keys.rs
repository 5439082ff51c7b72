//! Decryption key table, loaded from a JSON file mapping key index to an
//! 8-byte DES key given as a hex string.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum KeyTableError {
    #[error("failed to read key table file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse key table JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("key {index:#06x} has {len} hex characters, expected 16 (8 bytes)")]
    WrongKeyLength { index: u16, len: usize },
    #[error("key {index:#06x} is not valid hex: {source}")]
    InvalidHex {
        index: u16,
        #[source]
        source: std::num::ParseIntError,
    },
}

#[derive(Debug, Deserialize)]
struct RawKeyTable {
    keys: HashMap<String, String>,
}

/// Maps a 16-bit key index to its 8-byte DES key.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    keys: HashMap<u16, [u8; 8]>,
}

impl KeyTable {
    pub fn empty() -> Self {
        KeyTable { keys: HashMap::new() }
    }

    pub fn load(path: &Path) -> Result<Self, KeyTableError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, KeyTableError> {
        let raw: RawKeyTable = serde_json::from_str(contents)?;
        let mut keys = HashMap::with_capacity(raw.keys.len());
        for (index_str, hex) in raw.keys {
            let index = parse_key_index(&index_str);
            let key = decode_hex_key(index, &hex)?;
            keys.insert(index, key);
        }
        Ok(KeyTable { keys })
    }

    pub fn get(&self, index: u16) -> Option<&[u8; 8]> {
        self.keys.get(&index)
    }
}

/// Accepts both plain decimal ("42") and hex-prefixed ("0x2A") key indices.
fn parse_key_index(raw: &str) -> u16 {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).unwrap_or(0),
        None => raw.parse().unwrap_or(0),
    }
}

fn decode_hex_key(index: u16, hex: &str) -> Result<[u8; 8], KeyTableError> {
    if hex.len() != 16 {
        return Err(KeyTableError::WrongKeyLength { index, len: hex.len() });
    }
    let mut key = [0u8; 8];
    for (i, byte) in key.iter_mut().enumerate() {
        let slice = &hex[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(slice, 16).map_err(|source| KeyTableError::InvalidHex { index, source })?;
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_keys_from_json() {
        let json = r#"{"keys": {"42": "0011223344556677"}}"#;
        let table = KeyTable::from_json(json).unwrap();
        assert_eq!(table.get(42), Some(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]));
        assert_eq!(table.get(1), None);
    }

    #[test]
    fn rejects_wrong_length_hex() {
        let json = r#"{"keys": {"1": "00112233"}}"#;
        assert!(matches!(
            KeyTable::from_json(json),
            Err(KeyTableError::WrongKeyLength { .. })
        ));
    }

    #[test]
    fn rejects_non_hex() {
        let json = r#"{"keys": {"1": "zzzzzzzzzzzzzzzz"}}"#;
        assert!(matches!(
            KeyTable::from_json(json),
            Err(KeyTableError::InvalidHex { .. })
        ));
    }
}
