//! Hex encodings used inside configuration strings.
//!
//! - Block values (`VALUE=`) and numeric name/value entries are the
//!   little-endian bytes printed most-significant byte first.
//! - Text (storage names, string entries) is one 4-digit hex group per
//!   UTF-16 code unit.
//! - GUIDs are their in-memory (mixed-endian) bytes in order.

use crate::error::{ConfigError, ConfigResult};
use uuid::Uuid;

/// Hex image of little-endian `bytes`, most significant byte first.
pub fn encode_value(bytes: &[u8]) -> String {
    let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
    hex::encode(reversed)
}

/// Inverse of [`encode_value`], producing exactly `width` bytes.
///
/// Odd-length input is left-padded with a zero digit; shorter input is
/// zero-extended. `position` is reported on failure.
pub fn decode_value(text: &str, width: usize, position: usize) -> ConfigResult<Vec<u8>> {
    let padded = if text.len() % 2 == 1 {
        format!("0{text}")
    } else {
        text.to_string()
    };
    let mut bytes = hex::decode(&padded).map_err(|_| ConfigError::InvalidHex { position })?;
    bytes.reverse();
    if bytes.len() > width {
        if bytes[width..].iter().any(|b| *b != 0) {
            return Err(ConfigError::ValueTooWide { position, width });
        }
        bytes.truncate(width);
    }
    bytes.resize(width, 0);
    Ok(bytes)
}

/// Fixed-width hex image of an integer (`2 * width` digits).
pub fn encode_number(value: u64, width: usize) -> String {
    encode_value(&value.to_le_bytes()[..width.min(8)])
}

pub fn decode_number(text: &str, position: usize) -> ConfigResult<u64> {
    let bytes = decode_value(text, 8, position)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes);
    Ok(u64::from_le_bytes(raw))
}

/// One 4-digit hex group per UTF-16 code unit.
pub fn encode_utf16(text: &str) -> String {
    text.encode_utf16().map(|unit| format!("{unit:04x}")).collect()
}

pub fn decode_utf16(text: &str, position: usize) -> ConfigResult<String> {
    if text.len() % 4 != 0 || !text.is_ascii() {
        return Err(ConfigError::InvalidHex { position });
    }
    let units = text
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            std::str::from_utf8(chunk)
                .ok()
                .and_then(|s| u16::from_str_radix(s, 16).ok())
                .ok_or(ConfigError::InvalidHex { position })
        })
        .collect::<ConfigResult<Vec<u16>>>()?;
    let end = units.iter().position(|u| *u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..end]).map_err(|_| ConfigError::InvalidHex { position })
}

pub fn encode_guid(guid: &Uuid) -> String {
    hex::encode(guid.to_bytes_le())
}

pub fn decode_guid(text: &str, position: usize) -> ConfigResult<Uuid> {
    let bytes = hex::decode(text).map_err(|_| ConfigError::InvalidHex { position })?;
    let raw: [u8; 16] = bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidHex { position })?;
    Ok(Uuid::from_bytes_le(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_is_printed_msb_first() {
        assert_eq!(encode_value(&[0x34, 0x12]), "1234");
        assert_eq!(decode_value("1234", 2, 0).unwrap(), vec![0x34, 0x12]);
    }

    #[test]
    fn test_decode_value_zero_extends_and_pads() {
        assert_eq!(decode_value("5", 4, 0).unwrap(), vec![5, 0, 0, 0]);
    }

    #[test]
    fn test_decode_value_rejects_wide_input() {
        let err = decode_value("010000", 2, 7).unwrap_err();
        assert_eq!(err, ConfigError::ValueTooWide { position: 7, width: 2 });
        // Leading zero bytes are tolerated.
        assert_eq!(decode_value("000005", 2, 0).unwrap(), vec![5, 0]);
    }

    #[test]
    fn test_number_encoding_width() {
        assert_eq!(encode_number(5, 2), "0005");
        assert_eq!(decode_number("0005", 0).unwrap(), 5);
    }

    #[test]
    fn test_utf16_hex() {
        assert_eq!(encode_utf16("AB"), "00410042");
        assert_eq!(decode_utf16("004100420000", 0).unwrap(), "AB");
        assert!(decode_utf16("041", 3).is_err());
    }

    #[test]
    fn test_guid_hex() {
        let guid = Uuid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff);
        let text = encode_guid(&guid);
        assert!(text.starts_with("33221100"));
        assert_eq!(decode_guid(&text, 0).unwrap(), guid);
    }
}
