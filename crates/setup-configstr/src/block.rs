//! Conversions between byte blocks and block-addressed configuration strings.

use crate::encoding::{decode_value, encode_value};
use crate::error::{ConfigError, ConfigResult};
use crate::request::{ConfigElement, ConfigRequest, ConfigResp};

/// Render the elements named by `request` from `block` as a response.
pub fn block_to_config(request: &ConfigRequest, block: &[u8]) -> ConfigResult<String> {
    let mut resp = ConfigResp::new(request.header.clone());
    for element in request.elements() {
        let (offset, width) = match element {
            ConfigElement::Block { offset, width } => (*offset, *width),
            ConfigElement::Name(name) => {
                return Err(ConfigError::NotBlock { name: name.clone() })
            }
        };
        let start = usize::from(offset);
        let end = start + usize::from(width);
        if end > block.len() {
            return Err(ConfigError::OutOfRange {
                position: 0,
                size: block.len(),
            });
        }
        resp.push(element.clone(), encode_value(&block[start..end]));
    }
    Ok(resp.render())
}

/// Write every block entry of the response `config` into `block`.
///
/// Entries are applied in order; on failure the error carries the position
/// of the first entry that was not applied, and earlier entries stay written.
pub fn config_to_block(config: &str, block: &mut [u8]) -> ConfigResult<()> {
    let resp = ConfigResp::parse(config)?;
    apply_block_entries(&resp, block)
}

/// [`config_to_block`] for an already parsed response.
pub fn apply_block_entries(resp: &ConfigResp, block: &mut [u8]) -> ConfigResult<()> {
    for entry in &resp.entries {
        let ConfigElement::Block { offset, width } = &entry.element else {
            return Err(ConfigError::Unexpected {
                key: entry.element.to_string(),
                position: entry.position,
            });
        };
        let start = usize::from(*offset);
        let width = usize::from(*width);
        if start + width > block.len() {
            return Err(ConfigError::OutOfRange {
                position: entry.position,
                size: block.len(),
            });
        }
        let bytes = decode_value(&entry.value, width, entry.position)?;
        block[start..start + width].copy_from_slice(&bytes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ConfigHeader;
    use uuid::Uuid;

    fn request(elements: &[(u16, u16)]) -> ConfigRequest {
        let mut req = ConfigRequest::new(ConfigHeader::new(Uuid::nil(), "Setup"));
        for (offset, width) in elements {
            req.push(ConfigElement::block(*offset, *width));
        }
        req
    }

    #[test]
    fn test_block_round_trip_only_touches_requested_bytes() {
        let source = [1u8, 2, 3, 4];
        let text = block_to_config(&request(&[(1, 2)]), &source).unwrap();
        assert!(text.ends_with("&OFFSET=0001&WIDTH=0002&VALUE=0302"));

        let mut dest = [0u8; 4];
        config_to_block(&text, &mut dest).unwrap();
        assert_eq!(dest, [0, 2, 3, 0]);
    }

    #[test]
    fn test_out_of_range_request() {
        let err = block_to_config(&request(&[(3, 2)]), &[0u8; 4]).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { size: 4, .. }));
    }

    #[test]
    fn test_partial_apply_reports_progress() {
        let text = block_to_config(&request(&[(0, 1), (2, 2)]), &[9u8, 0, 7, 7]).unwrap();
        let mut small = [0u8; 3];
        let err = config_to_block(&text, &mut small).unwrap_err();
        let resp = ConfigResp::parse(&text).unwrap();
        assert_eq!(err.position(), Some(resp.entries[1].position));
        assert_eq!(small[0], 9);
    }
}
