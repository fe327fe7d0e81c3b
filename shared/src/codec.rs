use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{StudioError, StudioResult};

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(text: &str) -> StudioResult<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| StudioError::CorruptStore(format!("invalid audio encoding: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_round_trips() {
        let encoded = encode(&[]);
        assert_eq!(encoded, "");
        assert!(decode(&encoded).unwrap().is_empty());
    }

    #[test]
    fn binary_payload_round_trips() {
        // Not valid UTF-8 on purpose
        let payload: Vec<u8> = vec![0x00, 0xff, 0xfe, 0x80, 0xc3, 0x28, 0x52, 0x49, 0x46, 0x46];
        assert_eq!(decode(&encode(&payload)).unwrap(), payload);

        let every_byte: Vec<u8> = (0..=255u8).rev().collect();
        assert_eq!(decode(&encode(&every_byte)).unwrap(), every_byte);
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let err = decode("not*base64!").unwrap_err();
        assert!(matches!(err, StudioError::CorruptStore(_)));
    }
}
