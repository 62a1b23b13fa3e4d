//! Base58btc and base64 codecs.
//!
//! Two base64 flavors are in play: URL-safe without padding for JWS segments,
//! and standard base64 for envelope fields and configured keys. Both decoders
//! are indifferent to padding because upstream signers disagree about it.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use lcore_types::error::CryptoError;

const B64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes a base58btc string (no multibase prefix). Leading `'1'`
/// characters decode to leading zero bytes.
pub fn b58_decode(input: &str) -> Result<Vec<u8>, CryptoError> {
    bs58::decode(input)
        .into_vec()
        .map_err(|e| CryptoError::InvalidEncoding(format!("base58: {e}")))
}

/// Encodes bytes as base58btc.
pub fn b58_encode(input: &[u8]) -> String {
    bs58::encode(input).into_string()
}

/// Encodes bytes as base64url without padding.
pub fn b64url_encode(input: &[u8]) -> String {
    B64URL.encode(input)
}

/// Decodes base64url, tolerating missing padding.
pub fn b64url_decode(input: &str) -> Result<Vec<u8>, CryptoError> {
    B64URL
        .decode(input)
        .map_err(|e| CryptoError::InvalidEncoding(format!("base64url: {e}")))
}

/// Encodes bytes as standard base64 with padding.
pub fn b64_encode(input: &[u8]) -> String {
    B64.encode(input)
}

/// Decodes standard base64, tolerating missing padding.
pub fn b64_decode(input: &str) -> Result<Vec<u8>, CryptoError> {
    B64.decode(input)
        .map_err(|e| CryptoError::InvalidEncoding(format!("base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base58_preserves_leading_zeros() {
        // "11" encodes two zero bytes followed by nothing.
        assert_eq!(b58_decode("11").unwrap(), vec![0, 0]);
        // Round trip through an arbitrary buffer with a leading zero.
        let raw = [0u8, 60, 23, 110, 101, 155];
        assert_eq!(b58_decode(&b58_encode(&raw)).unwrap(), raw);
    }

    #[test]
    fn base58_rejects_invalid_characters() {
        // '0', 'O', 'I', 'l' are not in the base58btc alphabet.
        assert!(matches!(
            b58_decode("0OIl"),
            Err(CryptoError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn base64url_is_unpadded_and_tolerant() {
        let encoded = b64url_encode(b"hi");
        assert_eq!(encoded, "aGk");
        assert_eq!(b64url_decode("aGk").unwrap(), b"hi");
        // Padded input decodes too.
        assert_eq!(b64url_decode("aGk=").unwrap(), b"hi");
    }

    #[test]
    fn standard_base64_tolerates_missing_padding() {
        assert_eq!(b64_decode("aGk=").unwrap(), b"hi");
        assert_eq!(b64_decode("aGk").unwrap(), b"hi");
    }
}
