//! `did:key` parsing for secp256k1 public keys.
//!
//! A did:key self-describes its public key: `did:key:z<base58btc>` where the
//! decoded bytes start with the multicodec prefix `0xE7 0x01`
//! (secp256k1-pub) followed by the 33-byte compressed SEC1 point.

use crate::encoding::b58_decode;
use lcore_types::error::CryptoError;

/// Multicodec prefix for secp256k1-pub.
pub const SECP256K1_PUB_MULTICODEC: [u8; 2] = [0xE7, 0x01];

fn bad(reason: &str) -> CryptoError {
    CryptoError::BadDidKey {
        reason: reason.to_string(),
    }
}

/// Parses a `did:key` and returns the 33-byte compressed secp256k1 public
/// key it encodes.
pub fn parse_did_key(did: &str) -> Result<[u8; 33], CryptoError> {
    let multibase = did
        .strip_prefix("did:key:")
        .ok_or_else(|| bad("missing did:key: prefix"))?;
    let encoded = multibase
        .strip_prefix('z')
        .ok_or_else(|| bad("missing base58btc multibase prefix 'z'"))?;
    let bytes = b58_decode(encoded).map_err(|_| bad("invalid base58"))?;
    if bytes.len() < 35 {
        return Err(bad("decoded key is too short"));
    }
    if bytes[0..2] != SECP256K1_PUB_MULTICODEC {
        return Err(bad("multicodec prefix is not secp256k1-pub"));
    }
    let mut key = [0u8; 33];
    key.copy_from_slice(&bytes[2..35]);
    Ok(key)
}

/// Renders a compressed secp256k1 public key as a `did:key`.
pub fn encode_did_key(compressed: &[u8; 33]) -> String {
    let mut bytes = Vec::with_capacity(35);
    bytes.extend_from_slice(&SECP256K1_PUB_MULTICODEC);
    bytes.extend_from_slice(compressed);
    format!("did:key:z{}", crate::encoding::b58_encode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> [u8; 33] {
        let mut key = [0u8; 33];
        key[0] = 0x02;
        key[32] = 0x7f;
        key
    }

    #[test]
    fn round_trip() {
        let key = sample_key();
        let did = encode_did_key(&key);
        assert!(did.starts_with("did:key:z"));
        assert_eq!(parse_did_key(&did).unwrap(), key);
    }

    #[test]
    fn rejects_missing_prefixes() {
        assert!(matches!(
            parse_did_key("did:web:example.com"),
            Err(CryptoError::BadDidKey { .. })
        ));
        assert!(matches!(
            parse_did_key("did:key:abc"),
            Err(CryptoError::BadDidKey { .. })
        ));
    }

    #[test]
    fn rejects_wrong_multicodec() {
        // 0xED 0x01 is ed25519-pub; the engine only accepts secp256k1.
        let mut bytes = vec![0xED, 0x01];
        bytes.extend_from_slice(&[0u8; 33]);
        let did = format!("did:key:z{}", crate::encoding::b58_encode(&bytes));
        let err = parse_did_key(&did).unwrap_err();
        match err {
            CryptoError::BadDidKey { reason } => assert!(reason.contains("secp256k1")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_short_keys() {
        let mut bytes = vec![0xE7, 0x01];
        bytes.extend_from_slice(&[0u8; 16]);
        let did = format!("did:key:z{}", crate::encoding::b58_encode(&bytes));
        assert!(matches!(
            parse_did_key(&did),
            Err(CryptoError::BadDidKey { .. })
        ));
    }
}
