//! JWS compact-serialization verification, ES256K only.
//!
//! The signing input is always the raw ASCII `header.payload` segment of the
//! token; the decoded payload is compared against the caller's expected
//! payload under the canonical rule of [`crate::canonical`]. Re-serialization
//! never feeds the signature check.

use crate::canonical::canonically_equal;
use crate::did::parse_did_key;
use crate::encoding::b64url_decode;
use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use lcore_types::error::CryptoError;
use serde_json::Value;

const EXPECTED_ALG: &str = "ES256K";

/// The never-throwing verification verdict.
#[derive(Debug)]
pub struct JwsVerification {
    pub valid: bool,
    pub error: Option<CryptoError>,
}

/// Verifies a compact JWS against an expected payload and a signer did:key.
///
/// Checks, in order: structure (exactly three segments), header decode and
/// `alg == "ES256K"`, payload decode and canonical comparison, DID parse,
/// signature decode (64-byte raw `r||s`), and ECDSA/secp256k1 verification
/// over `SHA-256(header "." payload)`.
pub fn verify_jws(jws: &str, expected_payload: &Value, did: &str) -> Result<(), CryptoError> {
    let mut segments = jws.split('.');
    let (header_b64, payload_b64, signature_b64) = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => {
            return Err(CryptoError::MalformedJws(
                "expected three dot-separated segments".to_string(),
            ))
        }
    };

    let header_bytes = b64url_decode(header_b64)
        .map_err(|_| CryptoError::MalformedJws("header is not base64url".to_string()))?;
    let header: Value = serde_json::from_slice(&header_bytes)
        .map_err(|e| CryptoError::MalformedJws(format!("header is not JSON: {e}")))?;
    let alg = header.get("alg").and_then(Value::as_str).unwrap_or("");
    if alg != EXPECTED_ALG {
        return Err(CryptoError::UnsupportedAlgorithm {
            alg: alg.to_string(),
        });
    }

    let payload_bytes = b64url_decode(payload_b64)
        .map_err(|_| CryptoError::MalformedJws("payload is not base64url".to_string()))?;
    let payload: Value = serde_json::from_slice(&payload_bytes)
        .map_err(|e| CryptoError::MalformedJws(format!("payload is not JSON: {e}")))?;
    if !canonically_equal(&payload, expected_payload)? {
        return Err(CryptoError::PayloadMismatch);
    }

    let key = parse_did_key(did)?;
    let verifying_key = VerifyingKey::from_sec1_bytes(&key).map_err(|_| CryptoError::BadDidKey {
        reason: "not a valid secp256k1 point".to_string(),
    })?;

    let signature_bytes = b64url_decode(signature_b64)
        .map_err(|_| CryptoError::MalformedJws("signature is not base64url".to_string()))?;
    if signature_bytes.len() != 64 {
        return Err(CryptoError::MalformedJws(format!(
            "signature must be 64 bytes, got {}",
            signature_bytes.len()
        )));
    }
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| CryptoError::BadSignature)?;
    // ES256K does not mandate low-S; normalize before the strict verifier.
    let signature = signature.normalize_s().unwrap_or(signature);

    let signing_input_len = header_b64.len() + 1 + payload_b64.len();
    let signing_input = &jws.as_bytes()[..signing_input_len];
    verifying_key
        .verify(signing_input, &signature)
        .map_err(|_| CryptoError::BadSignature)
}

/// Wrapper around [`verify_jws`] that never propagates: returns the verdict
/// and the classified error, if any.
pub fn verify_jws_checked(jws: &str, expected_payload: &Value, did: &str) -> JwsVerification {
    match verify_jws(jws, expected_payload, did) {
        Ok(()) => JwsVerification {
            valid: true,
            error: None,
        },
        Err(e) => JwsVerification {
            valid: false,
            error: Some(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::did::encode_did_key;
    use crate::encoding::b64url_encode;
    use k256::ecdsa::signature::Signer;
    use k256::ecdsa::SigningKey;
    use serde_json::json;

    fn test_signer() -> (SigningKey, String) {
        let signing_key = SigningKey::from_bytes((&[7u8; 32]).into()).unwrap();
        let compressed: [u8; 33] = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .try_into()
            .unwrap();
        let did = encode_did_key(&compressed);
        (signing_key, did)
    }

    fn sign_payload(signing_key: &SigningKey, payload: &Value) -> String {
        let header = b64url_encode(br#"{"alg":"ES256K","typ":"JWT"}"#);
        let payload = b64url_encode(serde_json::to_string(payload).unwrap().as_bytes());
        let signing_input = format!("{header}.{payload}");
        let signature: Signature = signing_key.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            b64url_encode(&signature.to_bytes())
        )
    }

    #[test]
    fn accepts_a_valid_token() {
        let (sk, did) = test_signer();
        let payload = json!({"t": 23.4});
        let jws = sign_payload(&sk, &payload);
        assert!(verify_jws(&jws, &payload, &did).is_ok());
    }

    #[test]
    fn rejects_payload_substitution() {
        let (sk, did) = test_signer();
        let jws = sign_payload(&sk, &json!({"t": 23.4}));
        assert_eq!(
            verify_jws(&jws, &json!({"t": 99}), &did).unwrap_err(),
            CryptoError::PayloadMismatch
        );
    }

    #[test]
    fn rejects_expected_payload_with_reordered_fields() {
        let (sk, did) = test_signer();
        let signed: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let reordered: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        let jws = sign_payload(&sk, &signed);
        assert!(verify_jws(&jws, &signed, &did).is_ok());
        assert_eq!(
            verify_jws(&jws, &reordered, &did).unwrap_err(),
            CryptoError::PayloadMismatch
        );
    }

    #[test]
    fn rejects_wrong_algorithm() {
        let (sk, did) = test_signer();
        let payload = json!({"t": 1});
        let header = b64url_encode(br#"{"alg":"ES256","typ":"JWT"}"#);
        let body = b64url_encode(serde_json::to_string(&payload).unwrap().as_bytes());
        let signing_input = format!("{header}.{body}");
        let signature: Signature = sk.sign(signing_input.as_bytes());
        let jws = format!("{signing_input}.{}", b64url_encode(&signature.to_bytes()));
        assert!(matches!(
            verify_jws(&jws, &payload, &did),
            Err(CryptoError::UnsupportedAlgorithm { alg }) if alg == "ES256"
        ));
    }

    #[test]
    fn rejects_malformed_structure() {
        let (_, did) = test_signer();
        for bad in ["", "a.b", "a.b.c.d", "!.!.!"] {
            assert!(matches!(
                verify_jws(bad, &json!({}), &did),
                Err(CryptoError::MalformedJws(_))
            ));
        }
    }

    #[test]
    fn rejects_foreign_signature() {
        let (sk, _) = test_signer();
        let other = SigningKey::from_bytes((&[9u8; 32]).into()).unwrap();
        let compressed: [u8; 33] = other
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .try_into()
            .unwrap();
        let other_did = encode_did_key(&compressed);
        let payload = json!({"t": 23.4});
        let jws = sign_payload(&sk, &payload);
        assert_eq!(
            verify_jws(&jws, &payload, &other_did).unwrap_err(),
            CryptoError::BadSignature
        );
    }

    #[test]
    fn verification_is_deterministic() {
        let (sk, did) = test_signer();
        let payload = json!({"t": 23.4});
        let jws = sign_payload(&sk, &payload);
        for _ in 0..10 {
            assert!(verify_jws(&jws, &payload, &did).is_ok());
        }
        let checked = verify_jws_checked(&jws, &json!({"t": 0}), &did);
        for _ in 0..10 {
            let again = verify_jws_checked(&jws, &json!({"t": 0}), &did);
            assert_eq!(checked.valid, again.valid);
        }
    }
}
