//! NaCl-box envelopes for request and response payloads.
//!
//! An envelope carries the ephemeral public key and nonce alongside the
//! ciphertext, so any holder of the long-term secret key can open it:
//! X25519 agreement between the ephemeral key and the long-term key, then
//! XSalsa20-Poly1305. [`seal`] is the single consumer of host randomness in
//! the workspace; its output feeds outgoing envelopes only.

use crate::encoding::{b64_decode, b64_encode};
use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{Nonce, SalsaBox};
pub use crypto_box::{PublicKey, SecretKey};
use lcore_types::error::CryptoError;
use serde::{Deserialize, Serialize};

/// The only envelope version understood by this engine.
pub const ENVELOPE_VERSION: u32 = 1;
/// The only envelope algorithm understood by this engine.
pub const ENVELOPE_ALGORITHM: &str = "nacl-box";

const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Wire form of an encrypted payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EncryptedEnvelope {
    pub version: u32,
    pub algorithm: String,
    /// Base64, 24 bytes.
    pub nonce: String,
    /// Base64.
    pub ciphertext: String,
    /// Base64, 32 bytes: the sender's ephemeral public key.
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Parses a base64 32-byte X25519 secret key.
pub fn secret_key_from_b64(encoded: &str) -> Result<SecretKey, CryptoError> {
    let bytes = b64_decode(encoded)?;
    let bytes: [u8; KEY_LEN] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("secret key must be 32 bytes".to_string()))?;
    Ok(SecretKey::from(bytes))
}

/// Parses a base64 32-byte X25519 public key.
pub fn public_key_from_b64(encoded: &str) -> Result<PublicKey, CryptoError> {
    let bytes = b64_decode(encoded)?;
    let bytes: [u8; KEY_LEN] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("public key must be 32 bytes".to_string()))?;
    Ok(PublicKey::from(bytes))
}

/// Opens an envelope with the long-term secret key. The ephemeral public key
/// comes from the envelope itself.
pub fn open(secret_key: &SecretKey, envelope: &EncryptedEnvelope) -> Result<Vec<u8>, CryptoError> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(CryptoError::BadCiphertext(format!(
            "unsupported envelope version {}",
            envelope.version
        )));
    }
    if envelope.algorithm != ENVELOPE_ALGORITHM {
        return Err(CryptoError::BadCiphertext(format!(
            "unsupported algorithm {:?}",
            envelope.algorithm
        )));
    }
    let nonce = b64_decode(&envelope.nonce)?;
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::BadCiphertext(
            "nonce must be 24 bytes".to_string(),
        ));
    }
    let sender = public_key_from_b64(&envelope.public_key)?;
    let ciphertext = b64_decode(&envelope.ciphertext)?;

    SalsaBox::new(&sender, secret_key)
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| CryptoError::BadCiphertext("authentication failed".to_string()))
}

/// Seals plaintext for a recipient under a fresh ephemeral keypair and nonce.
///
/// This is the one place the engine consumes operating-system randomness.
/// The randomness appears only in the returned envelope; replaying the same
/// request stream produces different ciphertext bytes but identical
/// plaintext and identical engine state.
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<EncryptedEnvelope, CryptoError> {
    let ephemeral = SecretKey::generate(&mut OsRng);
    let nonce = SalsaBox::generate_nonce(&mut OsRng);
    let ciphertext = SalsaBox::new(recipient, &ephemeral)
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::BadCiphertext("encryption failed".to_string()))?;

    Ok(EncryptedEnvelope {
        version: ENVELOPE_VERSION,
        algorithm: ENVELOPE_ALGORITHM.to_string(),
        nonce: b64_encode(&nonce),
        ciphertext: b64_encode(&ciphertext),
        public_key: b64_encode(ephemeral.public_key().as_bytes()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (SecretKey, PublicKey) {
        let secret = SecretKey::from([0x42; 32]);
        let public = secret.public_key();
        (secret, public)
    }

    #[test]
    fn seal_open_round_trip() {
        let (secret, public) = keypair();
        let plaintext = br#"{"action":"ping","n":1}"#;
        let envelope = seal(&public, plaintext).unwrap();
        assert_eq!(envelope.version, ENVELOPE_VERSION);
        assert_eq!(envelope.algorithm, ENVELOPE_ALGORITHM);
        assert_eq!(open(&secret, &envelope).unwrap(), plaintext);
    }

    #[test]
    fn two_seals_differ_but_open_identically() {
        let (secret, public) = keypair();
        let plaintext = b"same plaintext";
        let a = seal(&public, plaintext).unwrap();
        let b = seal(&public, plaintext).unwrap();
        // Fresh ephemeral key and nonce per envelope.
        assert_ne!(a, b);
        assert_eq!(open(&secret, &a).unwrap(), open(&secret, &b).unwrap());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let (secret, public) = keypair();
        let mut envelope = seal(&public, b"payload").unwrap();
        let mut raw = b64_decode(&envelope.ciphertext).unwrap();
        raw[0] ^= 0x01;
        envelope.ciphertext = b64_encode(&raw);
        assert!(matches!(
            open(&secret, &envelope),
            Err(CryptoError::BadCiphertext(_))
        ));
    }

    #[test]
    fn wrong_version_or_algorithm_is_rejected() {
        let (secret, public) = keypair();
        let envelope = seal(&public, b"payload").unwrap();

        let mut wrong_version = envelope.clone();
        wrong_version.version = 2;
        assert!(open(&secret, &wrong_version).is_err());

        let mut wrong_algorithm = envelope;
        wrong_algorithm.algorithm = "aes-gcm".to_string();
        assert!(open(&secret, &wrong_algorithm).is_err());
    }

    #[test]
    fn key_parsers_enforce_length() {
        assert!(matches!(
            secret_key_from_b64(&b64_encode(&[0u8; 16])),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            public_key_from_b64(&b64_encode(&[0u8; 31])),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(secret_key_from_b64(&b64_encode(&[7u8; 32])).is_ok());
    }
}
