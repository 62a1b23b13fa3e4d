//! The envelope layer: inbound decryption and outbound response framing.
//!
//! Keys come from configuration once at startup. A missing or unusable key
//! disables its direction with a warning; it never fails startup.

use lcore_crypto::envelope::{
    open, public_key_from_b64, seal, secret_key_from_b64, EncryptedEnvelope, PublicKey, SecretKey,
};
use lcore_types::config::{EngineConfig, OutputMode};
use lcore_types::error::CryptoError;
use lcore_types::RequestError;
use serde_json::Value;

/// Policy hook for [`OutputMode::Custom`]. Receives the sensitive response
/// body and returns whatever should be emitted instead.
pub trait OutputPolicy: Send {
    fn render(&self, data: Value) -> Result<Value, RequestError>;
}

pub struct EnvelopeLayer {
    input_key: Option<SecretKey>,
    output_key: Option<PublicKey>,
    mode: OutputMode,
    policy: Option<Box<dyn OutputPolicy>>,
}

impl EnvelopeLayer {
    pub fn from_config(config: &EngineConfig) -> Self {
        let input_key = match &config.input_private_key {
            None => {
                tracing::warn!("no input private key configured; inbound decryption disabled");
                None
            }
            Some(encoded) => match secret_key_from_b64(encoded) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(error = %e, "input private key unusable; inbound decryption disabled");
                    None
                }
            },
        };
        let output_key = match &config.output_public_key {
            None => {
                tracing::warn!("no output public key configured; outbound encryption disabled");
                None
            }
            Some(encoded) => match public_key_from_b64(encoded) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(error = %e, "output public key unusable; outbound encryption disabled");
                    None
                }
            },
        };
        Self {
            input_key,
            output_key,
            mode: config.output_mode,
            policy: None,
        }
    }

    /// Installs the hook consulted under [`OutputMode::Custom`].
    pub fn with_policy(mut self, policy: Box<dyn OutputPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// If the payload is an encrypted envelope, decrypts it and returns the
    /// inner JSON; otherwise returns the payload unchanged. A payload that
    /// announces `encrypted: true` commits to the envelope shape.
    pub fn unwrap_inbound(&self, payload: Value) -> Result<Value, RequestError> {
        let is_marked = payload.get("encrypted").and_then(Value::as_bool) == Some(true);
        if !is_marked {
            return Ok(payload);
        }
        let inner = payload
            .get("payload")
            .cloned()
            .ok_or_else(|| RequestError::BadRequest("encrypted payload missing".to_string()))?;
        let envelope: EncryptedEnvelope = serde_json::from_value(inner)
            .map_err(|e| RequestError::BadRequest(format!("malformed envelope: {e}")))?;
        let Some(secret) = &self.input_key else {
            return Err(RequestError::Crypto(CryptoError::BadCiphertext(
                "no input private key configured".to_string(),
            )));
        };
        let plaintext = open(secret, &envelope)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| RequestError::BadRequest(format!("decrypted payload is not JSON: {e}")))
    }

    /// Frames a response body. Non-sensitive data passes through; sensitive
    /// data is framed per the output mode.
    pub fn create_response(&self, data: Value, sensitive: bool) -> Result<Value, RequestError> {
        if !sensitive {
            return Ok(data);
        }
        match self.mode {
            OutputMode::Encrypted => match &self.output_key {
                Some(recipient) => {
                    let plaintext = serde_json::to_vec(&data)
                        .map_err(|e| RequestError::Internal(e.to_string()))?;
                    let envelope = seal(recipient, &plaintext)?;
                    Ok(serde_json::json!({
                        "encrypted": true,
                        "payload": envelope,
                    }))
                }
                None => Ok(serde_json::json!({ "encrypted": false, "data": data })),
            },
            OutputMode::Raw => Ok(serde_json::json!({ "encrypted": false, "data": data })),
            OutputMode::Custom => match &self.policy {
                Some(policy) => policy.render(data),
                None => Ok(serde_json::json!({ "encrypted": false, "data": data })),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcore_crypto::encoding::b64_encode;
    use serde_json::json;

    fn layer_with_keys() -> (EnvelopeLayer, SecretKey, SecretKey) {
        let input_secret = SecretKey::from([0x11; 32]);
        let output_secret = SecretKey::from([0x22; 32]);
        let config = EngineConfig {
            input_private_key: Some(b64_encode(&input_secret.to_bytes())),
            output_public_key: Some(b64_encode(output_secret.public_key().as_bytes())),
            output_mode: OutputMode::Encrypted,
        };
        (EnvelopeLayer::from_config(&config), input_secret, output_secret)
    }

    #[test]
    fn plain_payloads_pass_through() {
        let (layer, _, _) = layer_with_keys();
        let payload = json!({"action": "revoke_attestation", "attestation_id": "att-1"});
        assert_eq!(layer.unwrap_inbound(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn encrypted_payloads_are_opened() {
        let (layer, input_secret, _) = layer_with_keys();
        let inner = json!({"action": "revoke_attestation", "attestation_id": "att-1"});
        let envelope = seal(
            &input_secret.public_key(),
            serde_json::to_vec(&inner).unwrap().as_slice(),
        )
        .unwrap();
        let wrapped = json!({"encrypted": true, "payload": envelope});
        assert_eq!(layer.unwrap_inbound(wrapped).unwrap(), inner);
    }

    #[test]
    fn marked_but_malformed_envelope_rejects() {
        let (layer, _, _) = layer_with_keys();
        let wrapped = json!({"encrypted": true, "payload": {"nope": 1}});
        assert!(matches!(
            layer.unwrap_inbound(wrapped),
            Err(RequestError::BadRequest(_))
        ));
    }

    #[test]
    fn missing_input_key_rejects_ciphertext() {
        let layer = EnvelopeLayer::from_config(&EngineConfig::default());
        let other = SecretKey::from([0x33; 32]);
        let envelope = seal(&other.public_key(), b"{}").unwrap();
        let wrapped = json!({"encrypted": true, "payload": envelope});
        assert!(matches!(
            layer.unwrap_inbound(wrapped),
            Err(RequestError::Crypto(CryptoError::BadCiphertext(_)))
        ));
    }

    #[test]
    fn sensitive_responses_are_sealed_for_the_output_key() {
        let (layer, _, output_secret) = layer_with_keys();
        let body = json!({"secret": "value"});
        let framed = layer.create_response(body.clone(), true).unwrap();
        assert_eq!(framed["encrypted"], true);
        let envelope: EncryptedEnvelope =
            serde_json::from_value(framed["payload"].clone()).unwrap();
        let plaintext = open(&output_secret, &envelope).unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&plaintext).unwrap(), body);

        // Non-sensitive data is never framed.
        assert_eq!(layer.create_response(body.clone(), false).unwrap(), body);
    }

    #[test]
    fn raw_mode_and_missing_key_fall_back_to_plaintext() {
        let raw = EnvelopeLayer::from_config(&EngineConfig {
            input_private_key: None,
            output_public_key: None,
            output_mode: OutputMode::Raw,
        });
        let framed = raw.create_response(json!({"x": 1}), true).unwrap();
        assert_eq!(framed, json!({"encrypted": false, "data": {"x": 1}}));

        let encrypted_without_key = EnvelopeLayer::from_config(&EngineConfig {
            input_private_key: None,
            output_public_key: None,
            output_mode: OutputMode::Encrypted,
        });
        let framed = encrypted_without_key
            .create_response(json!({"x": 1}), true)
            .unwrap();
        assert_eq!(framed["encrypted"], false);
    }
}
