//! Error taxonomy for the attestation engine.
//!
//! Every recoverable failure maps onto one of the request-level kinds
//! (`BadRequest`, `Unauthorized`, `NotFound`, `Conflict`, `Crypto`,
//! `Internal`). Each variant carries a stable machine-readable code so hosts
//! and indexers can match on failures without parsing display strings.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors produced by the cryptographic primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A base58/base64/hex input could not be decoded.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
    /// A `did:key` identifier failed to parse or carried the wrong multicodec.
    #[error("Bad did:key: {reason}")]
    BadDidKey {
        /// Why the DID was rejected.
        reason: String,
    },
    /// A JWS compact serialization was structurally invalid.
    #[error("Malformed JWS: {0}")]
    MalformedJws(String),
    /// The JWS header named an algorithm other than ES256K.
    #[error("Unsupported JWS algorithm: {alg}")]
    UnsupportedAlgorithm {
        /// The algorithm the header named.
        alg: String,
    },
    /// The signed payload does not canonically match the expected payload.
    #[error("JWS payload does not match the expected payload")]
    PayloadMismatch,
    /// The ECDSA signature failed verification.
    #[error("Signature verification failed")]
    BadSignature,
    /// An encrypted envelope could not be authenticated or decrypted.
    #[error("Envelope decryption failed: {0}")]
    BadCiphertext(String),
    /// A key had the wrong length or was otherwise unusable.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidEncoding(_) => "CRYPTO_INVALID_ENCODING",
            Self::BadDidKey { .. } => "CRYPTO_BAD_DID_KEY",
            Self::MalformedJws(_) => "CRYPTO_MALFORMED_JWS",
            Self::UnsupportedAlgorithm { .. } => "CRYPTO_UNSUPPORTED_ALGORITHM",
            Self::PayloadMismatch => "CRYPTO_PAYLOAD_MISMATCH",
            Self::BadSignature => "CRYPTO_BAD_SIGNATURE",
            Self::BadCiphertext(_) => "CRYPTO_BAD_CIPHERTEXT",
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
        }
    }
}

/// Errors surfaced by the storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The underlying SQLite engine reported a failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
    /// A stored value (typically a JSON column) failed to decode.
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
    /// Snapshot export or import failed.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORAGE_BACKEND_ERROR",
            Self::Corrupt(_) => "STORAGE_CORRUPT_VALUE",
            Self::Snapshot(_) => "STORAGE_SNAPSHOT_ERROR",
        }
    }
}

/// The request-level error taxonomy shared by all advance and inspect
/// handlers. Handlers validate fully before their first write, so any of
/// these implies no state mutation occurred.
#[derive(Error, Debug)]
pub enum RequestError {
    /// Payload shape or field invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// The advance payload named an action with no registered handler.
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    /// The inspect payload named a query type with no registered handler.
    #[error("Unknown query type: {0}")]
    UnknownQuery(String),
    /// Sender allowlist or handler-specific ownership/admin check failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// A referenced id is absent.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Duplicate id, duplicate session, or an illegal state transition.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A cryptographic check failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Storage failure or invariant violation.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An invariant violation that is not attributable to the request.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ErrorCode for RequestError {
    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::UnknownAction(_) => "UNKNOWN_ACTION",
            Self::UnknownQuery(_) => "UNKNOWN_QUERY",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Crypto(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl RequestError {
    /// Renders the structured body emitted in reject responses and failure
    /// reports: `{"error": <display>, "code": <stable code>}`.
    pub fn response_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(RequestError::UnknownAction("x".into()).code(), "UNKNOWN_ACTION");
        assert_eq!(
            RequestError::from(CryptoError::PayloadMismatch).code(),
            "CRYPTO_PAYLOAD_MISMATCH"
        );
        assert_eq!(
            RequestError::from(StorageError::Backend("oops".into())).code(),
            "STORAGE_BACKEND_ERROR"
        );
    }

    #[test]
    fn response_body_carries_code_and_message() {
        let body = RequestError::NotFound("attestation att-9".into()).response_body();
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["error"], "Not found: attestation att-9");
    }
}
