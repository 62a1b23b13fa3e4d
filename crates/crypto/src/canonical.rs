//! Canonical JSON for signed-payload comparison.
//!
//! The protocol rule is: fields in the order emitted by the signer, compact
//! separators, no whitespace. This crate's `serde_json` is built with
//! `preserve_order`, so a parsed object keeps its insertion order and
//! re-serializing it compactly is exactly the canonical form. Callers must
//! therefore supply expected payloads whose field order matches what the
//! signer emitted.
//!
//! Note this is deliberately NOT a sorted-key canonicalization: the signing
//! input of a JWS is the raw `H.P` bytes, and the only job of this module is
//! to compare two payloads under the signer's own ordering.

use lcore_types::error::CryptoError;
use serde_json::Value;

/// Serializes a JSON value in canonical form: preserved key order, compact
/// separators, no trailing whitespace.
pub fn to_canonical_json(value: &Value) -> Result<String, CryptoError> {
    serde_json::to_string(value).map_err(|e| CryptoError::MalformedJws(format!("serialize: {e}")))
}

/// Whether two values are equal under the canonical form. Key order is
/// significant; `{"a":1,"b":2}` and `{"b":2,"a":1}` are NOT canonically
/// equal even though they compare equal as JSON values.
pub fn canonically_equal(a: &Value, b: &Value) -> Result<bool, CryptoError> {
    Ok(to_canonical_json(a)? == to_canonical_json(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_and_order_preserving() {
        let v: Value = serde_json::from_str(r#"{ "b": 2, "a": 1 }"#).unwrap();
        assert_eq!(to_canonical_json(&v).unwrap(), r#"{"b":2,"a":1}"#);
    }

    #[test]
    fn key_order_is_significant() {
        let ab: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let ba: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        // Plain Value equality ignores order; the canonical rule must not.
        assert_eq!(ab, ba);
        assert!(!canonically_equal(&ab, &ba).unwrap());
        assert!(canonically_equal(&ab, &ab.clone()).unwrap());
    }

    #[test]
    fn nested_structures() {
        let a = json!({"t": 23.4, "tags": ["x", "y"], "m": {"k": null}});
        assert!(canonically_equal(&a, &a.clone()).unwrap());
        let b = json!({"t": 23.5, "tags": ["x", "y"], "m": {"k": null}});
        assert!(!canonically_equal(&a, &b).unwrap());
    }
}
