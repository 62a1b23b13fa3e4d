//! The entity model persisted by the storage engine.
//!
//! Logical time is the monotonically increasing input index assigned by the
//! host to each advance request; every "timestamp" below is either an input
//! index or a numeric field supplied by the attestor. The engine never reads
//! a wall clock.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The ordinal of an advance request. The engine's sole notion of time.
pub type InputIndex = u64;

/// Lifecycle of an attestation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationStatus {
    Active,
    Revoked,
    Expired,
    Superseded,
}

impl AttestationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::Superseded => "superseded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "revoked" => Some(Self::Revoked),
            "expired" => Some(Self::Expired),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }
}

/// A TEE-backed attestation over some web or device data. Buckets and data
/// chunks are owned by their attestation and cascade with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attestation {
    pub id: String,
    pub attestation_hash: String,
    pub owner_address: String,
    /// Inherited from the active provider schema at ingest.
    pub domain: String,
    pub provider: String,
    pub flow_type: String,
    pub attested_at_input: InputIndex,
    pub valid_from: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<i64>,
    /// Opaque witness; verified out-of-band by downstream consumers.
    pub tee_signature: String,
    pub status: AttestationStatus,
    /// Decayed integer score in `[0, 100]`.
    pub freshness_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    pub created_input: InputIndex,
}

/// One discretized value of an attestation, e.g. `balance = "1k-5k"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntry {
    pub attestation_id: String,
    pub bucket_key: String,
    pub bucket_value: String,
}

/// An encrypted data chunk attached to an attestation. The engine stores the
/// ciphertext as opaque bytes and never holds the data key.
#[derive(Debug, Clone)]
pub struct DataChunk {
    pub attestation_id: String,
    pub data_key: String,
    pub encrypted_value: Vec<u8>,
    pub encryption_key_id: String,
}

/// Authorization shape of an access grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantType {
    /// All data keys of the attestation.
    Full,
    /// Only the listed data keys.
    Partial,
    /// Reserved for a future aggregate-only query surface; the access
    /// predicate applies the same key rule as every other grant.
    Aggregate,
}

impl GrantType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::Aggregate => "aggregate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Self::Full),
            "partial" => Some(Self::Partial),
            "aggregate" => Some(Self::Aggregate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    Active,
    Revoked,
}

impl GrantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// A non-owning authorization reference from a grantee to an attestation.
/// Created by the attestation owner; revoked by the grantor only; never
/// re-activated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    pub id: String,
    pub attestation_id: String,
    pub grantee_address: String,
    /// The attestation owner at grant time.
    pub granted_by: String,
    /// `None` means every data key of the attestation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_keys: Option<Vec<String>>,
    pub grant_type: GrantType,
    pub granted_at_input: InputIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_input: Option<InputIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at_input: Option<InputIndex>,
    pub status: GrantStatus,
}

impl AccessGrant {
    /// Whether this grant is live at `current_input` (active and unexpired).
    pub fn is_live(&self, current_input: InputIndex) -> bool {
        self.status == GrantStatus::Active
            && self.expires_at_input.map_or(true, |e| e > current_input)
    }

    /// The key rule of the access predicate: a `None` key list allows every
    /// key; otherwise only the listed keys.
    pub fn allows_key(&self, data_key: &str) -> bool {
        match &self.data_keys {
            None => true,
            Some(keys) => keys.iter().any(|k| k == data_key),
        }
    }
}

/// A named discretization of a numeric field into ordinal labels. The
/// boundary values are schema metadata only; the engine never computes on
/// them, so they stay as raw JSON values (numbers, `"inf"`, null, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketDefinition {
    pub boundaries: Vec<serde_json::Value>,
    pub labels: Vec<String>,
}

impl BucketDefinition {
    /// Shape invariant: `boundaries.len() == labels.len() + 1`.
    pub fn is_well_formed(&self) -> bool {
        !self.labels.is_empty() && self.boundaries.len() == self.labels.len() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaStatus {
    Active,
    Deprecated,
}

impl SchemaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }
}

/// A versioned provider schema: the bucket vocabulary, data keys, and
/// freshness parameters every attestation of `(provider, flow_type)`
/// inherits. At most one version is active per pair, and it is the maximal
/// version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSchema {
    pub provider: String,
    pub flow_type: String,
    pub version: u32,
    pub domain: String,
    pub registered_by: String,
    pub registered_at_input: InputIndex,
    pub bucket_definitions: BTreeMap<String, BucketDefinition>,
    pub data_keys: Vec<String>,
    /// Input-index units for the freshness score to halve. Strictly positive.
    pub freshness_half_life: u64,
    /// Floor the decayed score never drops below.
    pub min_freshness: u8,
    pub status: SchemaStatus,
}

/// A wallet allowed to mutate the schema registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaAdmin {
    pub wallet_address: String,
    pub added_by: String,
    pub added_at_input: InputIndex,
    pub can_add_providers: bool,
    pub can_add_admins: bool,
}

/// An append-only signed device reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAttestation {
    pub id: i64,
    pub device_did: String,
    /// Opaque JSON text as supplied by the device.
    pub data: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub input_index: InputIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationLevel {
    Basic,
    Document,
    Biometric,
}

impl VerificationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Document => "document",
            Self::Biometric => "biometric",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(Self::Basic),
            "document" => Some(Self::Document),
            "biometric" => Some(Self::Biometric),
            _ => None,
        }
    }
}

/// An append-only KYC outcome recorded post-hoc by the attestor service.
/// `(user_did, provider, session_id)` is the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityAttestation {
    pub id: i64,
    pub user_did: String,
    pub provider: String,
    /// ISO-3166-1 alpha-2, uppercased on store.
    pub country_code: String,
    pub verification_level: VerificationLevel,
    pub verified: bool,
    pub issued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Stored verbatim; the attestor contract is out of scope here.
    pub attestor_signature: String,
    pub session_id: String,
    pub revoked: bool,
    pub input_index: InputIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Deprecated,
}

impl KeyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }
}

/// The public half of the key data-chunk ciphertexts are produced under.
/// At most one config is active; setting a new one deprecates the previous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub key_id: String,
    /// Base64, 32 bytes decoded.
    pub public_key: String,
    pub algorithm: String,
    /// Input index at which the key was set.
    pub created_at: InputIndex,
    pub status: KeyStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_definition_shape() {
        let def = BucketDefinition {
            boundaries: vec![0.into(), 1000.into(), 5000.into(), serde_json::Value::Null],
            labels: vec!["<1k".into(), "1k-5k".into(), ">5k".into()],
        };
        assert!(def.is_well_formed());

        let bad = BucketDefinition {
            boundaries: vec![0.into(), 1000.into()],
            labels: vec!["<1k".into(), ">1k".into()],
        };
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn grant_key_rule() {
        let mut grant = AccessGrant {
            id: "g1".into(),
            attestation_id: "att-1".into(),
            grantee_address: "0xcc".into(),
            granted_by: "0xbb".into(),
            data_keys: None,
            grant_type: GrantType::Full,
            granted_at_input: 3,
            expires_at_input: None,
            revoked_at_input: None,
            status: GrantStatus::Active,
        };
        assert!(grant.allows_key("anything"));

        grant.data_keys = Some(vec!["parameters".into()]);
        assert!(grant.allows_key("parameters"));
        assert!(!grant.allows_key("other"));
    }

    #[test]
    fn grant_expiry_is_strict() {
        let grant = AccessGrant {
            id: "g1".into(),
            attestation_id: "att-1".into(),
            grantee_address: "0xcc".into(),
            granted_by: "0xbb".into(),
            data_keys: None,
            grant_type: GrantType::Full,
            granted_at_input: 0,
            expires_at_input: Some(10),
            revoked_at_input: None,
            status: GrantStatus::Active,
        };
        assert!(grant.is_live(9));
        // Expiry is exclusive: at the expiry index the grant is dead.
        assert!(!grant.is_live(10));
        assert!(!grant.is_live(11));
    }

    #[test]
    fn status_round_trips() {
        for s in ["active", "revoked", "expired", "superseded"] {
            assert_eq!(AttestationStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(AttestationStatus::parse("gone").is_none());
    }
}
