//! Strict payload decoders for advance actions and inspect queries.
//!
//! The router parses the raw payload as untyped JSON, strips the dispatch
//! discriminant (`action` or `type`), and narrows the remainder into one of
//! these structs. Every struct rejects unknown fields, so handlers operate on
//! total values and never re-validate shape.
//!
//! Inspect parameters accept numbers and booleans in string form because the
//! path form of an inspect (`type/k1/v1/...`) carries every value as a string.

use crate::entity::{AttestationStatus, BucketDefinition, GrantType, VerificationLevel};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Deserializers tolerating the stringly-typed values of path-form inspects.
pub mod lenient {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;

    fn u64_from(v: &Value) -> Result<u64, String> {
        match v {
            Value::Number(n) => n.as_u64().ok_or_else(|| format!("not a u64: {n}")),
            Value::String(s) => s.parse().map_err(|_| format!("not a u64: {s:?}")),
            other => Err(format!("expected integer, got {other}")),
        }
    }

    fn bool_from(v: &Value) -> Result<bool, String> {
        match v {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(format!("not a bool: {other:?}")),
            },
            other => Err(format!("expected bool, got {other}")),
        }
    }

    pub fn opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(v) => u64_from(&v).map(Some).map_err(D::Error::custom),
        }
    }

    pub fn opt_u8<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
        Ok(opt_u64(d)?
            .map(u8::try_from)
            .transpose()
            .map_err(D::Error::custom)?)
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(v) => bool_from(&v).map(Some).map_err(D::Error::custom),
        }
    }
}

// --- Advance action parameters (the engine's public ABI) ---

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketValueParam {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataChunkParam {
    pub key: String,
    /// Base64 ciphertext; decoded to opaque bytes on ingest.
    #[serde(alias = "value_b64")]
    pub value: String,
    pub encryption_key_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestAttestationParams {
    pub id: String,
    pub attestation_hash: String,
    pub owner_address: String,
    pub provider: String,
    pub flow_type: String,
    pub valid_from: i64,
    #[serde(default)]
    pub valid_until: Option<i64>,
    pub tee_signature: String,
    #[serde(default)]
    pub buckets: Vec<BucketValueParam>,
    #[serde(default)]
    pub data: Vec<DataChunkParam>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevokeAttestationParams {
    pub attestation_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupersedeAttestationParams {
    pub old_attestation_id: String,
    pub new_attestation_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantAccessParams {
    pub grant_id: String,
    pub attestation_id: String,
    pub grantee_address: String,
    pub grant_type: GrantType,
    #[serde(default)]
    pub data_keys: Option<Vec<String>>,
    #[serde(default)]
    pub expires_at_input: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevokeAccessParams {
    pub grant_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterProviderSchemaParams {
    pub provider: String,
    pub flow_type: String,
    pub domain: String,
    pub bucket_definitions: BTreeMap<String, BucketDefinition>,
    pub data_keys: Vec<String>,
    pub freshness_half_life: u64,
    #[serde(default)]
    pub min_freshness: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeprecateProviderSchemaParams {
    pub provider: String,
    pub flow_type: String,
    pub version: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddSchemaAdminParams {
    pub wallet: String,
    #[serde(default)]
    pub can_add_providers: Option<bool>,
    #[serde(default)]
    pub can_add_admins: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveSchemaAdminParams {
    pub wallet: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetEncryptionKeyParams {
    /// Base64, 32 bytes decoded.
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceAttestationParams {
    pub device_did: String,
    /// The signed payload, verified against `signature` locally.
    pub data: serde_json::Value,
    /// JWS compact serialization (`H.P.S`), ES256K.
    pub signature: String,
    pub timestamp: i64,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityAttestationParams {
    pub user_did: String,
    pub provider: String,
    pub country_code: String,
    pub verification_level: VerificationLevel,
    pub verified: bool,
    pub issued_at: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub attestor_signature: String,
    pub session_id: String,
}

// --- Inspect query parameters ---

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetAttestationParams {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryByBucketParams {
    pub domain: String,
    #[serde(default)]
    pub provider: Option<String>,
    pub bucket_key: String,
    pub bucket_value: String,
    #[serde(default, deserialize_with = "lenient::opt_u8")]
    pub min_freshness: Option<u8>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub limit: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketCriterion {
    pub bucket_key: String,
    pub bucket_values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryByMultipleBucketsParams {
    pub domain: String,
    #[serde(default)]
    pub provider: Option<String>,
    pub criteria: Vec<BucketCriterion>,
    #[serde(default, deserialize_with = "lenient::opt_u8")]
    pub min_freshness: Option<u8>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub limit: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryByDomainParams {
    pub domain: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub flow_type: Option<String>,
    /// Defaults to `active`.
    #[serde(default)]
    pub status: Option<AttestationStatus>,
    #[serde(default, deserialize_with = "lenient::opt_u8")]
    pub min_freshness: Option<u8>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub limit: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountByBucketParams {
    pub domain: String,
    #[serde(default)]
    pub provider: Option<String>,
    pub bucket_key: String,
    #[serde(default, deserialize_with = "lenient::opt_u8")]
    pub min_freshness: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountByDomainParams {
    pub domain: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountByProviderParams {
    pub domain: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FreshnessStatsParams {
    pub domain: String,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvailableProvidersParams {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub active_only: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketDefinitionParams {
    pub provider: String,
    pub flow_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckAccessParams {
    pub attestation_id: String,
    pub grantee: String,
    /// Defaults to the engine's current input index.
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub current_input: Option<u64>,
    #[serde(default)]
    pub data_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttestationDataParams {
    pub attestation_id: String,
    pub grantee: String,
    #[serde(default)]
    pub data_key: Option<String>,
}
