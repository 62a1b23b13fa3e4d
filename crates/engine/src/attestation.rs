//! Attestation lifecycle handlers: ingest, revoke, supersede, and the
//! device/identity flows.

use crate::context::{normalize_address, RequestContext};
use crate::decode_params;
use lcore_crypto::did::parse_did_key;
use lcore_crypto::encoding::b64_decode;
use lcore_crypto::jws::verify_jws;
use lcore_storage::identity::{NewDeviceAttestation, NewIdentityAttestation};
use lcore_storage::Store;
use lcore_types::entity::{Attestation, AttestationStatus, BucketEntry, DataChunk};
use lcore_types::request::{
    DeviceAttestationParams, IdentityAttestationParams, IngestAttestationParams,
    RevokeAttestationParams, SupersedeAttestationParams,
};
use lcore_types::RequestError;
use serde_json::{json, Value};

/// `ingest_attestation`. The attestation inherits its domain and bucket
/// vocabulary from the active provider schema; without one the ingest is
/// rejected. The `tee_signature` is an opaque witness, verified out-of-band
/// by downstream consumers.
pub fn ingest(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: IngestAttestationParams = decode_params(params)?;
    let id = params.id.to_ascii_lowercase();
    let provider = params.provider.to_ascii_lowercase();
    let flow_type = params.flow_type.to_ascii_lowercase();

    if store.attestation_exists(&id)? {
        return Err(RequestError::Conflict(format!("attestation {id} already exists")));
    }
    let schema = store.active_schema(&provider, &flow_type)?.ok_or_else(|| {
        RequestError::NotFound(format!(
            "unknown provider: no active schema for {provider}/{flow_type}"
        ))
    })?;
    if let Some(valid_until) = params.valid_until {
        if valid_until <= params.valid_from {
            return Err(RequestError::BadRequest(
                "valid_until must be after valid_from".to_string(),
            ));
        }
    }

    let mut buckets = Vec::with_capacity(params.buckets.len());
    for bucket in &params.buckets {
        let key = bucket.key.to_ascii_lowercase();
        if !schema.bucket_definitions.contains_key(&key) {
            return Err(RequestError::BadRequest(format!(
                "bucket {key:?} is not defined by schema {provider}/{flow_type} v{}",
                schema.version
            )));
        }
        buckets.push(BucketEntry {
            attestation_id: id.clone(),
            bucket_key: key,
            bucket_value: bucket.value.clone(),
        });
    }

    let mut chunks = Vec::with_capacity(params.data.len());
    for chunk in &params.data {
        if !schema.data_keys.iter().any(|k| k == &chunk.key) {
            return Err(RequestError::BadRequest(format!(
                "data key {:?} is not defined by schema {provider}/{flow_type} v{}",
                chunk.key, schema.version
            )));
        }
        let encrypted_value = b64_decode(&chunk.value)?;
        chunks.push(DataChunk {
            attestation_id: id.clone(),
            data_key: chunk.key.clone(),
            encrypted_value,
            encryption_key_id: chunk.encryption_key_id.clone(),
        });
    }

    let attestation = Attestation {
        id: id.clone(),
        attestation_hash: params.attestation_hash,
        owner_address: normalize_address(&params.owner_address),
        domain: schema.domain.clone(),
        provider,
        flow_type,
        attested_at_input: ctx.input_index,
        valid_from: params.valid_from,
        valid_until: params.valid_until,
        tee_signature: params.tee_signature,
        status: AttestationStatus::Active,
        freshness_score: 100,
        superseded_by: None,
        created_input: ctx.input_index,
    };
    store.insert_attestation(&attestation, &buckets, &chunks)?;
    tracing::info!(id = %id, domain = %attestation.domain, "attestation ingested");
    Ok(Some(json!({
        "action": "ingest_attestation",
        "attestation_id": id,
        "domain": attestation.domain,
        "status": attestation.status,
        "freshness_score": attestation.freshness_score,
    })))
}

/// `revoke_attestation`. Owner-only; only active attestations revoke.
pub fn revoke(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: RevokeAttestationParams = decode_params(params)?;
    let id = params.attestation_id.to_ascii_lowercase();
    let attestation = store
        .attestation(&id)?
        .ok_or_else(|| RequestError::NotFound(format!("attestation {id}")))?;
    if attestation.owner_address != ctx.sender {
        return Err(RequestError::Unauthorized(
            "only the attestation owner may revoke".to_string(),
        ));
    }
    if attestation.status != AttestationStatus::Active {
        return Err(RequestError::Conflict(format!(
            "attestation {id} is {}, not active",
            attestation.status.as_str()
        )));
    }
    store.set_attestation_status(&id, AttestationStatus::Revoked)?;
    Ok(Some(json!({
        "action": "revoke_attestation",
        "attestation_id": id,
        "status": AttestationStatus::Revoked,
    })))
}

/// `supersede_attestation`. The caller owns both records, both share a
/// `(provider, flow_type)` pair, and the old one must still be active. The
/// new attestation's lifecycle is unaffected.
pub fn supersede(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: SupersedeAttestationParams = decode_params(params)?;
    let old_id = params.old_attestation_id.to_ascii_lowercase();
    let new_id = params.new_attestation_id.to_ascii_lowercase();

    let old = store
        .attestation(&old_id)?
        .ok_or_else(|| RequestError::NotFound(format!("attestation {old_id}")))?;
    let new = store
        .attestation(&new_id)?
        .ok_or_else(|| RequestError::NotFound(format!("attestation {new_id}")))?;
    if old.owner_address != ctx.sender || new.owner_address != ctx.sender {
        return Err(RequestError::Unauthorized(
            "caller must own both attestations".to_string(),
        ));
    }
    if (old.provider.as_str(), old.flow_type.as_str())
        != (new.provider.as_str(), new.flow_type.as_str())
    {
        return Err(RequestError::Conflict(
            "attestations must share provider and flow type".to_string(),
        ));
    }
    if old.status != AttestationStatus::Active {
        return Err(RequestError::Conflict(format!(
            "attestation {old_id} is {}, not active",
            old.status.as_str()
        )));
    }
    store.mark_superseded(&old_id, &new_id)?;
    Ok(Some(json!({
        "action": "supersede_attestation",
        "old_attestation_id": old_id,
        "new_attestation_id": new_id,
    })))
}

/// `device_attestation`. Validates the DID and verifies the supplied JWS
/// against the reading itself before appending.
pub fn device(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: DeviceAttestationParams = decode_params(params)?;
    parse_did_key(&params.device_did)?;
    verify_jws(&params.signature, &params.data, &params.device_did)?;

    let data = serde_json::to_string(&params.data)
        .map_err(|e| RequestError::Internal(e.to_string()))?;
    let id = store.insert_device_attestation(&NewDeviceAttestation {
        device_did: &params.device_did,
        data: &data,
        timestamp: params.timestamp,
        source: params.source.as_deref(),
        input_index: ctx.input_index,
    })?;
    tracing::debug!(id, device_did = %params.device_did, "device attestation recorded");
    Ok(Some(json!({
        "action": "device_attestation",
        "id": id,
        "device_did": params.device_did,
        "verified": true,
    })))
}

/// `identity_attestation`. Idempotent per `(user_did, provider, session_id)`:
/// a replay is rejected with a reference to the existing row. The attestor
/// signature is stored verbatim; its contract is out of scope here.
pub fn identity(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: IdentityAttestationParams = decode_params(params)?;
    parse_did_key(&params.user_did)?;

    let country_code = params.country_code.to_ascii_uppercase();
    if country_code.len() != 2 || !country_code.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(RequestError::BadRequest(format!(
            "country_code must be ISO-3166-1 alpha-2, got {:?}",
            params.country_code
        )));
    }
    let provider = params.provider.to_ascii_lowercase();

    if let Some(existing) =
        store.identity_attestation_by_session(&params.user_did, &provider, &params.session_id)?
    {
        return Err(RequestError::Conflict(format!(
            "identity attestation already recorded as id {}",
            existing.id
        )));
    }

    let id = store.insert_identity_attestation(&NewIdentityAttestation {
        user_did: &params.user_did,
        provider: &provider,
        country_code: &country_code,
        verification_level: params.verification_level,
        verified: params.verified,
        issued_at: params.issued_at,
        expires_at: params.expires_at,
        attestor_signature: &params.attestor_signature,
        session_id: &params.session_id,
        input_index: ctx.input_index,
    })?;
    Ok(Some(json!({
        "action": "identity_attestation",
        "id": id,
        "provider": provider,
        "verified": params.verified,
    })))
}
