//! Access-grant handlers and the access-evaluation predicate.

use crate::context::{normalize_address, RequestContext};
use crate::decode_params;
use crate::envelope::EnvelopeLayer;
use lcore_crypto::encoding::b64_encode;
use lcore_storage::Store;
use lcore_types::entity::{AccessGrant, AttestationStatus, GrantStatus, GrantType};
use lcore_types::request::{
    AttestationDataParams, CheckAccessParams, GrantAccessParams, RevokeAccessParams,
};
use lcore_types::{InputIndex, RequestError};
use serde_json::{json, Map, Value};

/// `grant_access`. Only the owner of an active attestation may grant.
/// `partial` requires a non-empty key list; `full` stores no list (every
/// key); `aggregate` is a label with the same key rule as the others.
pub fn grant(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: GrantAccessParams = decode_params(params)?;
    let grant_id = params.grant_id.to_ascii_lowercase();
    let attestation_id = params.attestation_id.to_ascii_lowercase();

    let attestation = store
        .attestation(&attestation_id)?
        .ok_or_else(|| RequestError::NotFound(format!("attestation {attestation_id}")))?;
    if attestation.owner_address != ctx.sender {
        return Err(RequestError::Unauthorized(
            "only the attestation owner may grant access".to_string(),
        ));
    }
    if attestation.status != AttestationStatus::Active {
        return Err(RequestError::Conflict(format!(
            "attestation {attestation_id} is {}, not active",
            attestation.status.as_str()
        )));
    }
    if store.grant(&grant_id)?.is_some() {
        return Err(RequestError::Conflict(format!("grant {grant_id} already exists")));
    }
    if let Some(expires) = params.expires_at_input {
        if expires <= ctx.input_index {
            return Err(RequestError::BadRequest(
                "expires_at_input must be in the future".to_string(),
            ));
        }
    }

    let data_keys = match params.grant_type {
        GrantType::Full => {
            // Full access stores no key list.
            None
        }
        GrantType::Partial => match &params.data_keys {
            Some(keys) if !keys.is_empty() => Some(keys.clone()),
            _ => {
                return Err(RequestError::BadRequest(
                    "partial grants require a non-empty data_keys".to_string(),
                ))
            }
        },
        GrantType::Aggregate => params.data_keys.clone().filter(|keys| !keys.is_empty()),
    };

    let grant = AccessGrant {
        id: grant_id.clone(),
        attestation_id: attestation_id.clone(),
        grantee_address: normalize_address(&params.grantee_address),
        granted_by: ctx.sender.clone(),
        data_keys,
        grant_type: params.grant_type,
        granted_at_input: ctx.input_index,
        expires_at_input: params.expires_at_input,
        revoked_at_input: None,
        status: GrantStatus::Active,
    };
    store.insert_grant(&grant)?;
    tracing::info!(grant_id = %grant_id, attestation_id = %attestation_id, "access granted");
    Ok(Some(json!({
        "action": "grant_access",
        "grant_id": grant_id,
        "attestation_id": attestation_id,
        "grantee_address": grant.grantee_address,
        "grant_type": grant.grant_type,
    })))
}

/// `revoke_access`. Grantor-only; active grants only; never re-activated.
pub fn revoke(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: RevokeAccessParams = decode_params(params)?;
    let grant_id = params.grant_id.to_ascii_lowercase();
    let grant = store
        .grant(&grant_id)?
        .ok_or_else(|| RequestError::NotFound(format!("grant {grant_id}")))?;
    if grant.granted_by != ctx.sender {
        return Err(RequestError::Unauthorized(
            "only the grantor may revoke a grant".to_string(),
        ));
    }
    if grant.status != GrantStatus::Active {
        return Err(RequestError::Conflict(format!("grant {grant_id} is already revoked")));
    }
    store.revoke_grant(&grant_id, ctx.input_index)?;
    Ok(Some(json!({ "action": "revoke_access", "grant_id": grant_id })))
}

/// The access predicate: total and side-effect free. Scans the grantee's
/// active grants on the attestation, skipping expired ones; without a
/// `data_key` any live grant suffices, otherwise the grant's key rule
/// decides.
pub fn check(
    store: &Store,
    attestation_id: &str,
    grantee: &str,
    current_input: InputIndex,
    data_key: Option<&str>,
) -> Result<(bool, Option<AccessGrant>), RequestError> {
    let grants = store.active_grants_for(attestation_id, grantee)?;
    for grant in grants {
        if !grant.is_live(current_input) {
            continue;
        }
        let allowed = match data_key {
            None => true,
            Some(key) => grant.allows_key(key),
        };
        if allowed {
            return Ok((true, Some(grant)));
        }
    }
    Ok((false, None))
}

/// The `check_access` inspect.
pub fn check_query(store: &Store, params: Value) -> Result<Value, RequestError> {
    let params: CheckAccessParams = decode_params(params)?;
    let current_input = match params.current_input {
        Some(value) => value,
        None => store.current_input()?,
    };
    let (has_access, grant) = check(
        store,
        &params.attestation_id.to_ascii_lowercase(),
        &normalize_address(&params.grantee),
        current_input,
        params.data_key.as_deref(),
    )?;
    let grant = grant
        .map(|g| serde_json::to_value(&g).map_err(|e| RequestError::Internal(e.to_string())))
        .transpose()?;
    Ok(json!({
        "hasAccess": has_access,
        "grant": grant,
    }))
}

/// The gated `attestation_data` inspect. Denials and data alike are framed
/// per the output mode; encrypted chunk bytes travel as base64.
pub fn data_query(
    store: &Store,
    envelopes: &EnvelopeLayer,
    params: Value,
) -> Result<Value, RequestError> {
    let params: AttestationDataParams = decode_params(params)?;
    let attestation_id = params.attestation_id.to_ascii_lowercase();
    let grantee = normalize_address(&params.grantee);
    let current_input = store.current_input()?;

    let (has_access, grant) = check(
        store,
        &attestation_id,
        &grantee,
        current_input,
        params.data_key.as_deref(),
    )?;
    let Some(grant) = grant.filter(|_| has_access) else {
        return envelopes.create_response(
            json!({
                "error": "Access denied",
                "reason": "no live grant covers this request",
            }),
            true,
        );
    };

    let chunks = match &params.data_key {
        Some(key) => {
            let chunk = store
                .chunk(&attestation_id, key)?
                .ok_or_else(|| RequestError::NotFound(format!("data key {key:?}")))?;
            vec![chunk]
        }
        None => {
            let all = store.chunks_for(&attestation_id)?;
            match &grant.data_keys {
                None => all,
                Some(allowed) => all
                    .into_iter()
                    .filter(|chunk| allowed.iter().any(|k| k == &chunk.data_key))
                    .collect(),
            }
        }
    };

    let mut data = Map::new();
    for chunk in &chunks {
        data.insert(
            chunk.data_key.clone(),
            json!({
                "value": b64_encode(&chunk.encrypted_value),
                "encryption_key_id": chunk.encryption_key_id,
            }),
        );
    }
    envelopes.create_response(
        json!({
            "attestation_id": attestation_id,
            "grant_id": grant.id,
            "data": data,
        }),
        true,
    )
}
