//! Schema registry handlers: admins, provider schemas, encryption keys.

use crate::context::{normalize_address, RequestContext};
use crate::decode_params;
use lcore_crypto::encoding::b64_decode;
use lcore_crypto::hash::sha256_hex;
use lcore_storage::Store;
use lcore_types::entity::{EncryptionConfig, KeyStatus, ProviderSchema, SchemaAdmin, SchemaStatus};
use lcore_types::error::CryptoError;
use lcore_types::request::{
    AddSchemaAdminParams, DeprecateProviderSchemaParams, RegisterProviderSchemaParams,
    RemoveSchemaAdminParams, SetEncryptionKeyParams,
};
use lcore_types::RequestError;
use serde_json::{json, Value};

fn require_admin(store: &Store, sender: &str) -> Result<SchemaAdmin, RequestError> {
    store
        .admin(sender)?
        .ok_or_else(|| RequestError::Unauthorized(format!("{sender} is not a schema admin")))
}

/// `add_schema_admin`. An empty admin set is bootstrapped by the first
/// caller with both capabilities, regardless of request flags; this is the
/// sole path that grants `can_add_admins`. Afterwards only admins holding
/// `can_add_admins` may grow the set.
pub fn add_admin(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: AddSchemaAdminParams = decode_params(params)?;
    let wallet = normalize_address(&params.wallet);

    let bootstrap = store.admin_count()? == 0;
    if !bootstrap {
        let caller = require_admin(store, &ctx.sender)?;
        if !caller.can_add_admins {
            return Err(RequestError::Unauthorized(
                "adding admins requires the can_add_admins capability".to_string(),
            ));
        }
        if store.admin(&wallet)?.is_some() {
            return Err(RequestError::Conflict(format!("{wallet} is already an admin")));
        }
    }

    let admin = SchemaAdmin {
        wallet_address: wallet.clone(),
        added_by: ctx.sender.clone(),
        added_at_input: ctx.input_index,
        can_add_providers: if bootstrap {
            true
        } else {
            params.can_add_providers.unwrap_or(true)
        },
        // Outside bootstrap the capability is never granted.
        can_add_admins: bootstrap,
    };
    store.insert_admin(&admin)?;
    tracing::info!(wallet = %wallet, bootstrap, "schema admin added");
    Ok(Some(json!({
        "action": "add_schema_admin",
        "wallet": wallet,
        "can_add_providers": admin.can_add_providers,
        "can_add_admins": admin.can_add_admins,
    })))
}

/// `remove_schema_admin`. Removing the last holder of `can_add_admins`
/// would orphan the registry, so it is rejected.
pub fn remove_admin(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: RemoveSchemaAdminParams = decode_params(params)?;
    let wallet = normalize_address(&params.wallet);

    let caller = require_admin(store, &ctx.sender)?;
    if !caller.can_add_admins {
        return Err(RequestError::Unauthorized(
            "removing admins requires the can_add_admins capability".to_string(),
        ));
    }
    let target = store
        .admin(&wallet)?
        .ok_or_else(|| RequestError::NotFound(format!("admin {wallet}")))?;
    if target.can_add_admins && store.admin_grantor_count()? <= 1 {
        return Err(RequestError::Conflict(
            "cannot remove the last admin able to add admins".to_string(),
        ));
    }
    store.remove_admin(&wallet)?;
    Ok(Some(json!({ "action": "remove_schema_admin", "wallet": wallet })))
}

/// `register_provider_schema`. Allocates `version = max(existing) + 1` and
/// atomically deprecates any previously active version of the pair.
pub fn register_schema(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: RegisterProviderSchemaParams = decode_params(params)?;
    let caller = require_admin(store, &ctx.sender)?;
    if !caller.can_add_providers {
        return Err(RequestError::Unauthorized(
            "registering schemas requires the can_add_providers capability".to_string(),
        ));
    }

    if params.data_keys.is_empty() {
        return Err(RequestError::BadRequest("data_keys must not be empty".to_string()));
    }
    if params.freshness_half_life == 0 {
        return Err(RequestError::BadRequest(
            "freshness_half_life must be positive".to_string(),
        ));
    }
    let min_freshness = params.min_freshness.unwrap_or(0);
    if min_freshness > 100 {
        return Err(RequestError::BadRequest(
            "min_freshness must be at most 100".to_string(),
        ));
    }
    for (key, definition) in &params.bucket_definitions {
        if !definition.is_well_formed() {
            return Err(RequestError::BadRequest(format!(
                "bucket {key:?} must have boundaries.len() == labels.len() + 1"
            )));
        }
    }

    let provider = params.provider.to_ascii_lowercase();
    let flow_type = params.flow_type.to_ascii_lowercase();
    let version = store.max_schema_version(&provider, &flow_type)? + 1;
    let schema = ProviderSchema {
        provider: provider.clone(),
        flow_type: flow_type.clone(),
        version,
        domain: params.domain.to_ascii_lowercase(),
        registered_by: ctx.sender.clone(),
        registered_at_input: ctx.input_index,
        bucket_definitions: params
            .bucket_definitions
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect(),
        data_keys: params.data_keys,
        freshness_half_life: params.freshness_half_life,
        min_freshness,
        status: SchemaStatus::Active,
    };
    store.insert_schema(&schema)?;
    tracing::info!(provider = %provider, flow_type = %flow_type, version, "provider schema registered");
    Ok(Some(json!({
        "action": "register_provider_schema",
        "provider": provider,
        "flow_type": flow_type,
        "version": version,
        "domain": schema.domain,
    })))
}

/// `deprecate_provider_schema`. One-way transition.
pub fn deprecate_schema(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: DeprecateProviderSchemaParams = decode_params(params)?;
    let caller = require_admin(store, &ctx.sender)?;
    if !caller.can_add_providers {
        return Err(RequestError::Unauthorized(
            "deprecating schemas requires the can_add_providers capability".to_string(),
        ));
    }
    let provider = params.provider.to_ascii_lowercase();
    let flow_type = params.flow_type.to_ascii_lowercase();
    let schema = store
        .schema_version(&provider, &flow_type, params.version)?
        .ok_or_else(|| {
            RequestError::NotFound(format!(
                "schema {provider}/{flow_type} version {}",
                params.version
            ))
        })?;
    if schema.status == SchemaStatus::Deprecated {
        return Err(RequestError::Conflict("schema is already deprecated".to_string()));
    }
    store.deprecate_schema(&provider, &flow_type, params.version)?;
    Ok(Some(json!({
        "action": "deprecate_provider_schema",
        "provider": provider,
        "flow_type": flow_type,
        "version": params.version,
    })))
}

/// `set_encryption_key`. Bootstrap analogue of the admin set: before any
/// admin exists, any sender may set the first key; afterwards the sender
/// must be an admin. The previous active key is deprecated atomically.
pub fn set_encryption_key(
    store: &mut Store,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, RequestError> {
    let params: SetEncryptionKeyParams = decode_params(params)?;
    if store.admin_count()? > 0 {
        require_admin(store, &ctx.sender)?;
    }
    let raw = b64_decode(&params.public_key)?;
    if raw.len() != 32 {
        return Err(RequestError::Crypto(CryptoError::InvalidKey(format!(
            "public key must be 32 bytes, got {}",
            raw.len()
        ))));
    }
    // Content-addressed id: stable across replays, no counter to carry.
    let key_id = sha256_hex(&raw)[..16].to_string();
    let config = EncryptionConfig {
        key_id: key_id.clone(),
        public_key: params.public_key,
        algorithm: "nacl-box".to_string(),
        created_at: ctx.input_index,
        status: KeyStatus::Active,
    };
    store.set_encryption_config(&config)?;
    tracing::info!(key_id = %key_id, "encryption key rotated");
    Ok(Some(json!({ "action": "set_encryption_key", "key_id": key_id })))
}

/// The `encryption_config` inspect: the active key config, if any.
pub fn encryption_config_query(store: &Store) -> Result<Value, RequestError> {
    match store.active_encryption_config()? {
        Some(config) => Ok(json!({
            "key_id": config.key_id,
            "public_key": config.public_key,
            "algorithm": config.algorithm,
            "created_at": config.created_at,
            "status": config.status,
        })),
        None => Ok(json!({ "active": Value::Null })),
    }
}
