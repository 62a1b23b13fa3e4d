//! Discovery inspect handlers. All read-only; all explicitly ordered.

use crate::decode_params;
use lcore_storage::Store;
use lcore_types::entity::Attestation;
use lcore_types::request::{
    AvailableProvidersParams, BucketDefinitionParams, CountByBucketParams, CountByDomainParams,
    CountByProviderParams, FreshnessStatsParams, GetAttestationParams, QueryByBucketParams,
    QueryByDomainParams, QueryByMultipleBucketsParams,
};
use lcore_types::RequestError;
use serde_json::{json, Map, Value};

fn attestation_json(attestation: &Attestation) -> Result<Value, RequestError> {
    serde_json::to_value(attestation).map_err(|e| RequestError::Internal(e.to_string()))
}

fn records_json(records: &[Attestation]) -> Result<Value, RequestError> {
    let rendered = records
        .iter()
        .map(attestation_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "count": records.len(),
        "records": rendered,
    }))
}

/// `attestation/<id>`: one record with its bucket entries.
pub fn attestation(store: &Store, params: Value) -> Result<Value, RequestError> {
    let params: GetAttestationParams = decode_params(params)?;
    let id = params.id.to_ascii_lowercase();
    let record = store
        .attestation(&id)?
        .ok_or_else(|| RequestError::NotFound(format!("attestation {id}")))?;
    let buckets = store
        .buckets_for(&id)?
        .into_iter()
        .map(|b| json!({ "key": b.bucket_key, "value": b.bucket_value }))
        .collect::<Vec<_>>();
    Ok(json!({
        "attestation": attestation_json(&record)?,
        "buckets": buckets,
    }))
}

pub fn query_by_bucket(store: &Store, params: Value) -> Result<Value, RequestError> {
    let mut params: QueryByBucketParams = decode_params(params)?;
    params.domain = params.domain.to_ascii_lowercase();
    params.bucket_key = params.bucket_key.to_ascii_lowercase();
    params.provider = params.provider.map(|p| p.to_ascii_lowercase());
    records_json(&store.query_by_bucket(&params)?)
}

pub fn query_by_multiple_buckets(store: &Store, params: Value) -> Result<Value, RequestError> {
    let mut params: QueryByMultipleBucketsParams = decode_params(params)?;
    if params.criteria.is_empty() {
        return Err(RequestError::BadRequest("criteria must not be empty".to_string()));
    }
    for criterion in &params.criteria {
        if criterion.bucket_values.is_empty() {
            return Err(RequestError::BadRequest(format!(
                "criterion {:?} has no bucket_values",
                criterion.bucket_key
            )));
        }
    }
    params.domain = params.domain.to_ascii_lowercase();
    params.provider = params.provider.map(|p| p.to_ascii_lowercase());
    for criterion in &mut params.criteria {
        criterion.bucket_key = criterion.bucket_key.to_ascii_lowercase();
    }
    records_json(&store.query_by_multiple_buckets(&params)?)
}

pub fn query_by_domain(store: &Store, params: Value) -> Result<Value, RequestError> {
    let mut params: QueryByDomainParams = decode_params(params)?;
    params.domain = params.domain.to_ascii_lowercase();
    params.provider = params.provider.map(|p| p.to_ascii_lowercase());
    params.flow_type = params.flow_type.map(|f| f.to_ascii_lowercase());
    records_json(&store.query_by_domain(&params)?)
}

pub fn count_by_bucket(store: &Store, params: Value) -> Result<Value, RequestError> {
    let mut params: CountByBucketParams = decode_params(params)?;
    params.domain = params.domain.to_ascii_lowercase();
    params.bucket_key = params.bucket_key.to_ascii_lowercase();
    params.provider = params.provider.map(|p| p.to_ascii_lowercase());
    let counts = store.count_by_bucket(&params)?;
    let mut rendered = Map::new();
    for (value, owners) in counts {
        rendered.insert(value, json!(owners));
    }
    Ok(json!({
        "domain": params.domain,
        "bucket_key": params.bucket_key,
        "counts": rendered,
    }))
}

pub fn count_by_domain(store: &Store, params: Value) -> Result<Value, RequestError> {
    let params: CountByDomainParams = decode_params(params)?;
    let domain = params.domain.to_ascii_lowercase();
    Ok(json!({
        "domain": domain,
        "count": store.count_by_domain(&domain)?,
    }))
}

pub fn count_by_provider(store: &Store, params: Value) -> Result<Value, RequestError> {
    let params: CountByProviderParams = decode_params(params)?;
    let domain = params.domain.to_ascii_lowercase();
    let mut rendered = Map::new();
    for (provider, count) in store.count_by_provider(&domain)? {
        rendered.insert(provider, json!(count));
    }
    Ok(json!({
        "domain": domain,
        "counts": rendered,
    }))
}

pub fn freshness_stats(store: &Store, params: Value) -> Result<Value, RequestError> {
    let params: FreshnessStatsParams = decode_params(params)?;
    let domain = params.domain.to_ascii_lowercase();
    let provider = params.provider.map(|p| p.to_ascii_lowercase());
    let stats = store.freshness_stats(&domain, provider.as_deref())?;
    Ok(json!({
        "domain": domain,
        "count": stats.count,
        "avg": stats.avg,
        "min": stats.min,
        "max": stats.max,
        "tiers": {
            "fresh": stats.fresh,
            "recent": stats.recent,
            "aging": stats.aging,
            "stale": stats.stale,
        },
    }))
}

pub fn available_providers(store: &Store, params: Value) -> Result<Value, RequestError> {
    let params: AvailableProvidersParams = decode_params(params)?;
    let domain = params.domain.map(|d| d.to_ascii_lowercase());
    let schemas = store.list_schemas(domain.as_deref(), params.active_only.unwrap_or(true))?;
    let providers = schemas
        .iter()
        .map(|s| {
            json!({
                "provider": s.provider,
                "flow_type": s.flow_type,
                "version": s.version,
                "domain": s.domain,
                "status": s.status,
            })
        })
        .collect::<Vec<_>>();
    Ok(json!({ "providers": providers }))
}

pub fn bucket_definition(store: &Store, params: Value) -> Result<Value, RequestError> {
    let params: BucketDefinitionParams = decode_params(params)?;
    let provider = params.provider.to_ascii_lowercase();
    let flow_type = params.flow_type.to_ascii_lowercase();
    let schema = store.active_schema(&provider, &flow_type)?.ok_or_else(|| {
        RequestError::NotFound(format!("no active schema for {provider}/{flow_type}"))
    })?;
    let bucket_definitions = serde_json::to_value(&schema.bucket_definitions)
        .map_err(|e| RequestError::Internal(e.to_string()))?;
    Ok(json!({
        "provider": provider,
        "flow_type": flow_type,
        "version": schema.version,
        "bucket_definitions": bucket_definitions,
        "data_keys": schema.data_keys,
        "freshness_half_life": schema.freshness_half_life,
        "min_freshness": schema.min_freshness,
    }))
}
