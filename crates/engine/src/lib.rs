#![forbid(unsafe_code)]

//! Guest-side state machine of the L-Core attestation engine.
//!
//! An [`Engine`] owns the storage handle and the two optional envelope keys,
//! and exposes exactly two entry points to the router: [`Engine::handle_action`]
//! for advance requests and [`Engine::handle_query`] for inspects. Every
//! handler validates completely before its first write, so any returned error
//! implies an untouched database.
//!
//! Determinism rules: logical time is the advance request's input index,
//! threaded through [`context::RequestContext`]; the only randomness consumer
//! is outbound envelope sealing, whose output never feeds state.

pub mod access;
pub mod attestation;
pub mod context;
pub mod discovery;
pub mod envelope;
pub mod freshness;
pub mod registry;

use context::RequestContext;
use envelope::EnvelopeLayer;
use lcore_storage::Store;
use lcore_types::config::EngineConfig;
use lcore_types::{InputIndex, RequestError};
use serde_json::Value;

/// The engine: storage plus envelope policy, constructed once at startup.
pub struct Engine {
    store: Store,
    envelopes: EnvelopeLayer,
}

impl Engine {
    pub fn new(store: Store, config: &EngineConfig) -> Self {
        Self {
            store,
            envelopes: EnvelopeLayer::from_config(config),
        }
    }

    /// Read access for inspects and tests.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Mutable access for host-driven maintenance (vacuum/analyze) and
    /// snapshot import; never used by request handlers directly.
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Installs the policy hook consulted when the output mode is `custom`.
    pub fn with_output_policy(mut self, policy: Box<dyn envelope::OutputPolicy>) -> Self {
        self.envelopes = self.envelopes.with_policy(policy);
        self
    }

    /// Marks the start of an advance request: records the new input index
    /// and runs the bulk freshness pass. This is the single evaluation point
    /// of freshness decay; inspects read the scores it left behind.
    pub fn begin_advance(&mut self, input_index: InputIndex) -> Result<(), RequestError> {
        self.store.set_current_input(input_index)?;
        freshness::run_decay_pass(&mut self.store, input_index)?;
        Ok(())
    }

    /// Detects and decrypts an encrypted request envelope; plain payloads
    /// pass through untouched.
    pub fn unwrap_envelope(&self, payload: Value) -> Result<Value, RequestError> {
        self.envelopes.unwrap_inbound(payload)
    }

    /// Dispatches one advance action. Returns the notice payload, if the
    /// handler produced one.
    pub fn handle_action(
        &mut self,
        action: &str,
        params: Value,
        ctx: &RequestContext,
    ) -> Result<Option<Value>, RequestError> {
        match action {
            "ingest_attestation" => attestation::ingest(&mut self.store, params, ctx),
            "revoke_attestation" => attestation::revoke(&mut self.store, params, ctx),
            "supersede_attestation" => attestation::supersede(&mut self.store, params, ctx),
            "device_attestation" => attestation::device(&mut self.store, params, ctx),
            "identity_attestation" => attestation::identity(&mut self.store, params, ctx),
            "grant_access" => access::grant(&mut self.store, params, ctx),
            "revoke_access" => access::revoke(&mut self.store, params, ctx),
            "register_provider_schema" => registry::register_schema(&mut self.store, params, ctx),
            "deprecate_provider_schema" => registry::deprecate_schema(&mut self.store, params, ctx),
            "add_schema_admin" => registry::add_admin(&mut self.store, params, ctx),
            "remove_schema_admin" => registry::remove_admin(&mut self.store, params, ctx),
            "set_encryption_key" => registry::set_encryption_key(&mut self.store, params, ctx),
            other => Err(RequestError::UnknownAction(other.to_string())),
        }
    }

    /// Dispatches one inspect query. The returned value is already framed
    /// per the output mode where the result is sensitive.
    pub fn handle_query(&self, query_type: &str, params: Value) -> Result<Value, RequestError> {
        match query_type {
            "attestation" => discovery::attestation(&self.store, params),
            "query_by_bucket" => discovery::query_by_bucket(&self.store, params),
            "query_by_multiple_buckets" => {
                discovery::query_by_multiple_buckets(&self.store, params)
            }
            "query_by_domain" => discovery::query_by_domain(&self.store, params),
            "count_by_bucket" => discovery::count_by_bucket(&self.store, params),
            "count_by_domain" => discovery::count_by_domain(&self.store, params),
            "count_by_provider" => discovery::count_by_provider(&self.store, params),
            "freshness_stats" => discovery::freshness_stats(&self.store, params),
            "available_providers" => discovery::available_providers(&self.store, params),
            "bucket_definition" => discovery::bucket_definition(&self.store, params),
            "check_access" => access::check_query(&self.store, params),
            "attestation_data" => access::data_query(&self.store, &self.envelopes, params),
            "encryption_config" => registry::encryption_config_query(&self.store),
            "export_state" => {
                let blob = self.store.export_snapshot()?;
                let body = serde_json::json!({
                    "snapshot_b64": lcore_crypto::encoding::b64_encode(&blob),
                });
                self.envelopes.create_response(body, true)
            }
            other => Err(RequestError::UnknownQuery(other.to_string())),
        }
    }
}

/// Decodes action or query parameters into their strict form.
pub(crate) fn decode_params<T: serde::de::DeserializeOwned>(
    params: Value,
) -> Result<T, RequestError> {
    serde_json::from_value(params).map_err(|e| RequestError::BadRequest(e.to_string()))
}
