//! The request router: edge validation, envelope handling, and dispatch.
//!
//! The router owns the engine and enforces everything that applies before a
//! handler runs: the sender allowlist, the payload and string-length caps,
//! JSON parsing, and envelope decryption. Advance handlers produce notices;
//! inspects produce reports and never reject.

use lcore_engine::context::{normalize_address, RequestContext};
use lcore_engine::Engine;
use lcore_types::config::RouterConfig;
use lcore_types::{ErrorCode, InputIndex, RequestError};
use serde_json::{Map, Value};

/// What the host should be told about an advance, plus the outputs to emit
/// before finishing. Rejected requests carry their diagnostics as reports.
#[derive(Debug, PartialEq)]
pub struct AdvanceOutcome {
    pub accept: bool,
    pub notices: Vec<Value>,
    pub reports: Vec<Value>,
}

impl AdvanceOutcome {
    fn rejected(error: &RequestError) -> Self {
        Self {
            accept: false,
            notices: Vec::new(),
            reports: vec![error.response_body()],
        }
    }
}

pub struct Router {
    engine: Engine,
    config: RouterConfig,
}

impl Router {
    pub fn new(engine: Engine, config: RouterConfig) -> Self {
        if config.authorized_senders.is_empty() {
            tracing::warn!("no sender allowlist configured; accepting all senders (development mode)");
        }
        Self { engine, config }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Processes one advance request to completion.
    pub fn handle_advance(
        &mut self,
        sender: &str,
        input_index: InputIndex,
        payload: &[u8],
    ) -> AdvanceOutcome {
        match self.advance_inner(sender, input_index, payload) {
            Ok(notice) => AdvanceOutcome {
                accept: true,
                notices: notice.into_iter().collect(),
                reports: Vec::new(),
            },
            Err(e) => {
                tracing::warn!(input_index, code = e.code(), error = %e, "advance rejected");
                AdvanceOutcome::rejected(&e)
            }
        }
    }

    fn advance_inner(
        &mut self,
        sender: &str,
        input_index: InputIndex,
        payload: &[u8],
    ) -> Result<Option<Value>, RequestError> {
        let sender = normalize_address(sender);
        if !self.config.authorized_senders.is_empty()
            && !self.config.authorized_senders.iter().any(|s| s == &sender)
        {
            return Err(RequestError::Unauthorized(format!(
                "sender {sender} is not authorized"
            )));
        }
        let parsed = self.parse_payload(payload)?;

        // Logical time advances and freshness decays before dispatch, for
        // accepted and rejected actions alike.
        self.engine.begin_advance(input_index)?;

        let parsed = self.engine.unwrap_envelope(parsed)?;
        // The decrypted inner payload is subject to the same caps.
        self.check_string_lengths(&parsed)?;

        let Value::Object(mut fields) = parsed else {
            return Err(RequestError::BadRequest(
                "advance payload must be a JSON object".to_string(),
            ));
        };
        let action = match fields.remove("action") {
            Some(Value::String(action)) => action,
            Some(_) => {
                return Err(RequestError::BadRequest("action must be a string".to_string()))
            }
            None => return Err(RequestError::BadRequest("missing action".to_string())),
        };

        let ctx = RequestContext::new(&sender, input_index);
        self.engine
            .handle_action(&action, Value::Object(fields), &ctx)
    }

    /// Processes one inspect request. Always produces exactly one report;
    /// failures are reported, never rejected.
    pub fn handle_inspect(&self, payload: &[u8]) -> Value {
        match self.inspect_inner(payload) {
            Ok(report) => report,
            Err(e) => e.response_body(),
        }
    }

    fn inspect_inner(&self, payload: &[u8]) -> Result<Value, RequestError> {
        if payload.len() > self.config.max_payload_size {
            return Err(RequestError::BadRequest(format!(
                "payload of {} bytes exceeds the {}-byte limit",
                payload.len(),
                self.config.max_payload_size
            )));
        }
        let text = std::str::from_utf8(payload)
            .map_err(|_| RequestError::BadRequest("payload is not UTF-8".to_string()))?;

        let (query_type, params) = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(mut fields)) => {
                let query_type = match fields.remove("type") {
                    Some(Value::String(t)) => t,
                    _ => {
                        return Err(RequestError::BadRequest(
                            "inspect payload must carry a string type".to_string(),
                        ))
                    }
                };
                let params = fields.remove("params").unwrap_or(Value::Object(Map::new()));
                (query_type, params)
            }
            _ => parse_path_inspect(text)?,
        };
        self.check_string_lengths(&params)?;
        self.engine.handle_query(&query_type, params)
    }

    fn parse_payload(&self, payload: &[u8]) -> Result<Value, RequestError> {
        if payload.len() > self.config.max_payload_size {
            return Err(RequestError::BadRequest(format!(
                "payload of {} bytes exceeds the {}-byte limit",
                payload.len(),
                self.config.max_payload_size
            )));
        }
        let text = std::str::from_utf8(payload)
            .map_err(|_| RequestError::BadRequest("payload is not UTF-8".to_string()))?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RequestError::BadRequest(format!("payload is not JSON: {e}")))?;
        self.check_string_lengths(&value)?;
        Ok(value)
    }

    /// Recursively enforces the per-string byte cap.
    fn check_string_lengths(&self, value: &Value) -> Result<(), RequestError> {
        match value {
            Value::String(s) if s.len() > self.config.max_string_length => {
                Err(RequestError::BadRequest(format!(
                    "string field of {} bytes exceeds the {}-byte limit",
                    s.len(),
                    self.config.max_string_length
                )))
            }
            Value::Array(items) => items.iter().try_for_each(|v| self.check_string_lengths(v)),
            Value::Object(fields) => fields
                .iter()
                .try_for_each(|(_, v)| self.check_string_lengths(v)),
            _ => Ok(()),
        }
    }
}

/// The path form of an inspect: `type/k1/v1/k2/v2/...`, with a lone trailing
/// segment becoming `params.id`.
fn parse_path_inspect(text: &str) -> Result<(String, Value), RequestError> {
    let mut segments = text.trim_matches('/').split('/');
    let query_type = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RequestError::BadRequest("empty inspect path".to_string()))?;

    let rest: Vec<&str> = segments.collect();
    let mut params = Map::new();
    let mut pairs = rest.chunks_exact(2);
    for pair in &mut pairs {
        params.insert(pair[0].to_string(), Value::String(pair[1].to_string()));
    }
    if let [id] = pairs.remainder() {
        params.insert("id".to_string(), Value::String(id.to_string()));
    }
    Ok((query_type.to_string(), Value::Object(params)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcore_storage::Store;
    use lcore_types::config::EngineConfig;
    use serde_json::json;

    const ADMIN: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn router(config: RouterConfig) -> Router {
        let engine = Engine::new(Store::open_in_memory().unwrap(), &EngineConfig::default());
        Router::new(engine, config)
    }

    fn advance(router: &mut Router, sender: &str, input: u64, body: Value) -> AdvanceOutcome {
        router.handle_advance(sender, input, body.to_string().as_bytes())
    }

    #[test]
    fn path_form_parses_pairs_and_trailing_id() {
        let (t, params) = parse_path_inspect("query_by_bucket/domain/finance/bucket_key/balance")
            .unwrap();
        assert_eq!(t, "query_by_bucket");
        assert_eq!(params["domain"], "finance");
        assert_eq!(params["bucket_key"], "balance");

        let (t, params) = parse_path_inspect("attestation/att-1").unwrap();
        assert_eq!(t, "attestation");
        assert_eq!(params["id"], "att-1");

        assert!(parse_path_inspect("").is_err());
    }

    #[test]
    fn payload_cap_is_exact() {
        let config = RouterConfig {
            max_payload_size: 120,
            ..RouterConfig::default()
        };
        let mut router = router(config);

        // Build a payload of exactly 120 bytes by padding a field.
        let mut body = json!({ "action": "x", "pad": "" });
        let bare = body.to_string().len();
        body["pad"] = Value::String("p".repeat(120 - bare));
        let exact = body.to_string();
        assert_eq!(exact.len(), 120);

        // At the cap: passes the size gate (and fails later on the unknown
        // action, which proves the gate let it through).
        let outcome = router.handle_advance(ADMIN, 1, exact.as_bytes());
        assert_eq!(outcome.reports[0]["code"], "UNKNOWN_ACTION");

        // One byte over: rejected at the gate.
        let over = format!("{exact} ");
        let outcome = router.handle_advance(ADMIN, 2, over.as_bytes());
        assert_eq!(outcome.reports[0]["code"], "BAD_REQUEST");
        assert!(outcome.reports[0]["error"]
            .as_str()
            .unwrap()
            .contains("exceeds"));
    }

    #[test]
    fn oversized_string_fields_reject_recursively() {
        let config = RouterConfig {
            max_string_length: 8,
            ..RouterConfig::default()
        };
        let mut router = router(config);
        let outcome = advance(
            &mut router,
            ADMIN,
            1,
            json!({ "action": "x", "nested": { "deep": ["short", "muchtoolongfield"] } }),
        );
        assert!(!outcome.accept);
        assert_eq!(outcome.reports[0]["code"], "BAD_REQUEST");
    }

    #[test]
    fn allowlist_gates_senders() {
        let config = RouterConfig {
            authorized_senders: vec![ADMIN.to_string()],
            ..RouterConfig::default()
        };
        let mut router = router(config);

        let outcome = advance(&mut router, "0xdead", 1, json!({ "action": "x" }));
        assert_eq!(outcome.reports[0]["code"], "UNAUTHORIZED");

        // Mixed-case spelling of an authorized sender is normalized.
        let outcome = advance(
            &mut router,
            &ADMIN.to_uppercase().replace("0X", "0x"),
            2,
            json!({ "action": "x" }),
        );
        assert_eq!(outcome.reports[0]["code"], "UNKNOWN_ACTION");
    }

    #[test]
    fn malformed_payloads_reject() {
        let mut router = router(RouterConfig::default());
        let outcome = router.handle_advance(ADMIN, 1, b"\xff\xfe");
        assert_eq!(outcome.reports[0]["code"], "BAD_REQUEST");

        let outcome = router.handle_advance(ADMIN, 2, b"not json");
        assert_eq!(outcome.reports[0]["code"], "BAD_REQUEST");

        let outcome = advance(&mut router, ADMIN, 3, json!({ "no_action": true }));
        assert_eq!(outcome.reports[0]["code"], "BAD_REQUEST");

        let outcome = advance(&mut router, ADMIN, 4, json!(["not", "an", "object"]));
        assert_eq!(outcome.reports[0]["code"], "BAD_REQUEST");
    }

    #[test]
    fn advance_and_inspect_round_trip() {
        let mut router = router(RouterConfig::default());
        let outcome = advance(
            &mut router,
            ADMIN,
            1,
            json!({ "action": "add_schema_admin", "wallet": ADMIN }),
        );
        assert!(outcome.accept);
        assert_eq!(outcome.notices.len(), 1);
        assert_eq!(outcome.notices[0]["wallet"], ADMIN);

        let report = router.handle_inspect(br#"{"type":"available_providers","params":{}}"#);
        assert_eq!(report["providers"], json!([]));

        // Inspect failures are reports, not rejects.
        let report = router.handle_inspect(b"attestation/att-404");
        assert_eq!(report["code"], "NOT_FOUND");
        let report = router.handle_inspect(b"no_such_query/x/y");
        assert_eq!(report["code"], "UNKNOWN_QUERY");
    }
}
