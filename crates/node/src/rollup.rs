//! HTTP client for the rollup host.
//!
//! The guest drives the host: `POST /finish` reports the previous verdict
//! and blocks for the next request (202 while idle); notices, reports, and
//! vouchers attach to the advance request being processed. Payload bodies
//! are hex-framed UTF-8 JSON in both directions.

use anyhow::{anyhow, Context, Result};
use lcore_types::InputIndex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Metadata the host attaches to every advance request.
#[derive(Debug, Clone, Deserialize)]
pub struct AdvanceMetadata {
    pub msg_sender: String,
    #[serde(default)]
    pub epoch_index: u64,
    pub input_index: InputIndex,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub timestamp: u64,
}

/// One request pulled from `/finish`.
#[derive(Debug)]
pub enum RollupRequest {
    Advance {
        metadata: AdvanceMetadata,
        payload: Vec<u8>,
    },
    Inspect {
        payload: Vec<u8>,
    },
}

#[derive(Debug, Deserialize)]
struct FinishResponse {
    request_type: String,
    data: RequestData,
}

#[derive(Debug, Deserialize)]
struct RequestData {
    #[serde(default)]
    metadata: Option<AdvanceMetadata>,
    payload: String,
}

/// Encodes a JSON value for the host channel: `0x` + hex of the UTF-8 text.
pub fn hex_frame(value: &Value) -> String {
    format!("0x{}", hex::encode(value.to_string()))
}

/// Decodes a `0x`-prefixed hex payload into raw bytes.
pub fn unframe_hex(payload: &str) -> Result<Vec<u8>> {
    let stripped = payload
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("payload missing 0x prefix: {payload:.16}"))?;
    hex::decode(stripped).context("payload is not hex")
}

pub struct RollupClient {
    base_url: String,
    http: reqwest::Client,
}

impl RollupClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            // /finish long-polls while the host is idle.
            .timeout(Duration::from_secs(60))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Reports the previous verdict and fetches the next request. `None`
    /// while the host has nothing for us (HTTP 202).
    pub async fn finish(&self, accept: bool) -> Result<Option<RollupRequest>> {
        let status = if accept { "accept" } else { "reject" };
        let response = self
            .http
            .post(format!("{}/finish", self.base_url))
            .json(&json!({ "status": status }))
            .send()
            .await
            .context("POST /finish")?;

        if response.status() == reqwest::StatusCode::ACCEPTED {
            return Ok(None);
        }
        let response = response.error_for_status().context("/finish status")?;
        let finish: FinishResponse = response.json().await.context("decoding /finish body")?;
        let payload = unframe_hex(&finish.data.payload)?;

        match finish.request_type.as_str() {
            "advance_state" => {
                let metadata = finish
                    .data
                    .metadata
                    .ok_or_else(|| anyhow!("advance request without metadata"))?;
                Ok(Some(RollupRequest::Advance { metadata, payload }))
            }
            "inspect_state" => Ok(Some(RollupRequest::Inspect { payload })),
            other => Err(anyhow!("unknown request type {other:?}")),
        }
    }

    pub async fn notice(&self, body: &Value) -> Result<()> {
        self.emit("notice", &json!({ "payload": hex_frame(body) })).await
    }

    pub async fn report(&self, body: &Value) -> Result<()> {
        self.emit("report", &json!({ "payload": hex_frame(body) })).await
    }

    /// Records a voucher intent for an L1 contract call.
    pub async fn voucher(&self, destination: &str, payload_hex: &str) -> Result<()> {
        self.emit(
            "voucher",
            &json!({ "destination": destination, "payload": payload_hex }),
        )
        .await
    }

    async fn emit(&self, endpoint: &str, body: &Value) -> Result<()> {
        self.http
            .post(format!("{}/{endpoint}", self.base_url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST /{endpoint}"))?
            .error_for_status()
            .with_context(|| format!("/{endpoint} status"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_framing_round_trips() {
        let body = json!({ "verified": true });
        let framed = hex_frame(&body);
        assert!(framed.starts_with("0x"));
        let bytes = unframe_hex(&framed).unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), body);
    }

    #[test]
    fn unframe_rejects_bad_input() {
        assert!(unframe_hex("deadbeef").is_err());
        assert!(unframe_hex("0xzz").is_err());
    }

    #[test]
    fn finish_body_shapes_decode() {
        let advance: FinishResponse = serde_json::from_value(json!({
            "request_type": "advance_state",
            "data": {
                "metadata": {
                    "msg_sender": "0xAB",
                    "epoch_index": 0,
                    "input_index": 7,
                    "block_number": 100,
                    "timestamp": 1_700_000_000u64,
                },
                "payload": "0x7b7d",
            },
        }))
        .unwrap();
        assert_eq!(advance.request_type, "advance_state");
        assert_eq!(advance.data.metadata.unwrap().input_index, 7);

        let inspect: FinishResponse = serde_json::from_value(json!({
            "request_type": "inspect_state",
            "data": { "payload": "0x7b7d" },
        }))
        .unwrap();
        assert!(inspect.data.metadata.is_none());
    }
}
