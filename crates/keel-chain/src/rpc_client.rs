use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ethers_core::types::{Bytes, H256};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::types::{
    format_h256, parse_address, parse_h256, ChainClient, ChainError, Confirmation,
    DeploymentTarget,
};

static RPC_REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
/// Public struct `ChainClientConfig` used across keel components.
pub struct ChainClientConfig {
    pub rpc_url: String,
    pub request_timeout_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub confirmation_poll_interval_ms: u64,
}

impl Default for ChainClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            request_timeout_ms: 30_000,
            confirmation_timeout_ms: 120_000,
            confirmation_poll_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone)]
/// JSON-RPC 2.0 client against a node (or signer sidecar) that holds the
/// sender's key. Submission uses `eth_sendTransaction`; confirmation polls
/// `eth_getTransactionReceipt` until inclusion or timeout.
pub struct HttpChainClient {
    client: reqwest::Client,
    config: ChainClientConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptLite {
    status: Option<String>,
    contract_address: Option<String>,
    block_number: Option<String>,
}

impl HttpChainClient {
    pub fn new(config: ChainClientConfig) -> Result<Self, ChainError> {
        if config.rpc_url.trim().is_empty() {
            return Err(ChainError::InvalidResponse(
                "rpc url cannot be empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let request_id = RPC_REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Value = response.json().await?;
        if let Some(error) = envelope.get("error").filter(|value| !value.is_null()) {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error")
                .to_string();
            return Err(ChainError::Rpc { code, message });
        }
        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse("rpc envelope has no result".to_string()))
    }

    /// Confirms the endpoint serves the configured chain before the first
    /// submission. A mismatch is a submission-class failure: the signing key
    /// reference is only meaningful on the configured chain.
    pub async fn preflight_chain_id(&self, target: &DeploymentTarget) -> Result<(), ChainError> {
        let result = self.rpc_call("eth_chainId", json!([])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse("eth_chainId is not a string".to_string()))?;
        let reported = parse_quantity(raw).ok_or_else(|| {
            ChainError::InvalidResponse(format!("eth_chainId is not a hex quantity: {raw}"))
        })?;
        if reported != target.chain_id {
            return Err(ChainError::Submission(format!(
                "chain identity mismatch: endpoint serves chain {reported}, run configured for {}",
                target.chain_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn submit_deployment(
        &self,
        init_code: Bytes,
        target: &DeploymentTarget,
    ) -> Result<H256, ChainError> {
        let transaction = json!({
            "from": format!("0x{}", hex::encode(target.sender.as_bytes())),
            "data": format!("0x{}", hex::encode(init_code.as_ref())),
            "chainId": format!("0x{:x}", target.chain_id),
        });
        let result = self
            .rpc_call("eth_sendTransaction", json!([transaction]))
            .await?;
        let raw = result.as_str().ok_or_else(|| {
            ChainError::InvalidResponse("eth_sendTransaction result is not a string".to_string())
        })?;
        parse_h256(raw)
            .ok_or_else(|| ChainError::InvalidResponse(format!("malformed tx hash: {raw}")))
    }

    async fn await_confirmation(&self, tx_hash: H256) -> Result<Confirmation, ChainError> {
        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.confirmation_timeout_ms.max(1));
        let poll_interval =
            Duration::from_millis(self.config.confirmation_poll_interval_ms.max(1));
        let hash_hex = format_h256(tx_hash);

        loop {
            let result = self
                .rpc_call("eth_getTransactionReceipt", json!([hash_hex]))
                .await?;
            if !result.is_null() {
                let receipt: ReceiptLite = serde_json::from_value(result).map_err(|error| {
                    ChainError::InvalidResponse(format!("malformed receipt: {error}"))
                })?;
                if receipt.status.as_deref() == Some("0x0") {
                    return Err(ChainError::Reverted {
                        tx_hash: hash_hex,
                    });
                }
                let address_raw = receipt.contract_address.ok_or_else(|| {
                    ChainError::InvalidResponse(
                        "receipt is missing contractAddress for a deployment".to_string(),
                    )
                })?;
                let address = parse_address(&address_raw).ok_or_else(|| {
                    ChainError::InvalidResponse(format!("malformed contract address: {address_raw}"))
                })?;
                let block_number = receipt
                    .block_number
                    .as_deref()
                    .and_then(parse_quantity);
                return Ok(Confirmation {
                    address,
                    block_number,
                });
            }

            if started.elapsed() >= deadline {
                return Err(ChainError::ConfirmationTimeout { tx_hash: hash_hex });
            }
            sleep(poll_interval).await;
        }
    }
}

fn parse_quantity(raw: &str) -> Option<u64> {
    let stripped = raw.trim().strip_prefix("0x")?;
    u64::from_str_radix(stripped, 16).ok()
}
