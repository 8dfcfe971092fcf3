use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone)]
/// Network and signing configuration for one pipeline run. Loaded once at
/// startup, never mutated. The `sender` account is a key reference only; the
/// node or signer sidecar behind `rpc_url` holds the actual key material.
pub struct DeploymentTarget {
    pub rpc_url: String,
    pub chain_id: u64,
    pub sender: Address,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `DeploymentStatus` values.
pub enum DeploymentStatus {
    Pending,
    Confirmed,
    Verified,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Confirmed => "confirmed",
            DeploymentStatus::Verified => "verified",
            DeploymentStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Per-artifact deployment outcome. Records are created when a deployment is
/// attempted and kept for the lifetime of the run report; failed records are
/// never deleted.
pub struct DeploymentRecord {
    pub artifact_name: String,
    pub status: DeploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub constructor_args_used: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: usize,
    /// Set when the ledger reported inclusion. Verification failures may move
    /// `status` to `Failed` later, but confirmation evidence is never revoked:
    /// dependents resolve addresses against this field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_unix_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
}

impl DeploymentRecord {
    pub fn pending(artifact_name: impl Into<String>, constructor_args_used: Vec<Value>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            status: DeploymentStatus::Pending,
            address: None,
            tx_hash: None,
            constructor_args_used,
            error: None,
            attempts: 0,
            confirmed_unix_ms: None,
            content_digest: None,
        }
    }

    pub fn failed(
        artifact_name: impl Into<String>,
        constructor_args_used: Vec<Value>,
        error: impl Into<String>,
    ) -> Self {
        let mut record = Self::pending(artifact_name, constructor_args_used);
        record.status = DeploymentStatus::Failed;
        record.error = Some(error.into());
        record
    }

    /// True when the underlying deployment reached ledger confirmation,
    /// regardless of what verification did to `status` afterwards.
    pub fn deployment_confirmed(&self) -> bool {
        self.confirmed_unix_ms.is_some() && self.address.is_some()
    }

    /// Registry membership rule: only records whose final status is
    /// `Confirmed` or `Verified` publish an entry.
    pub fn registry_eligible(&self) -> bool {
        matches!(
            self.status,
            DeploymentStatus::Confirmed | DeploymentStatus::Verified
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Ledger inclusion report for a submitted deployment transaction.
pub struct Confirmation {
    pub address: Address,
    pub block_number: Option<u64>,
}

#[derive(Debug, Error)]
/// Enumerates supported `ChainError` values.
pub enum ChainError {
    #[error("deployment submission rejected: {0}")]
    Submission(String),
    #[error("timed out waiting for confirmation of {tx_hash}")]
    ConfirmationTimeout { tx_hash: String },
    #[error("transaction {tx_hash} reverted during deployment")]
    Reverted { tx_hash: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc endpoint returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    /// Transient transport conditions are retried with backoff; everything
    /// else (credentials, funds, malformed transactions, reverts) is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainError::ConfirmationTimeout { .. } => true,
            ChainError::Http(error) => {
                error.is_timeout() || error.is_connect() || error.is_request()
            }
            ChainError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
/// Trait contract for `ChainClient` behavior. One irreversible ledger
/// transaction per successful `submit_deployment` call; idempotency is the
/// orchestrator's responsibility.
pub trait ChainClient: Send + Sync {
    async fn submit_deployment(
        &self,
        init_code: Bytes,
        target: &DeploymentTarget,
    ) -> Result<H256, ChainError>;

    async fn await_confirmation(&self, tx_hash: H256) -> Result<Confirmation, ChainError>;
}

/// Canonical lowercase `0x`-prefixed rendering used in records and registry.
pub fn format_address(address: Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

pub fn format_h256(hash: H256) -> String {
    format!("0x{}", hex::encode(hash.as_bytes()))
}

pub fn parse_address(raw: &str) -> Option<Address> {
    let stripped = raw.trim().strip_prefix("0x").unwrap_or_else(|| raw.trim());
    let bytes = hex::decode(stripped).ok()?;
    if bytes.len() != 20 {
        return None;
    }
    Some(Address::from_slice(&bytes))
}

pub fn parse_h256(raw: &str) -> Option<H256> {
    let stripped = raw.trim().strip_prefix("0x").unwrap_or_else(|| raw.trim());
    let bytes = hex::decode(stripped).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    Some(H256::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::{parse_address, parse_h256, ChainError, DeploymentRecord, DeploymentStatus};

    #[test]
    fn address_parsing_round_trips_canonical_form() {
        let raw = "0x6fc51d05be9df5d4f14ed785b993ee305eb32466";
        let parsed = parse_address(raw).expect("address");
        assert_eq!(super::format_address(parsed), raw);
    }

    #[test]
    fn address_parsing_rejects_wrong_lengths() {
        assert!(parse_address("0x1234").is_none());
        assert!(parse_h256("0xabcd").is_none());
    }

    #[test]
    fn retryable_classification_covers_timeout_and_server_statuses() {
        assert!(ChainError::ConfirmationTimeout {
            tx_hash: "0x0".to_string()
        }
        .is_retryable());
        assert!(ChainError::HttpStatus {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ChainError::Submission("insufficient funds".to_string()).is_retryable());
        assert!(!ChainError::Reverted {
            tx_hash: "0x0".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn confirmation_evidence_survives_failed_status() {
        let mut record = DeploymentRecord::pending("Token", Vec::new());
        record.address = Some("0x6fc51d05be9df5d4f14ed785b993ee305eb32466".to_string());
        record.confirmed_unix_ms = Some(1);
        record.status = DeploymentStatus::Failed;
        assert!(record.deployment_confirmed());
        assert!(!record.registry_eligible());
    }
}
