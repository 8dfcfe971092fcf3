use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::Bytes;
use serde_json::Value;

use keel_core::current_unix_timestamp_ms;

use crate::types::{
    format_address, format_h256, ChainClient, ChainError, Confirmation, DeploymentRecord,
    DeploymentStatus, DeploymentTarget,
};

#[derive(Debug, Clone, Copy)]
/// Bounded retry policy for transient transport failures during deployment.
pub struct DeployRetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
}

impl Default for DeployRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

/// Submits deployment transactions and waits for confirmation. Each
/// successful call creates one irreversible ledger transaction; callers must
/// not deploy the same logical artifact twice without explicit intent.
pub struct Deployer {
    client: Arc<dyn ChainClient>,
    retry: DeployRetryPolicy,
}

impl Deployer {
    pub fn new(client: Arc<dyn ChainClient>, retry: DeployRetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Runs the submit/confirm sequence for one artifact, retrying transient
    /// failures up to the configured attempt budget. The returned record is
    /// final: `Confirmed` with address and tx hash, or `Failed` with the
    /// first terminal error.
    pub async fn deploy(
        &self,
        artifact_name: &str,
        init_code: Bytes,
        args_used: Vec<Value>,
        target: &DeploymentTarget,
    ) -> DeploymentRecord {
        let mut record = DeploymentRecord::pending(artifact_name, args_used);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1usize;

        loop {
            record.attempts = attempt;
            match self.attempt_deploy(&init_code, target, &mut record).await {
                Ok(confirmation) => {
                    apply_confirmation(&mut record, confirmation);
                    return record;
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        artifact = artifact_name,
                        attempt,
                        "transient deployment failure, backing off: {error}"
                    );
                    apply_retry_delay(self.retry.base_delay_ms, attempt).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => {
                    record.status = DeploymentStatus::Failed;
                    record.error = Some(error.to_string());
                    return record;
                }
            }
        }
    }

    async fn attempt_deploy(
        &self,
        init_code: &Bytes,
        target: &DeploymentTarget,
        record: &mut DeploymentRecord,
    ) -> Result<Confirmation, ChainError> {
        let tx_hash = self
            .client
            .submit_deployment(init_code.clone(), target)
            .await?;
        record.tx_hash = Some(format_h256(tx_hash));
        self.client.await_confirmation(tx_hash).await
    }
}

fn apply_confirmation(record: &mut DeploymentRecord, confirmation: Confirmation) {
    record.status = DeploymentStatus::Confirmed;
    record.address = Some(format_address(confirmation.address));
    record.confirmed_unix_ms = Some(current_unix_timestamp_ms());
}

fn retry_delay_ms(base_delay_ms: u64, attempt: usize) -> u64 {
    if base_delay_ms == 0 {
        return 0;
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    base_delay_ms.saturating_mul(1_u64 << exponent)
}

async fn apply_retry_delay(base_delay_ms: u64, attempt: usize) {
    let delay_ms = retry_delay_ms(base_delay_ms, attempt);
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}
