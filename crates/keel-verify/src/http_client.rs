use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::retry::{parse_retry_after_ms, should_retry_status};
use crate::types::{
    VerificationClient, VerificationPollStatus, VerificationRequest, VerificationSubmission,
    VerifyError,
};

#[derive(Debug, Clone)]
/// Public struct `VerificationApiConfig` used across keel components.
pub struct VerificationApiConfig {
    pub api_url: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
/// Explorer-style verification API client (`verifysourcecode` /
/// `checkverifystatus` form endpoints with an api key).
pub struct HttpVerificationClient {
    client: reqwest::Client,
    config: VerificationApiConfig,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    status: String,
    #[serde(default)]
    result: Value,
}

impl ApiEnvelope {
    fn result_text(&self) -> String {
        match &self.result {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

impl HttpVerificationClient {
    pub fn new(config: VerificationApiConfig) -> Result<Self, VerifyError> {
        if config.api_url.trim().is_empty() {
            return Err(VerifyError::InvalidResponse(
                "verification api url cannot be empty".to_string(),
            ));
        }
        if config.api_key.trim().is_empty() {
            return Err(VerifyError::InvalidResponse(
                "verification api key cannot be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    async fn read_envelope(&self, response: reqwest::Response) -> Result<ApiEnvelope, VerifyError> {
        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after_ms(response.headers());
            let body = response.text().await.unwrap_or_default();
            if should_retry_status(status.as_u16()) {
                return Err(VerifyError::Transient {
                    reason: format!("service returned status {status}: {body}"),
                    retry_after_ms,
                });
            }
            return Err(VerifyError::InvalidResponse(format!(
                "service returned status {status}: {body}"
            )));
        }
        response
            .json::<ApiEnvelope>()
            .await
            .map_err(|error| VerifyError::InvalidResponse(format!("malformed envelope: {error}")))
    }
}

#[async_trait]
impl VerificationClient for HttpVerificationClient {
    async fn is_verified(&self, address: &str) -> Result<bool, VerifyError> {
        let response = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await?;
        let envelope = self.read_envelope(response).await?;
        if envelope.status == "1" {
            return Ok(true);
        }
        let result = envelope.result_text().to_ascii_lowercase();
        if result.contains("rate limit") {
            return Err(VerifyError::Transient {
                reason: envelope.result_text(),
                retry_after_ms: None,
            });
        }
        Ok(false)
    }

    async fn submit(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationSubmission, VerifyError> {
        let form = [
            ("apikey", self.config.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", request.address.as_str()),
            ("contractname", request.source_reference.as_str()),
            // The explorer API spells this field with the historical typo.
            ("constructorArguements", request.constructor_args_hex.as_str()),
        ];
        let response = self
            .client
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?;
        let envelope = self.read_envelope(response).await?;
        let result = envelope.result_text();
        if envelope.status == "1" {
            return Ok(VerificationSubmission::Submitted {
                submission_id: result,
            });
        }

        let lowered = result.to_ascii_lowercase();
        if lowered.contains("already verified") {
            return Ok(VerificationSubmission::AlreadyVerified);
        }
        if lowered.contains("rate limit") || lowered.contains("try again") {
            return Err(VerifyError::Transient {
                reason: result,
                retry_after_ms: None,
            });
        }
        Err(VerifyError::Rejected { reason: result })
    }

    async fn poll(&self, submission_id: &str) -> Result<VerificationPollStatus, VerifyError> {
        let response = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", submission_id),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await?;
        let envelope = self.read_envelope(response).await?;
        let result = envelope.result_text();
        if envelope.status == "1" {
            return Ok(VerificationPollStatus::Verified);
        }

        let lowered = result.to_ascii_lowercase();
        if lowered.contains("pending") {
            return Ok(VerificationPollStatus::Pending);
        }
        if lowered.contains("rate limit") || lowered.contains("try again") {
            return Err(VerifyError::Transient {
                reason: result,
                retry_after_ms: None,
            });
        }
        Ok(VerificationPollStatus::Rejected { reason: result })
    }
}
