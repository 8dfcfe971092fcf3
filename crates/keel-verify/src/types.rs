use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Inputs the verification service needs to attest that deployed bytecode
/// matches public source, given the constructor arguments actually used.
pub struct VerificationRequest {
    pub address: String,
    /// `sourceName:ContractName` reference from the compiled artifact.
    pub source_reference: String,
    /// ABI-encoded constructor arguments, hex without `0x`.
    pub constructor_args_hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `VerificationSubmission` values.
pub enum VerificationSubmission {
    Submitted { submission_id: String },
    /// The service already holds a verified source for this address; no new
    /// submission was created.
    AlreadyVerified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `VerificationPollStatus` values.
pub enum VerificationPollStatus {
    Verified,
    Pending,
    Rejected { reason: String },
}

#[derive(Debug, Error)]
/// Enumerates supported `VerifyError` values.
pub enum VerifyError {
    /// The service rejected the request as malformed (argument or source
    /// mismatch). A caller bug, never retried.
    #[error("verification service rejected the submission: {reason}")]
    Rejected { reason: String },
    /// Rate limiting or temporary unavailability; retried with backoff.
    #[error("transient verification service error: {reason}")]
    Transient {
        reason: String,
        retry_after_ms: Option<u64>,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid verification response: {0}")]
    InvalidResponse(String),
}

impl VerifyError {
    pub fn is_retryable(&self) -> bool {
        match self {
            VerifyError::Transient { .. } => true,
            VerifyError::Http(error) => {
                error.is_timeout() || error.is_connect() || error.is_request()
            }
            VerifyError::Rejected { .. } | VerifyError::InvalidResponse(_) => false,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            VerifyError::Transient { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

#[async_trait]
/// Trait contract for `VerificationClient` behavior.
pub trait VerificationClient: Send + Sync {
    /// Idempotency probe: true when the address is already verified.
    async fn is_verified(&self, address: &str) -> Result<bool, VerifyError>;

    async fn submit(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationSubmission, VerifyError>;

    async fn poll(&self, submission_id: &str) -> Result<VerificationPollStatus, VerifyError>;
}
