use std::sync::Arc;
use std::time::Duration;

use crate::retry::verification_retry_delay_ms;
use crate::types::{
    VerificationClient, VerificationPollStatus, VerificationRequest, VerificationSubmission,
    VerifyError,
};

#[derive(Debug, Clone, Copy)]
/// Bounded retry policy for transient verification service failures.
pub struct VerifierConfig {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub jitter: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay_ms: 2_000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `VerifyOutcome` values.
pub enum VerifyOutcome {
    Verified,
    /// `rejected` distinguishes a malformed submission (caller bug; the
    /// deployment itself stays confirmed) from an exhausted retry budget.
    Failed { error: String, rejected: bool },
}

enum Step {
    Done,
    Submitted(String),
    StillPending,
}

/// Drives one address through the verification service with bounded,
/// jittered retries. Idempotent per address: an already-verified address
/// short-circuits without a new submission.
pub struct Verifier {
    client: Arc<dyn VerificationClient>,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(client: Arc<dyn VerificationClient>, config: VerifierConfig) -> Self {
        Self { client, config }
    }

    pub async fn verify(&self, request: &VerificationRequest) -> VerifyOutcome {
        match self.client.is_verified(&request.address).await {
            Ok(true) => {
                tracing::info!(address = %request.address, "address already verified");
                return VerifyOutcome::Verified;
            }
            Ok(false) => {}
            // The probe is an optimization; a failed probe falls through to a
            // normal submission attempt.
            Err(error) => {
                tracing::debug!(address = %request.address, "verification probe failed: {error}")
            }
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut submission_id: Option<String> = None;
        let mut attempt = 1usize;
        let mut last_error = String::new();

        loop {
            let step = match submission_id.as_deref() {
                None => self.try_submit(request).await,
                Some(id) => self.try_poll(id).await,
            };

            let retry_after_ms = match step {
                Ok(Step::Done) => return VerifyOutcome::Verified,
                Ok(Step::Submitted(id)) => {
                    // Moving from submission to polling does not consume the
                    // retry budget.
                    submission_id = Some(id);
                    continue;
                }
                Ok(Step::StillPending) => {
                    last_error = "verification still pending".to_string();
                    None
                }
                Err(error) if !error.is_retryable() => {
                    let rejected = matches!(error, VerifyError::Rejected { .. });
                    return VerifyOutcome::Failed {
                        error: error.to_string(),
                        rejected,
                    };
                }
                Err(error) => {
                    let floor = error.retry_after_ms();
                    last_error = error.to_string();
                    floor
                }
            };

            if attempt >= max_attempts {
                return VerifyOutcome::Failed {
                    error: format!(
                        "verification retry budget exhausted after {max_attempts} attempt(s): {last_error}"
                    ),
                    rejected: false,
                };
            }

            let delay_ms = verification_retry_delay_ms(
                self.config.base_delay_ms,
                attempt,
                self.config.jitter,
                retry_after_ms,
            );
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            attempt = attempt.saturating_add(1);
        }
    }

    async fn try_submit(&self, request: &VerificationRequest) -> Result<Step, VerifyError> {
        match self.client.submit(request).await? {
            VerificationSubmission::AlreadyVerified => Ok(Step::Done),
            VerificationSubmission::Submitted { submission_id } => {
                Ok(Step::Submitted(submission_id))
            }
        }
    }

    async fn try_poll(&self, submission_id: &str) -> Result<Step, VerifyError> {
        match self.client.poll(submission_id).await? {
            VerificationPollStatus::Verified => Ok(Step::Done),
            VerificationPollStatus::Pending => Ok(Step::StillPending),
            VerificationPollStatus::Rejected { reason } => Err(VerifyError::Rejected { reason }),
        }
    }
}
