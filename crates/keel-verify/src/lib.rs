//! Source-verification layer for keel pipelines.
//!
//! Wraps the external verification service behind the [`VerificationClient`]
//! seam (submit / poll / idempotency probe), provides the etherscan-style
//! HTTP implementation, the bounded retry policy for transient service
//! failures, and the [`IndexingGate`] delay that tolerates explorer indexing
//! lag between confirmation and verification.

pub mod http_client;
pub mod indexing_gate;
pub mod retry;
pub mod types;
pub mod verifier;

pub use http_client::{HttpVerificationClient, VerificationApiConfig};
pub use indexing_gate::IndexingGate;
pub use types::{
    VerificationClient, VerificationPollStatus, VerificationRequest, VerificationSubmission,
    VerifyError,
};
pub use verifier::{Verifier, VerifierConfig, VerifyOutcome};
