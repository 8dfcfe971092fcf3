use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "keel",
    about = "Deploys compiled contract artifacts, verifies their source, and publishes the registry",
    version
)]
/// Public struct `Cli` used across keel components.
pub struct Cli {
    #[arg(
        long = "rpc-url",
        env = "KEEL_RPC_URL",
        help = "JSON-RPC endpoint of the node or signer sidecar that holds the sender account"
    )]
    pub rpc_url: String,

    #[arg(
        long = "chain-id",
        env = "KEEL_CHAIN_ID",
        help = "Expected chain identity; the run aborts if the endpoint serves a different chain"
    )]
    pub chain_id: u64,

    #[arg(
        long,
        env = "KEEL_SENDER",
        help = "Sender account (key reference) the endpoint signs deployments with"
    )]
    pub sender: String,

    #[arg(
        long = "build-dir",
        env = "KEEL_BUILD_DIR",
        default_value = "artifacts",
        help = "Directory of compiled artifact JSON files (one per contract)"
    )]
    pub build_dir: PathBuf,

    #[arg(
        long,
        env = "KEEL_DEPLOY_PLAN",
        default_value = "deploy-plan.json",
        help = "Deploy plan naming each artifact and its constructor arguments"
    )]
    pub plan: PathBuf,

    #[arg(
        long = "registry-out",
        env = "KEEL_REGISTRY_OUT",
        default_value = ".keel/registry.json",
        help = "Registry document consumed by the client application"
    )]
    pub registry_out: PathBuf,

    #[arg(
        long = "report-log",
        env = "KEEL_REPORT_LOG",
        default_value = ".keel/run-reports.jsonl",
        help = "Append-only JSONL log of run reports"
    )]
    pub report_log: PathBuf,

    #[arg(
        long,
        env = "KEEL_VERIFY",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Submit deployed artifacts to the verification service"
    )]
    pub verify: bool,

    #[arg(
        long = "verification-api-url",
        env = "KEEL_VERIFICATION_API_URL",
        help = "Verification service endpoint (explorer-style contract API)"
    )]
    pub verification_api_url: Option<String>,

    #[arg(
        long = "verification-api-key",
        env = "KEEL_VERIFICATION_API_KEY",
        help = "API key for the verification service"
    )]
    pub verification_api_key: Option<String>,

    #[arg(
        long = "indexing-delay-ms",
        env = "KEEL_INDEXING_DELAY_MS",
        default_value_t = 40_000,
        help = "Minimum delay between confirmation and verification, covering explorer indexing lag"
    )]
    pub indexing_delay_ms: u64,

    #[arg(
        long = "deploy-retry-max-attempts",
        env = "KEEL_DEPLOY_RETRY_MAX_ATTEMPTS",
        default_value = "3",
        value_parser = parse_positive_usize,
        help = "Submission attempts per artifact before its record fails"
    )]
    pub deploy_retry_max_attempts: usize,

    #[arg(
        long = "deploy-retry-base-delay-ms",
        env = "KEEL_DEPLOY_RETRY_BASE_DELAY_MS",
        default_value_t = 1_000,
        help = "Base backoff delay between deployment retries (doubles per attempt)"
    )]
    pub deploy_retry_base_delay_ms: u64,

    #[arg(
        long = "verify-retry-max-attempts",
        env = "KEEL_VERIFY_RETRY_MAX_ATTEMPTS",
        default_value = "6",
        value_parser = parse_positive_usize,
        help = "Verification attempts (submissions and polls) before the failure is recorded"
    )]
    pub verify_retry_max_attempts: usize,

    #[arg(
        long = "verify-retry-base-delay-ms",
        env = "KEEL_VERIFY_RETRY_BASE_DELAY_MS",
        default_value_t = 2_000,
        help = "Base backoff delay between verification retries"
    )]
    pub verify_retry_base_delay_ms: u64,

    #[arg(
        long = "confirmation-timeout-ms",
        env = "KEEL_CONFIRMATION_TIMEOUT_MS",
        default_value = "120000",
        value_parser = parse_positive_u64,
        help = "How long to wait for transaction inclusion before a retryable timeout"
    )]
    pub confirmation_timeout_ms: u64,

    #[arg(
        long = "confirmation-poll-interval-ms",
        env = "KEEL_CONFIRMATION_POLL_INTERVAL_MS",
        default_value = "2000",
        value_parser = parse_positive_u64,
        help = "Receipt polling interval while waiting for confirmation"
    )]
    pub confirmation_poll_interval_ms: u64,

    #[arg(
        long = "request-timeout-ms",
        env = "KEEL_REQUEST_TIMEOUT_MS",
        default_value = "30000",
        value_parser = parse_positive_u64,
        help = "Per-request HTTP timeout for rpc and verification calls"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "dry-run",
        env = "KEEL_DRY_RUN",
        default_value_t = false,
        action = ArgAction::SetTrue,
        help = "Resolve artifacts and print the deployment order without submitting anything"
    )]
    pub dry_run: bool,

    #[arg(
        long,
        env = "KEEL_ONLY",
        value_delimiter = ',',
        help = "Restrict the run to these artifacts (dependencies are pulled in automatically)"
    )]
    pub only: Vec<String>,
}
