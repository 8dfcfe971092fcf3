//! End-to-end pipeline scenarios: plan and artifacts loaded from disk, the
//! ledger and verification service scripted through mock clients.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256};
use serde_json::json;

use keel_chain::{
    ChainClient, ChainError, Confirmation, DeployRetryPolicy, DeploymentStatus, DeploymentTarget,
};
use keel_orchestrator::{load_deploy_plan, CancelFlag, Pipeline, PipelineConfig};
use keel_registry::load_registry;
use keel_verify::{
    VerificationClient, VerificationPollStatus, VerificationRequest, VerificationSubmission,
    VerifierConfig, VerifyError,
};

struct ScriptedChain {
    submissions: Mutex<Vec<Bytes>>,
    submit_outcomes: Mutex<VecDeque<Result<H256, ChainError>>>,
    confirm_outcomes: Mutex<VecDeque<Result<Confirmation, ChainError>>>,
}

impl ScriptedChain {
    fn new(
        submit_outcomes: Vec<Result<H256, ChainError>>,
        confirm_outcomes: Vec<Result<Confirmation, ChainError>>,
    ) -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            submit_outcomes: Mutex::new(submit_outcomes.into_iter().collect()),
            confirm_outcomes: Mutex::new(confirm_outcomes.into_iter().collect()),
        }
    }

    fn submission_count(&self) -> usize {
        self.submissions.lock().expect("lock").len()
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn submit_deployment(
        &self,
        init_code: Bytes,
        _target: &DeploymentTarget,
    ) -> Result<H256, ChainError> {
        self.submissions.lock().expect("lock").push(init_code);
        self.submit_outcomes
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(H256::zero()))
    }

    async fn await_confirmation(&self, _tx_hash: H256) -> Result<Confirmation, ChainError> {
        self.confirm_outcomes
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Confirmation {
                    address: Address::zero(),
                    block_number: None,
                })
            })
    }
}

struct ScriptedVerification {
    submit_calls: Mutex<usize>,
    poll_outcomes: Mutex<VecDeque<Result<VerificationPollStatus, VerifyError>>>,
    requests: Mutex<Vec<VerificationRequest>>,
}

impl ScriptedVerification {
    fn new(poll_outcomes: Vec<Result<VerificationPollStatus, VerifyError>>) -> Self {
        Self {
            submit_calls: Mutex::new(0),
            poll_outcomes: Mutex::new(poll_outcomes.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn submit_calls(&self) -> usize {
        *self.submit_calls.lock().expect("lock")
    }
}

#[async_trait]
impl VerificationClient for ScriptedVerification {
    async fn is_verified(&self, _address: &str) -> Result<bool, VerifyError> {
        Ok(false)
    }

    async fn submit(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationSubmission, VerifyError> {
        *self.submit_calls.lock().expect("lock") += 1;
        self.requests.lock().expect("lock").push(request.clone());
        Ok(VerificationSubmission::Submitted {
            submission_id: format!("guid-{}", self.submit_calls()),
        })
    }

    async fn poll(&self, _submission_id: &str) -> Result<VerificationPollStatus, VerifyError> {
        self.poll_outcomes
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Ok(VerificationPollStatus::Verified))
    }
}

fn write_artifact(build_dir: &Path, name: &str, inputs: serde_json::Value) {
    let body = json!({
        "contractName": name,
        "sourceName": format!("contracts/{name}.sol"),
        "abi": [
            {
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": inputs
            }
        ],
        "bytecode": "0x608060405234801561001057600080fd5b50"
    });
    std::fs::write(
        build_dir.join(format!("{name}.json")),
        serde_json::to_string_pretty(&body).expect("serialize artifact"),
    )
    .expect("write artifact");
}

fn write_workspace(root: &Path) -> PathBuf {
    let build_dir = root.join("artifacts");
    std::fs::create_dir_all(&build_dir).expect("mkdir artifacts");
    write_artifact(
        &build_dir,
        "Token",
        json!([
            { "name": "name_", "type": "string" },
            { "name": "symbol_", "type": "string" }
        ]),
    );
    write_artifact(
        &build_dir,
        "Marketplace",
        json!([{ "name": "token", "type": "address" }]),
    );

    let plan_path = root.join("deploy-plan.json");
    std::fs::write(
        &plan_path,
        serde_json::to_string_pretty(&json!({
            "schema_version": 1,
            "artifacts": [
                {
                    "name": "Token",
                    "constructor_args": ["NFT Market Token", "NFTT"]
                },
                {
                    "name": "Marketplace",
                    "constructor_args": ["${address:Token}"]
                }
            ]
        }))
        .expect("serialize plan"),
    )
    .expect("write plan");
    plan_path
}

fn pipeline_config(root: &Path, verify_enabled: bool) -> PipelineConfig {
    PipelineConfig {
        target: DeploymentTarget {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 80001,
            sender: Address::repeat_byte(0x11),
        },
        build_dir: root.join("artifacts"),
        registry_path: root.join(".keel/registry.json"),
        report_log_path: Some(root.join(".keel/run-reports.jsonl")),
        verify_enabled,
        indexing_delay_ms: 0,
        deploy_retry: DeployRetryPolicy {
            max_attempts: 3,
            base_delay_ms: 0,
        },
        verifier: VerifierConfig {
            max_attempts: 6,
            base_delay_ms: 0,
            jitter: false,
        },
        dry_run: false,
        only: Vec::new(),
    }
}

fn confirmed(address_byte: u8) -> Result<Confirmation, ChainError> {
    Ok(Confirmation {
        address: Address::repeat_byte(address_byte),
        block_number: Some(1),
    })
}

#[tokio::test]
async fn successful_run_verifies_both_artifacts_and_publishes_the_registry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan_path = write_workspace(temp.path());
    let plan = load_deploy_plan(&plan_path).expect("plan");

    let chain = Arc::new(ScriptedChain::new(
        vec![Ok(H256::repeat_byte(0x01)), Ok(H256::repeat_byte(0x02))],
        vec![confirmed(0xAA), confirmed(0xBB)],
    ));
    let verification = Arc::new(ScriptedVerification::new(Vec::new()));
    let config = pipeline_config(temp.path(), true);
    let registry_path = config.registry_path.clone();
    let pipeline = Pipeline::new(chain.clone(), Some(verification.clone()), config);

    let report = pipeline
        .run(&plan, &CancelFlag::default())
        .await
        .expect("run");

    assert!(report.overall_success());
    assert_eq!(report.deployment_order, vec!["Token", "Marketplace"]);
    for name in ["Token", "Marketplace"] {
        assert_eq!(
            report.record(name).expect("record").status,
            DeploymentStatus::Verified,
            "{name} should be verified"
        );
    }

    let token_address = report
        .record("Token")
        .and_then(|record| record.address.clone())
        .expect("token address");
    let marketplace = report.record("Marketplace").expect("marketplace");
    assert_eq!(marketplace.constructor_args_used[0], json!(token_address));

    let registry = load_registry(&registry_path).expect("registry");
    assert_eq!(registry.entries.len(), 2);
    assert_eq!(registry.chain_id, 80001);
    assert_eq!(
        registry.entries.get("Token").expect("token entry").address,
        token_address
    );
    assert!(registry
        .entries
        .get("Marketplace")
        .expect("marketplace entry")
        .interface_schema
        .is_array());

    // One verification submission per artifact, and the marketplace
    // submission carried the encoded token address.
    assert_eq!(verification.submit_calls(), 2);
    let requests = verification.requests.lock().expect("lock");
    let marketplace_request = requests
        .iter()
        .find(|request| request.source_reference.contains("Marketplace"))
        .expect("marketplace request");
    assert!(marketplace_request
        .constructor_args_hex
        .contains(token_address.trim_start_matches("0x")));
}

#[tokio::test]
async fn insufficient_funds_fails_the_run_and_leaves_the_registry_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan_path = write_workspace(temp.path());
    let plan = load_deploy_plan(&plan_path).expect("plan");

    let chain = Arc::new(ScriptedChain::new(
        vec![Err(ChainError::Submission(
            "insufficient funds for gas * price + value".to_string(),
        ))],
        Vec::new(),
    ));
    let config = pipeline_config(temp.path(), false);
    let registry_path = config.registry_path.clone();
    let pipeline = Pipeline::new(chain.clone(), None, config);

    let report = pipeline
        .run(&plan, &CancelFlag::default())
        .await
        .expect("run");

    assert!(!report.overall_success());
    assert_eq!(chain.submission_count(), 1);

    let token = report.record("Token").expect("token");
    assert_eq!(token.status, DeploymentStatus::Failed);
    assert!(token
        .error
        .as_deref()
        .expect("token error")
        .contains("insufficient funds"));

    let marketplace = report.record("Marketplace").expect("marketplace");
    assert_eq!(marketplace.status, DeploymentStatus::Failed);
    assert!(marketplace
        .error
        .as_deref()
        .expect("marketplace error")
        .contains("unresolved dependency"));

    let registry = load_registry(&registry_path).expect("registry");
    assert!(registry.entries.is_empty());
}

#[tokio::test]
async fn verification_pending_polls_resolve_within_the_retry_budget() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan_path = write_workspace(temp.path());
    let plan = load_deploy_plan(&plan_path).expect("plan");

    let chain = Arc::new(ScriptedChain::new(
        vec![Ok(H256::repeat_byte(0x01)), Ok(H256::repeat_byte(0x02))],
        vec![confirmed(0xAA), confirmed(0xBB)],
    ));
    // Token's verification stays pending for three polls before passing;
    // Marketplace passes immediately.
    let verification = Arc::new(ScriptedVerification::new(vec![
        Ok(VerificationPollStatus::Pending),
        Ok(VerificationPollStatus::Pending),
        Ok(VerificationPollStatus::Pending),
        Ok(VerificationPollStatus::Verified),
    ]));
    let config = pipeline_config(temp.path(), true);
    let pipeline = Pipeline::new(chain, Some(verification.clone()), config);

    let report = pipeline
        .run(&plan, &CancelFlag::default())
        .await
        .expect("run");

    assert!(report.overall_success());
    assert_eq!(
        report.record("Token").expect("token").status,
        DeploymentStatus::Verified
    );
    assert_eq!(
        report.record("Marketplace").expect("marketplace").status,
        DeploymentStatus::Verified
    );
    assert_eq!(verification.submit_calls(), 2);
}

#[tokio::test]
async fn run_report_log_records_the_scenario() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan_path = write_workspace(temp.path());
    let plan = load_deploy_plan(&plan_path).expect("plan");

    let chain = Arc::new(ScriptedChain::new(
        vec![Ok(H256::repeat_byte(0x01)), Ok(H256::repeat_byte(0x02))],
        vec![confirmed(0xAA), confirmed(0xBB)],
    ));
    let config = pipeline_config(temp.path(), false);
    let report_log = config.report_log_path.clone().expect("report log");
    let pipeline = Pipeline::new(chain, None, config);

    pipeline
        .run(&plan, &CancelFlag::default())
        .await
        .expect("run");

    let raw = std::fs::read_to_string(&report_log).expect("read report log");
    let line: serde_json::Value =
        serde_json::from_str(raw.lines().next().expect("one line")).expect("parse");
    assert_eq!(line["summary"]["confirmed_deployments"], json!(2));
    assert_eq!(line["records"].as_array().expect("records").len(), 2);
}
