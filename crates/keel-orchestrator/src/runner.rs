use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use keel_artifacts::{ArtifactSpec, ArtifactStore};
use keel_chain::{
    encode_constructor_args_hex, encode_deployment, ChainClient, DeployRetryPolicy, Deployer,
    DeploymentRecord, DeploymentStatus, DeploymentTarget,
};
use keel_core::current_unix_timestamp_ms;
use keel_registry::{publish_registry, RegistryDocument, RegistryEntry};
use keel_verify::{
    IndexingGate, VerificationClient, VerificationRequest, Verifier, VerifierConfig, VerifyOutcome,
};

use crate::graph::{dependency_order, transitive_dependents};
use crate::plan::{substitute_placeholders, DeployPlan};

#[derive(Debug, Clone, Default)]
/// Operator-initiated abort signal. A cancelled run submits no further
/// deployments; transactions already on the ledger are never rolled back.
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn request_cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
/// Public struct `PipelineConfig` used across keel components.
pub struct PipelineConfig {
    pub target: DeploymentTarget,
    pub build_dir: PathBuf,
    pub registry_path: PathBuf,
    pub report_log_path: Option<PathBuf>,
    pub verify_enabled: bool,
    pub indexing_delay_ms: u64,
    pub deploy_retry: DeployRetryPolicy,
    pub verifier: VerifierConfig,
    pub dry_run: bool,
    pub only: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
/// Counters accumulated over one orchestration run.
pub struct RunSummary {
    pub planned_artifacts: usize,
    pub selected_artifacts: usize,
    pub confirmed_deployments: usize,
    pub verified_artifacts: usize,
    pub failed_artifacts: usize,
    pub cascade_failures: usize,
    pub deploy_attempts: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
/// Structured end-of-run report: one record per attempted artifact plus the
/// run counters. Appended to the report log and rendered by the CLI.
pub struct RunReport {
    pub started_unix_ms: u64,
    pub chain_id: u64,
    pub deployment_order: Vec<String>,
    pub records: Vec<DeploymentRecord>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn record(&self, artifact_name: &str) -> Option<&DeploymentRecord> {
        self.records
            .iter()
            .find(|record| record.artifact_name == artifact_name)
    }

    /// Exit-code rule: success only when no artifact finished `Failed` and
    /// the run was not cancelled.
    pub fn overall_success(&self) -> bool {
        self.summary.failed_artifacts == 0 && !self.summary.cancelled
    }
}

/// Sequences resolve → deploy → gate → verify per artifact in dependency
/// order, then publishes the registry from every confirmed or verified
/// record. Single flight: one signing key means strictly ordered
/// submissions, never concurrent `deploy` calls.
pub struct Pipeline {
    chain: Arc<dyn ChainClient>,
    verification: Option<Arc<dyn VerificationClient>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        verification: Option<Arc<dyn VerificationClient>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            chain,
            verification,
            config,
        }
    }

    pub async fn run(&self, plan: &DeployPlan, cancel: &CancelFlag) -> Result<RunReport> {
        let started_unix_ms = current_unix_timestamp_ms();
        let mut summary = RunSummary {
            planned_artifacts: plan.artifacts.len(),
            ..RunSummary::default()
        };

        let selected = if self.config.only.is_empty() {
            plan.clone()
        } else {
            plan.restrict_to(&self.config.only)?
        };
        summary.selected_artifacts = selected.artifacts.len();

        // Pre-flight: ordering failures abort before any submission.
        let order = dependency_order(&selected)?;
        tracing::info!(
            chain_id = self.config.target.chain_id,
            artifacts = order.len(),
            dry_run = self.config.dry_run,
            "starting deployment run"
        );

        if self.config.dry_run {
            return Ok(RunReport {
                started_unix_ms,
                chain_id: self.config.target.chain_id,
                deployment_order: order,
                records: Vec::new(),
                summary,
            });
        }

        let store = ArtifactStore::open(&self.config.build_dir);
        let deployer = Deployer::new(self.chain.clone(), self.config.deploy_retry);
        let verifier = if self.config.verify_enabled {
            self.verification
                .as_ref()
                .map(|client| Verifier::new(client.clone(), self.config.verifier))
        } else {
            None
        };
        let gate = IndexingGate::new(if verifier.is_some() {
            self.config.indexing_delay_ms
        } else {
            0
        });

        let mut records: BTreeMap<String, DeploymentRecord> = BTreeMap::new();
        let mut specs: BTreeMap<String, ArtifactSpec> = BTreeMap::new();

        for name in &order {
            if records.contains_key(name) {
                // Already failed through a dependency cascade.
                continue;
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                records.insert(
                    name.clone(),
                    DeploymentRecord::failed(
                        name.clone(),
                        plan_args(&selected, name),
                        "run cancelled before submission",
                    ),
                );
                continue;
            }

            let spec = match store.resolve(name) {
                Ok(spec) => spec,
                Err(error) => {
                    tracing::warn!(artifact = %name, "artifact resolution failed: {error}");
                    records.insert(
                        name.clone(),
                        DeploymentRecord::failed(
                            name.clone(),
                            plan_args(&selected, name),
                            error.to_string(),
                        ),
                    );
                    cascade_failure(&selected, name, &mut records, &mut summary);
                    continue;
                }
            };

            let raw_args = plan_args(&selected, name);
            let substitution = {
                let resolve = |dependency: &str| {
                    records
                        .get(dependency)
                        .filter(|record| record.deployment_confirmed())
                        .and_then(|record| record.address.clone())
                };
                substitute_placeholders(&raw_args, &resolve)
            };
            let resolved_args = match substitution {
                Ok(args) => args,
                Err(dependency) => {
                    records.insert(
                        name.clone(),
                        DeploymentRecord::failed(
                            name.clone(),
                            raw_args,
                            format!("unresolved dependency: '{dependency}' is not confirmed"),
                        ),
                    );
                    cascade_failure(&selected, name, &mut records, &mut summary);
                    continue;
                }
            };

            let init_code = match encode_deployment(&spec.abi, &spec.bytecode, &resolved_args) {
                Ok(init_code) => init_code,
                Err(error) => {
                    records.insert(
                        name.clone(),
                        DeploymentRecord::failed(name.clone(), resolved_args, error.to_string()),
                    );
                    cascade_failure(&selected, name, &mut records, &mut summary);
                    continue;
                }
            };

            let mut record = deployer
                .deploy(name, init_code, resolved_args.clone(), &self.config.target)
                .await;
            record.content_digest = Some(spec.content_digest.clone());
            summary.deploy_attempts = summary.deploy_attempts.saturating_add(record.attempts);

            if record.status != DeploymentStatus::Confirmed {
                tracing::warn!(
                    artifact = %name,
                    error = record.error.as_deref().unwrap_or("unknown"),
                    "deployment failed"
                );
                records.insert(name.clone(), record);
                cascade_failure(&selected, name, &mut records, &mut summary);
                continue;
            }
            tracing::info!(
                artifact = %name,
                address = record.address.as_deref().unwrap_or_default(),
                attempts = record.attempts,
                "deployment confirmed"
            );

            if let Some(verifier) = &verifier {
                gate.await_indexing().await;
                self.verify_record(verifier, &spec, &resolved_args, &mut record)
                    .await;
            }

            specs.insert(name.clone(), spec);
            records.insert(name.clone(), record);
        }

        let mut document = RegistryDocument::new(self.config.target.chain_id);
        for (name, record) in &records {
            if !record.registry_eligible() {
                continue;
            }
            let (Some(address), Some(spec)) = (record.address.clone(), specs.get(name)) else {
                continue;
            };
            document.insert(
                name.clone(),
                RegistryEntry {
                    address,
                    interface_schema: spec.interface_schema.clone(),
                },
            );
        }
        publish_registry(&self.config.registry_path, &document).with_context(|| {
            format!(
                "failed to publish registry {}",
                self.config.registry_path.display()
            )
        })?;
        tracing::info!(
            registry = %self.config.registry_path.display(),
            entries = document.entries.len(),
            "registry published"
        );

        summary.confirmed_deployments = records
            .values()
            .filter(|record| record.deployment_confirmed())
            .count();
        summary.verified_artifacts = records
            .values()
            .filter(|record| record.status == DeploymentStatus::Verified)
            .count();
        summary.failed_artifacts = records
            .values()
            .filter(|record| record.status == DeploymentStatus::Failed)
            .count();

        let report = RunReport {
            started_unix_ms,
            chain_id: self.config.target.chain_id,
            deployment_order: order.clone(),
            records: order
                .iter()
                .filter_map(|name| records.get(name).cloned())
                .collect(),
            summary,
        };

        if let Some(path) = &self.config.report_log_path {
            append_run_report(path, &report)?;
        }
        Ok(report)
    }

    async fn verify_record(
        &self,
        verifier: &Verifier,
        spec: &ArtifactSpec,
        resolved_args: &[serde_json::Value],
        record: &mut DeploymentRecord,
    ) {
        let Some(address) = record.address.clone() else {
            return;
        };
        let constructor_args_hex = match encode_constructor_args_hex(&spec.abi, resolved_args) {
            Ok(hex) => hex,
            Err(error) => {
                // The same tokens already encoded for deployment; a failure
                // here is a bug worth surfacing, but the deployment stays
                // confirmed.
                record.error = Some(format!("verification skipped: {error}"));
                return;
            }
        };
        let request = VerificationRequest {
            address,
            source_reference: spec.source_reference.clone(),
            constructor_args_hex,
        };

        match verifier.verify(&request).await {
            VerifyOutcome::Verified => {
                record.status = DeploymentStatus::Verified;
                tracing::info!(artifact = %record.artifact_name, "source verified");
            }
            VerifyOutcome::Failed { error, rejected } => {
                if rejected {
                    // Malformed submission: the deployment itself remains
                    // confirmed and downstream artifacts may still depend on
                    // the address.
                    record.error = Some(error.clone());
                } else {
                    record.status = DeploymentStatus::Failed;
                    record.error = Some(error.clone());
                }
                tracing::warn!(
                    artifact = %record.artifact_name,
                    rejected,
                    "verification failed: {error}"
                );
            }
        }
    }
}

fn plan_args(plan: &DeployPlan, name: &str) -> Vec<serde_json::Value> {
    plan.get(name)
        .map(|artifact| artifact.constructor_args.clone())
        .unwrap_or_default()
}

fn cascade_failure(
    plan: &DeployPlan,
    root: &str,
    records: &mut BTreeMap<String, DeploymentRecord>,
    summary: &mut RunSummary,
) {
    for dependent in transitive_dependents(plan, root) {
        if records.contains_key(&dependent) {
            continue;
        }
        records.insert(
            dependent.clone(),
            DeploymentRecord::failed(
                dependent.clone(),
                plan_args(plan, &dependent),
                format!("unresolved dependency: '{root}' failed before confirmation"),
            ),
        );
        summary.cascade_failures = summary.cascade_failures.saturating_add(1);
    }
}

fn append_run_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let line = serde_json::to_string(report).context("serialize run report")?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("failed to append {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}
