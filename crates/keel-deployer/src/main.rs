mod bootstrap_helpers;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use keel_chain::{
    parse_address, ChainClientConfig, DeployRetryPolicy, DeploymentTarget, HttpChainClient,
};
use keel_cli::{validate_run_configuration, Cli};
use keel_orchestrator::{load_deploy_plan, CancelFlag, Pipeline, PipelineConfig, RunReport};
use keel_verify::{
    HttpVerificationClient, VerificationApiConfig, VerificationClient, VerifierConfig,
};

use crate::bootstrap_helpers::init_tracing;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("keel: {error:#}");
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if let Err(message) = validate_run_configuration(&cli) {
        bail!(message);
    }
    let sender = parse_address(&cli.sender)
        .ok_or_else(|| anyhow!("--sender is not a valid 20-byte hex address: {}", cli.sender))?;
    let target = DeploymentTarget {
        rpc_url: cli.rpc_url.clone(),
        chain_id: cli.chain_id,
        sender,
    };

    let plan = load_deploy_plan(&cli.plan)
        .with_context(|| format!("failed to load deploy plan {}", cli.plan.display()))?;

    let chain_client = HttpChainClient::new(ChainClientConfig {
        rpc_url: cli.rpc_url.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        confirmation_timeout_ms: cli.confirmation_timeout_ms,
        confirmation_poll_interval_ms: cli.confirmation_poll_interval_ms,
    })
    .context("failed to build chain client")?;
    if !cli.dry_run {
        chain_client
            .preflight_chain_id(&target)
            .await
            .context("chain preflight failed")?;
    }

    let verification: Option<Arc<dyn VerificationClient>> = if cli.verify && !cli.dry_run {
        let (Some(api_url), Some(api_key)) = (
            cli.verification_api_url.clone(),
            cli.verification_api_key.clone(),
        ) else {
            bail!("verification is enabled but the api url/key are not configured");
        };
        let client = HttpVerificationClient::new(VerificationApiConfig {
            api_url,
            api_key,
            request_timeout_ms: cli.request_timeout_ms,
        })
        .context("failed to build verification client")?;
        Some(Arc::new(client))
    } else {
        None
    };

    let config = PipelineConfig {
        target,
        build_dir: cli.build_dir.clone(),
        registry_path: cli.registry_out.clone(),
        report_log_path: Some(cli.report_log.clone()),
        verify_enabled: cli.verify,
        indexing_delay_ms: cli.indexing_delay_ms,
        deploy_retry: DeployRetryPolicy {
            max_attempts: cli.deploy_retry_max_attempts,
            base_delay_ms: cli.deploy_retry_base_delay_ms,
        },
        verifier: VerifierConfig {
            max_attempts: cli.verify_retry_max_attempts,
            base_delay_ms: cli.verify_retry_base_delay_ms,
            jitter: true,
        },
        dry_run: cli.dry_run,
        only: cli.only.clone(),
    };

    let cancel = CancelFlag::default();
    let watcher_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("keel: cancellation requested, no further deployments will be submitted");
            watcher_flag.request_cancel();
        }
    });

    let pipeline = Pipeline::new(Arc::new(chain_client), verification, config);
    let report = pipeline.run(&plan, &cancel).await?;
    render_report(&cli, &report);
    Ok(if report.overall_success() { 0 } else { 1 })
}

fn render_report(cli: &Cli, report: &RunReport) {
    if cli.dry_run {
        println!(
            "deployment order ({} artifact(s), nothing submitted):",
            report.deployment_order.len()
        );
        for (index, name) in report.deployment_order.iter().enumerate() {
            println!("  {}. {name}", index + 1);
        }
        return;
    }

    for record in &report.records {
        let mut line = format!(
            "artifact={} status={}",
            record.artifact_name,
            record.status.as_str()
        );
        if let Some(address) = &record.address {
            line.push_str(&format!(" address={address}"));
        }
        if let Some(tx_hash) = &record.tx_hash {
            line.push_str(&format!(" tx={tx_hash}"));
        }
        if record.attempts > 1 {
            line.push_str(&format!(" attempts={}", record.attempts));
        }
        if let Some(error) = &record.error {
            line.push_str(&format!(" error={error:?}"));
        }
        println!("{line}");
    }

    let summary = &report.summary;
    println!(
        "deploy runner summary: planned={} selected={} confirmed={} verified={} failed={} cascade_failures={} deploy_attempts={} cancelled={}",
        summary.planned_artifacts,
        summary.selected_artifacts,
        summary.confirmed_deployments,
        summary.verified_artifacts,
        summary.failed_artifacts,
        summary.cascade_failures,
        summary.deploy_attempts,
        summary.cancelled,
    );
}
