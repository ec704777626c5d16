//! `appscan run`: one full audit against Google Workspace.

use super::store::open_target;
use super::ConfigArgs;
use anyhow::{Context, Result};
use appscan::{AuditPipeline, PipelineSettings, RunReport};
use appscan_google::{DelegationSettings, GoogleEndpoints, GoogleImpersonator};
use appscan_sinks::MergeUpsertSink;
use std::sync::Arc;
use tracing::info;

/// Validate configuration, wire the production adapters, and run.
///
/// Setup failures are returned as errors; everything after that is folded
/// into the report's status.
pub fn run_audit(args: ConfigArgs, access_token: Option<String>) -> Result<RunReport> {
    let config = args.resolve().context("Invalid configuration")?;
    info!(
        project = %config.project_id,
        table = %config.target(),
        store = %config.store_path.display(),
        "Configuration loaded"
    );

    let (store, target) = open_target(&config)?;
    let sink = Arc::new(MergeUpsertSink::new(Arc::new(store), target));

    let impersonator = GoogleImpersonator::new(DelegationSettings {
        service_account_email: config.service_account_email.clone(),
        quota_project: config.project_id.clone(),
        http_timeout: config.http_timeout(),
        access_token_override: access_token.filter(|t| !t.trim().is_empty()),
        endpoints: GoogleEndpoints::default(),
    })
    .context("Failed to build HTTP client")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let pipeline = AuditPipeline::new(
        PipelineSettings::from(&config),
        Arc::new(impersonator),
        sink,
    );
    Ok(runtime.block_on(pipeline.run_isolated()))
}
