//! Subcommand implementations for the `appscan` binary.

pub mod run;
pub mod store;

use appscan::{AuditConfig, RawConfig};
use clap::Args;
use std::path::PathBuf;

/// Settings shared by every subcommand; each flag falls back to its env var.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Project billed for API quota
    #[arg(long, env = "PROJECT_ID")]
    pub project_id: Option<String>,

    /// Dataset (DuckDB schema) holding the manifest table
    #[arg(long, env = "DATASET_ID")]
    pub dataset_id: Option<String>,

    /// Manifest table name
    #[arg(long, env = "MANIFEST_TABLE_ID")]
    pub table_id: Option<String>,

    /// Workspace admin used to list the directory
    #[arg(long, env = "ADMIN_USER_EMAIL")]
    pub admin_email: Option<String>,

    /// Service account holding domain-wide delegation
    #[arg(long, env = "SERVICE_ACCOUNT_EMAIL")]
    pub service_account_email: Option<String>,

    /// DuckDB database file
    #[arg(long, env = "APPSCAN_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Users scanned concurrently
    #[arg(long, env = "APPSCAN_MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Records per merge batch
    #[arg(long, env = "APPSCAN_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, env = "APPSCAN_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: Option<u64>,
}

impl ConfigArgs {
    pub fn into_raw(self) -> RawConfig {
        RawConfig {
            project_id: self.project_id,
            dataset_id: self.dataset_id,
            table_id: self.table_id,
            admin_email: self.admin_email,
            service_account_email: self.service_account_email,
            store_path: self.store_path,
            max_workers: self.max_workers,
            batch_size: self.batch_size,
            http_timeout_secs: self.http_timeout_secs,
        }
    }

    pub fn resolve(self) -> Result<AuditConfig, appscan::ConfigError> {
        AuditConfig::from_raw(self.into_raw())
    }
}

/// `appscan check-config`: validate and print the sanitized configuration.
pub fn check_config(args: ConfigArgs, json: bool) -> anyhow::Result<()> {
    let config = args.resolve()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("project:         {}", config.project_id);
        println!("target table:    {}", config.target());
        println!("admin:           {}", config.admin_email);
        println!("service account: {}", config.service_account_email);
        println!("store:           {}", config.store_path.display());
        println!("workers:         {}", config.max_workers);
        println!("batch size:      {}", config.batch_size);
        println!("http timeout:    {}s", config.http_timeout_secs);
    }
    Ok(())
}
