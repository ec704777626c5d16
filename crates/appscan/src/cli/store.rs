//! Store setup shared by `run` and `init-store`.

use super::ConfigArgs;
use anyhow::{Context, Result};
use appscan::AuditConfig;
use appscan_store::{DuckDbStore, TableRef};
use tracing::info;

/// Open the configured DuckDB file and make sure the manifest table exists.
pub fn open_target(config: &AuditConfig) -> Result<(DuckDbStore, TableRef)> {
    let store = DuckDbStore::open(&config.store_path)
        .with_context(|| format!("Failed to open store at {}", config.store_path.display()))?;
    let target = config.target();
    store
        .ensure_manifest_table(&target)
        .with_context(|| format!("Failed to prepare table {}", target))?;
    Ok((store, target))
}

/// `appscan init-store`
pub fn init_store(args: ConfigArgs) -> Result<()> {
    let config = args.resolve().context("Invalid configuration")?;
    let (store, target) = open_target(&config)?;
    let rows = store.count_rows(&target)?;
    info!(table = %target, rows, "Store initialized");
    println!("{} ready in {} ({} rows)", target, config.store_path.display(), rows);
    Ok(())
}
