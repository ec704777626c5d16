//! Store fixtures.

use appscan_store::{DuckDbStore, TableRef};
use std::sync::Arc;

/// In-memory DuckDB with an empty manifest table at `audit.<table>`.
pub fn memory_target(table: &str) -> anyhow::Result<(Arc<DuckDbStore>, TableRef)> {
    let store = DuckDbStore::open_in_memory()?;
    let target = TableRef::new("audit", table);
    store.ensure_manifest_table(&target)?;
    Ok((Arc::new(store), target))
}
