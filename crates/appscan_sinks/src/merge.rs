//! Merge-upsert of a batch into the manifest table.
//!
//! Each write walks the same path: pick a fresh staging name, load the batch
//! into it with the target's schema, reconcile by `script_id` in one atomic
//! statement batch, and drop the staging table. The drop is owned by a guard
//! so it also runs when loading or reconciling fails.

use crate::{BatchSink, SinkError, SinkResult};
use appscan_protocol::{ManifestRecord, MANIFEST_COLUMNS};
use appscan_store::{quote_ident, BackendError, DbValue, TableRef, TableSchema, TableStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const KEY_COLUMN: &str = "script_id";

/// Staging table name for one flush.
///
/// Timestamp and pid separate concurrent processes; the sequence number and
/// random suffix separate flushes within one process and second.
pub fn staging_table_name(table: &str, seq: u64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_staging_{}_{}_{}_{}",
        table,
        Utc::now().timestamp(),
        std::process::id(),
        seq,
        &suffix[..8]
    )
}

/// Reconcile statements: update matched keys, then insert the rest.
pub fn merge_sql(target: &TableRef, staging: &TableRef) -> String {
    let key = quote_ident(KEY_COLUMN);
    let target_name = quote_ident(&target.table);
    let assignments = MANIFEST_COLUMNS
        .iter()
        .filter(|c| **c != KEY_COLUMN)
        .map(|c| format!("{col} = s.{col}", col = quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let columns = MANIFEST_COLUMNS
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>();
    let column_list = columns.join(", ");
    let select_list = columns
        .iter()
        .map(|c| format!("s.{}", c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE {target} SET {assignments} FROM {staging} AS s WHERE {target_name}.{key} = s.{key};\n\
         INSERT INTO {target} ({column_list}) SELECT {select_list} FROM {staging} AS s \
         WHERE NOT EXISTS (SELECT 1 FROM {target} AS existing WHERE existing.{key} = s.{key});",
        target = target.quoted(),
        staging = staging.quoted(),
    )
}

/// Drops the staging table when it goes out of scope.
struct StagingGuard<'a> {
    store: &'a dyn TableStore,
    table: TableRef,
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        match self.store.drop_if_exists(&self.table) {
            Ok(()) => debug!(staging = %self.table, "Dropped staging table"),
            Err(err) => warn!(staging = %self.table, "Failed to drop staging table: {}", err),
        }
    }
}

/// Sink that upserts batches into the target table keyed by `script_id`.
pub struct MergeUpsertSink {
    store: Arc<dyn TableStore>,
    target: TableRef,
    seq: AtomicU64,
}

impl MergeUpsertSink {
    pub fn new(store: Arc<dyn TableStore>, target: TableRef) -> Self {
        Self {
            store,
            target,
            seq: AtomicU64::new(0),
        }
    }

    pub fn target_table(&self) -> &TableRef {
        &self.target
    }

    /// Stage and reconcile one batch. Returns the number of distinct keys merged.
    pub fn merge(&self, records: &[ManifestRecord]) -> SinkResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let rows = last_write_wins(records);

        let staging_name =
            staging_table_name(&self.target.table, self.seq.fetch_add(1, Ordering::Relaxed));
        let staging = self.target.sibling(staging_name);
        let _guard = StagingGuard {
            store: self.store.as_ref(),
            table: staging.clone(),
        };

        let schema = self
            .store
            .get_schema(&self.target)
            .map_err(|e| self.store_error(rows.len(), e))?;
        if let Some(column) = MANIFEST_COLUMNS.iter().find(|c| !schema.contains(c)) {
            return Err(SinkError::SchemaMismatch {
                table: self.target.to_string(),
                column: column.to_string(),
            });
        }

        let values: Vec<Vec<DbValue>> = rows.iter().map(|r| record_values(r, &schema)).collect();
        self.store
            .bulk_load(&staging, &schema, &values, true)
            .map_err(|e| self.store_error(rows.len(), e))?;
        debug!(staging = %staging, rows = values.len(), "Loaded staging table");

        self.store
            .execute_merge(&merge_sql(&self.target, &staging))
            .map_err(|e| self.store_error(rows.len(), e))?;

        info!(table = %self.target, rows = rows.len(), "Merged manifests");
        Ok(rows.len() as u64)
    }

    fn store_error(&self, rows: usize, source: BackendError) -> SinkError {
        SinkError::Store {
            table: self.target.to_string(),
            rows,
            source,
        }
    }
}

impl BatchSink for MergeUpsertSink {
    fn write_batch(&self, records: &[ManifestRecord]) -> SinkResult<u64> {
        self.merge(records)
    }

    fn target(&self) -> String {
        self.target.to_string()
    }
}

/// Collapse duplicate keys to their last occurrence, keeping first-seen order.
fn last_write_wins(records: &[ManifestRecord]) -> Vec<&ManifestRecord> {
    let mut slots: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<&ManifestRecord> = Vec::with_capacity(records.len());
    for record in records {
        match slots.get(record.script_id.as_str()) {
            Some(&slot) => out[slot] = record,
            None => {
                slots.insert(record.script_id.as_str(), out.len());
                out.push(record);
            }
        }
    }
    out
}

fn record_values(record: &ManifestRecord, schema: &TableSchema) -> Vec<DbValue> {
    schema
        .columns
        .iter()
        .map(|column| match column.name.as_str() {
            "script_id" => DbValue::from(record.script_id.as_str()),
            "script_name" => DbValue::from(record.script_name.as_str()),
            "owner_email" => DbValue::from(record.owner_email.as_str()),
            "manifest_content" => DbValue::from(record.manifest_content.clone()),
            "extraction_date" => DbValue::from(record.extraction_date),
            _ => DbValue::Null,
        })
        .collect()
}
