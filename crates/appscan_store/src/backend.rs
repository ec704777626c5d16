//! DuckDB-backed table store.
//!
//! - One connection, serialised behind a mutex (DuckDB connections are `Send`
//!   but not `Sync`)
//! - Datasets map onto DuckDB schemas
//! - Merge batches run inside a single transaction

use crate::error::{BackendError, Result};
use crate::table::{ColumnDef, TableRef, TableSchema, TableStore};
use crate::value::{DbRow, DbValue};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, debug_span, info};

/// Column layout of the manifest audit table: (name, type, nullable), key first.
const MANIFEST_TABLE_COLUMNS: [(&str, &str, bool); 5] = [
    ("script_id", "VARCHAR", false),
    ("script_name", "VARCHAR", true),
    ("owner_email", "VARCHAR", true),
    ("manifest_content", "VARCHAR", true),
    ("extraction_date", "TIMESTAMP", true),
];

/// Persistent store over a DuckDB database file (or memory, for tests).
pub struct DuckDbStore {
    conn: Mutex<duckdb::Connection>,
    label: String,
}

impl std::fmt::Debug for DuckDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbStore")
            .field("database", &self.label)
            .finish()
    }
}

impl DuckDbStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = duckdb::Connection::open(path)?;
        info!(path = %path.display(), "Opened DuckDB store");
        Ok(Self {
            conn: Mutex::new(conn),
            label: path.display().to_string(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = duckdb::Connection::open_in_memory()?;
        debug!("Opened in-memory DuckDB store");
        Ok(Self {
            conn: Mutex::new(conn),
            label: ":memory:".to_string(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, duckdb::Connection>> {
        self.conn
            .lock()
            .map_err(|_| BackendError::Database("connection lock poisoned".to_string()))
    }

    /// Create the dataset and the manifest table if they do not exist yet.
    pub fn ensure_manifest_table(&self, target: &TableRef) -> Result<()> {
        let columns = MANIFEST_TABLE_COLUMNS
            .iter()
            .map(|(name, sql_type, nullable)| {
                ColumnDef::new(*name, *sql_type, *nullable).definition()
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {}; CREATE TABLE IF NOT EXISTS {} ({});",
            crate::table::quote_ident(&target.dataset),
            target.quoted(),
            columns
        );
        self.execute_batch(&sql)?;
        info!(table = %target, "Manifest table ready");
        Ok(())
    }

    /// Execute a batch of SQL statements outside any explicit transaction.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.lock()?;
        execute_batch_on_conn(&conn, sql)
    }

    /// Query and return all rows.
    pub fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>> {
        let conn = self.lock()?;
        query_on_conn(&conn, sql, params)
    }

    /// Query and return a single scalar value.
    pub fn query_scalar<T: crate::value::FromDbValue>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<T> {
        let rows = self.query_all(sql, params)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Query("Expected one row, got none".to_string()))?
            .get(0)
    }

    pub fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let count: i64 = self.query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
            &[
                DbValue::from(table.dataset.as_str()),
                DbValue::from(table.table.as_str()),
            ],
        )?;
        Ok(count > 0)
    }

    /// Names of all tables in a dataset, sorted.
    pub fn list_tables(&self, dataset: &str) -> Result<Vec<String>> {
        let rows = self.query_all(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = ? ORDER BY table_name",
            &[DbValue::from(dataset)],
        )?;
        rows.iter().map(|row| row.get::<String>(0)).collect()
    }

    pub fn count_rows(&self, table: &TableRef) -> Result<i64> {
        self.query_scalar(&format!("SELECT COUNT(*) FROM {}", table.quoted()), &[])
    }
}

impl TableStore for DuckDbStore {
    fn get_schema(&self, table: &TableRef) -> Result<TableSchema> {
        let rows = self.query_all(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
            &[
                DbValue::from(table.dataset.as_str()),
                DbValue::from(table.table.as_str()),
            ],
        )?;
        if rows.is_empty() {
            return Err(BackendError::TableNotFound(table.to_string()));
        }

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.get(0)?;
                let sql_type: String = row.get(1)?;
                let nullable: String = row.get(2)?;
                Ok(ColumnDef::new(name, sql_type, nullable.eq_ignore_ascii_case("YES")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TableSchema::new(columns))
    }

    fn bulk_load(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        rows: &[Vec<DbValue>],
        truncate: bool,
    ) -> Result<u64> {
        if schema.is_empty() {
            return Err(BackendError::InvalidInput(
                "bulk_load requires at least one column".to_string(),
            ));
        }
        for (index, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(BackendError::InvalidInput(format!(
                    "Row {} has {} values, expected {}",
                    index,
                    row.len(),
                    schema.len()
                )));
            }
        }

        let definitions = schema
            .columns
            .iter()
            .map(ColumnDef::definition)
            .collect::<Vec<_>>()
            .join(", ");
        let create_sql = if truncate {
            format!("CREATE OR REPLACE TABLE {} ({})", table.quoted(), definitions)
        } else {
            format!("CREATE TABLE IF NOT EXISTS {} ({})", table.quoted(), definitions)
        };
        let column_list = schema
            .columns
            .iter()
            .map(|c| crate::table::quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; schema.len()].join(", ");
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted(),
            column_list,
            placeholders
        );

        let span = debug_span!(
            "store.bulk_load",
            table = %table,
            rows = rows.len(),
            duration_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute_batch(&create_sql)?;
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for row in rows {
                let duckdb_params = to_duckdb_params(row);
                let param_refs: Vec<&dyn duckdb::ToSql> = duckdb_params
                    .iter()
                    .map(|v| v as &dyn duckdb::ToSql)
                    .collect();
                stmt.execute(param_refs.as_slice())?;
            }
        }
        tx.commit()?;

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(rows.len() as u64)
    }

    fn execute_merge(&self, sql: &str) -> Result<()> {
        let span = debug_span!(
            "store.merge",
            sql_hash = %hash_sql(sql),
            duration_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();

        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.commit()?;

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(())
    }

    fn drop_if_exists(&self, table: &TableRef) -> Result<()> {
        self.execute_batch(&format!("DROP TABLE IF EXISTS {}", table.quoted()))
    }
}

fn execute_batch_on_conn(conn: &duckdb::Connection, sql: &str) -> Result<()> {
    let span = debug_span!(
        "store.exec_batch",
        sql_hash = %hash_sql(sql),
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();
    conn.execute_batch(sql)?;
    span.record("duration_ms", start.elapsed().as_millis() as u64);
    Ok(())
}

fn query_on_conn(conn: &duckdb::Connection, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>> {
    let mut stmt = conn.prepare(sql)?;
    let duckdb_params = to_duckdb_params(params);
    let param_refs: Vec<&dyn duckdb::ToSql> = duckdb_params
        .iter()
        .map(|v| v as &dyn duckdb::ToSql)
        .collect();

    let mut rows_iter = stmt.query(param_refs.as_slice())?;

    let (column_count, columns) = if let Some(stmt_ref) = rows_iter.as_ref() {
        let count = stmt_ref.column_count();
        let cols: Vec<String> = (0..count)
            .map(|i| {
                stmt_ref
                    .column_name(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| format!("col{}", i))
            })
            .collect();
        (count, cols)
    } else {
        return Ok(Vec::new());
    };

    let mut result = Vec::new();
    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(duckdb_value_to_db_value(row, i)?);
        }
        result.push(DbRow::new(columns.clone(), values));
    }
    Ok(result)
}

fn to_duckdb_params(params: &[DbValue]) -> Vec<duckdb::types::Value> {
    params
        .iter()
        .map(|p| match p {
            DbValue::Null => duckdb::types::Value::Null,
            DbValue::Integer(v) => duckdb::types::Value::BigInt(*v),
            DbValue::Text(v) => duckdb::types::Value::Text(v.clone()),
            DbValue::Boolean(v) => duckdb::types::Value::Boolean(*v),
            DbValue::Timestamp(v) => duckdb::types::Value::Timestamp(
                duckdb::types::TimeUnit::Microsecond,
                v.timestamp_micros(),
            ),
        })
        .collect()
}

fn duckdb_value_to_db_value(row: &duckdb::Row, index: usize) -> Result<DbValue> {
    use duckdb::types::ValueRef;

    let value = match row.get_ref(index)? {
        ValueRef::Null => DbValue::Null,
        ValueRef::Boolean(v) => DbValue::Boolean(v),
        ValueRef::TinyInt(v) => DbValue::Integer(v as i64),
        ValueRef::SmallInt(v) => DbValue::Integer(v as i64),
        ValueRef::Int(v) => DbValue::Integer(v as i64),
        ValueRef::BigInt(v) => DbValue::Integer(v),
        ValueRef::HugeInt(v) => DbValue::Integer(v as i64),
        ValueRef::UTinyInt(v) => DbValue::Integer(v as i64),
        ValueRef::USmallInt(v) => DbValue::Integer(v as i64),
        ValueRef::UInt(v) => DbValue::Integer(v as i64),
        ValueRef::UBigInt(v) => DbValue::Integer(v as i64),
        ValueRef::Text(v) => DbValue::Text(String::from_utf8_lossy(v).to_string()),
        ValueRef::Timestamp(unit, v) => {
            let micros = match unit {
                duckdb::types::TimeUnit::Second => v * 1_000_000,
                duckdb::types::TimeUnit::Millisecond => v * 1_000,
                duckdb::types::TimeUnit::Microsecond => v,
                duckdb::types::TimeUnit::Nanosecond => v / 1_000,
            };
            let secs = micros.div_euclid(1_000_000);
            let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
            match chrono::DateTime::from_timestamp(secs, nanos) {
                Some(dt) => DbValue::Timestamp(dt),
                None => DbValue::Integer(micros),
            }
        }
        other => {
            tracing::warn!(
                "DuckDB type {:?} at column {} mapped to debug string",
                std::mem::discriminant(&other),
                index
            );
            DbValue::Text(format!("{:?}", other))
        }
    };
    Ok(value)
}

fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit, stable across runs for log correlation.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn store_with_target() -> (DuckDbStore, TableRef) {
        let store = DuckDbStore::open_in_memory().unwrap();
        let target = TableRef::new("audit", "manifests");
        store.ensure_manifest_table(&target).unwrap();
        (store, target)
    }

    #[test]
    fn ensure_manifest_table_is_idempotent() {
        let (store, target) = store_with_target();
        store.ensure_manifest_table(&target).unwrap();
        assert!(store.table_exists(&target).unwrap());
        assert_eq!(store.count_rows(&target).unwrap(), 0);
    }

    #[test]
    fn get_schema_reports_columns_in_order() {
        let (store, target) = store_with_target();
        let schema = store.get_schema(&target).unwrap();
        assert_eq!(
            schema.column_names(),
            vec![
                "script_id",
                "script_name",
                "owner_email",
                "manifest_content",
                "extraction_date"
            ]
        );
        assert!(!schema.columns[0].nullable);
        assert!(schema.columns[3].nullable);
    }

    #[test]
    fn get_schema_of_missing_table_is_not_found() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let err = store
            .get_schema(&TableRef::new("main", "nope"))
            .unwrap_err();
        assert!(matches!(err, BackendError::TableNotFound(_)));
    }

    #[test]
    fn bulk_load_truncates_existing_staging_content() {
        let (store, target) = store_with_target();
        let schema = store.get_schema(&target).unwrap();
        let staging = target.sibling("manifests_stage");
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let row = |id: &str| {
            vec![
                DbValue::from(id),
                DbValue::from("name"),
                DbValue::from("owner@example.com"),
                DbValue::Null,
                DbValue::from(when),
            ]
        };

        assert_eq!(store.bulk_load(&staging, &schema, &[row("a"), row("b")], true).unwrap(), 2);
        assert_eq!(store.bulk_load(&staging, &schema, &[row("c")], true).unwrap(), 1);
        assert_eq!(store.count_rows(&staging).unwrap(), 1);

        let loaded: chrono::DateTime<Utc> = store
            .query_scalar(
                &format!("SELECT extraction_date FROM {}", staging.quoted()),
                &[],
            )
            .unwrap();
        assert_eq!(loaded, when);
    }

    #[test]
    fn bulk_load_rejects_mismatched_row_len() {
        let (store, target) = store_with_target();
        let schema = store.get_schema(&target).unwrap();
        let err = store
            .bulk_load(&target.sibling("s"), &schema, &[vec![DbValue::from("a")]], true)
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidInput(_)));
    }

    #[test]
    fn failed_merge_rolls_back_every_statement() {
        let (store, target) = store_with_target();
        let sql = format!(
            "INSERT INTO {t} (script_id) VALUES ('a'); INSERT INTO {t} (no_such_column) VALUES (1);",
            t = target.quoted()
        );
        assert!(store.execute_merge(&sql).is_err());
        assert_eq!(store.count_rows(&target).unwrap(), 0);
    }

    #[test]
    fn drop_if_exists_tolerates_missing_tables() {
        let (store, target) = store_with_target();
        store.drop_if_exists(&target.sibling("ghost")).unwrap();
        store.drop_if_exists(&target).unwrap();
        assert!(!store.table_exists(&target).unwrap());
        assert!(store.list_tables("audit").unwrap().is_empty());
    }

    #[test]
    fn open_creates_database_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("audit.duckdb");
        let store = DuckDbStore::open(&path).unwrap();
        store.ensure_manifest_table(&TableRef::new("audit", "t")).unwrap();
        assert!(path.exists());
    }
}
