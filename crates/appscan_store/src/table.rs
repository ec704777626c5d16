//! Table addressing, schemas, and the store contract used by the sink.

use crate::error::Result;
use crate::value::DbValue;
use std::fmt;

/// Quote a single SQL identifier.
pub fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

/// A table inside a dataset (a DuckDB schema).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Another table in the same dataset.
    pub fn sibling(&self, table: impl Into<String>) -> Self {
        Self::new(self.dataset.clone(), table)
    }

    /// `"dataset"."table"`, safe to splice into SQL.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.dataset), quote_ident(&self.table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable,
        }
    }

    /// Column definition as used in `CREATE TABLE`.
    pub fn definition(&self) -> String {
        let nullable = if self.nullable { "" } else { " NOT NULL" };
        format!("{} {}{}", quote_ident(&self.name), self.sql_type, nullable)
    }
}

/// Ordered column list of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Storage operations the merge-upsert sink depends on.
///
/// Implementations must make `execute_merge` all-or-nothing: either every
/// statement in the SQL batch takes effect or none does.
pub trait TableStore: Send + Sync {
    /// Column layout of an existing table.
    fn get_schema(&self, table: &TableRef) -> Result<TableSchema>;

    /// Create `table` with `schema` and insert `rows` (values in schema order).
    ///
    /// With `truncate`, any existing content under that name is replaced.
    fn bulk_load(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        rows: &[Vec<DbValue>],
        truncate: bool,
    ) -> Result<u64>;

    /// Run a reconcile statement batch atomically.
    fn execute_merge(&self, sql: &str) -> Result<()>;

    fn drop_if_exists(&self, table: &TableRef) -> Result<()>;
}
