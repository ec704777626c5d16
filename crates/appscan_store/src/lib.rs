//! Persistent table store for the manifest audit.
//!
//! The sink talks to storage only through [`TableStore`]: read a table's
//! schema, bulk-load rows into a (staging) table, run an atomic merge
//! statement, and drop a table. [`DuckDbStore`] is the on-disk backend.
//!
//! # Usage
//!
//! ```rust,ignore
//! use appscan_store::{DuckDbStore, TableRef, TableStore};
//!
//! let store = DuckDbStore::open("manifest_audit.duckdb")?;
//! let target = TableRef::new("audit", "manifest_audit_log");
//! store.ensure_manifest_table(&target)?;
//! let schema = store.get_schema(&target)?;
//! ```

mod backend;
mod error;
mod table;
mod value;

pub use backend::DuckDbStore;
pub use error::{BackendError, Result};
pub use table::{quote_ident, ColumnDef, TableRef, TableSchema, TableStore};
pub use value::{DbRow, DbValue, FromDbValue};
