//! Batch sinks for extracted manifest records.
//!
//! Records produced by the scan tasks accumulate in a [`BatchingBuffer`];
//! once the flush threshold is reached the whole batch is handed to a
//! [`BatchSink`]. The production sink is [`MergeUpsertSink`], which stages
//! the batch and reconciles it into the target table by `script_id`.

use appscan_protocol::ManifestRecord;
use thiserror::Error;

mod batcher;
mod merge;

pub use batcher::{BatchingBuffer, BufferStats, FlushOutcome};
pub use merge::{merge_sql, staging_table_name, MergeUpsertSink};

/// Errors returned by sink writes.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{message}")]
    Message { message: String },
    #[error("Merge of {rows} rows into {table} failed: {source}")]
    Store {
        table: String,
        rows: usize,
        #[source]
        source: appscan_store::BackendError,
    },
    #[error("Target table {table} is missing required column '{column}'")]
    SchemaMismatch { table: String, column: String },
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl SinkError {
    pub fn message(message: impl Into<String>) -> Self {
        SinkError::Message {
            message: message.into(),
        }
    }
}

/// Destination for a flushed batch.
pub trait BatchSink: Send + Sync {
    /// Persist the whole batch; returns the number of rows reconciled.
    fn write_batch(&self, records: &[ManifestRecord]) -> SinkResult<u64>;

    /// Human-readable destination, used in flush logs.
    fn target(&self) -> String;
}

impl<S: BatchSink + ?Sized> BatchSink for std::sync::Arc<S> {
    fn write_batch(&self, records: &[ManifestRecord]) -> SinkResult<u64> {
        (**self).write_batch(records)
    }

    fn target(&self) -> String {
        (**self).target()
    }
}
