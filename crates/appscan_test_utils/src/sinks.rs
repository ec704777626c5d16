//! Sink double that records batches instead of writing them.

use appscan_protocol::ManifestRecord;
use appscan_sinks::{BatchSink, SinkError, SinkResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<ManifestRecord>>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (the batch is still recorded).
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<ManifestRecord>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<ManifestRecord> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn call_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

impl BatchSink for RecordingSink {
    fn write_batch(&self, records: &[ManifestRecord]) -> SinkResult<u64> {
        self.batches.lock().unwrap().push(records.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::message("recording sink set to fail"));
        }
        Ok(records.len() as u64)
    }

    fn target(&self) -> String {
        "recording".to_string()
    }
}
