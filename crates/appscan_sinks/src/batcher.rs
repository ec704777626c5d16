//! Threshold-triggered accumulation of manifest records.

use crate::BatchSink;
use appscan_protocol::ManifestRecord;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of a single flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending; the sink was not called.
    Empty,
    /// The sink reconciled this many rows.
    Written(u64),
    /// The sink failed and this many records were discarded.
    Dropped(usize),
}

/// Cumulative counters over the buffer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub batches_written: u64,
    pub batches_dropped: u64,
    pub rows_written: u64,
    pub rows_dropped: u64,
    /// Records refused at `add` because they carried no `script_id`.
    pub rows_rejected: u64,
}

#[derive(Default)]
struct BufferState {
    pending: Vec<ManifestRecord>,
    stats: BufferStats,
}

/// Accumulates records and hands them to a sink in batches.
///
/// `add` and `flush` share one lock, so a flush triggered by one caller
/// completes before any other caller can append.
pub struct BatchingBuffer<S> {
    sink: S,
    threshold: usize,
    state: Mutex<BufferState>,
}

impl<S: BatchSink> BatchingBuffer<S> {
    pub fn new(sink: S, threshold: usize) -> Self {
        Self {
            sink,
            threshold: threshold.max(1),
            state: Mutex::new(BufferState::default()),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Append records, flushing if the threshold is reached.
    ///
    /// Returns the flush outcome when this call triggered one.
    pub fn add(&self, records: Vec<ManifestRecord>) -> Option<FlushOutcome> {
        let mut state = self.lock();
        for record in records {
            if record.has_key() {
                state.pending.push(record);
            } else {
                warn!(
                    script_name = %record.script_name,
                    owner = %record.owner_email,
                    "Discarding manifest record without script_id"
                );
                state.stats.rows_rejected += 1;
            }
        }

        if state.pending.len() >= self.threshold {
            debug!(
                pending = state.pending.len(),
                threshold = self.threshold,
                "Flush threshold reached"
            );
            Some(self.flush_locked(&mut state))
        } else {
            None
        }
    }

    /// Write out everything pending. A failed batch is logged and dropped.
    pub fn flush(&self) -> FlushOutcome {
        let mut state = self.lock();
        self.flush_locked(&mut state)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn stats(&self) -> BufferStats {
        self.lock().stats
    }

    fn flush_locked(&self, state: &mut BufferState) -> FlushOutcome {
        if state.pending.is_empty() {
            return FlushOutcome::Empty;
        }
        let batch = std::mem::take(&mut state.pending);
        let start = Instant::now();

        match self.sink.write_batch(&batch) {
            Ok(rows) => {
                state.stats.batches_written += 1;
                state.stats.rows_written += rows;
                info!(
                    target_table = %self.sink.target(),
                    records = batch.len(),
                    rows,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Flushed manifest batch"
                );
                FlushOutcome::Written(rows)
            }
            Err(err) => {
                state.stats.batches_dropped += 1;
                state.stats.rows_dropped += batch.len() as u64;
                error!(
                    target_table = %self.sink.target(),
                    records = batch.len(),
                    "Dropping manifest batch: {}",
                    err
                );
                FlushOutcome::Dropped(batch.len())
            }
        }
    }

    // A poisoned lock still holds a consistent Vec; keep going with it.
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SinkError, SinkResult};
    use appscan_protocol::ScriptAsset;
    use chrono::Utc;
    use proptest::prelude::*;

    #[derive(Default)]
    struct CountingSink {
        batches: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl BatchSink for CountingSink {
        fn write_batch(&self, records: &[ManifestRecord]) -> SinkResult<u64> {
            self.batches.lock().unwrap().push(records.len());
            if self.fail {
                Err(SinkError::message("store offline"))
            } else {
                Ok(records.len() as u64)
            }
        }

        fn target(&self) -> String {
            "memory".to_string()
        }
    }

    fn records(ids: std::ops::Range<usize>) -> Vec<ManifestRecord> {
        ids.map(|i| {
            ManifestRecord::new(
                &ScriptAsset::new(format!("s-{}", i), "Script"),
                "owner@example.com",
                Some("{}".to_string()),
                Utc::now(),
            )
        })
        .collect()
    }

    #[test]
    fn below_threshold_never_flushes() {
        let buffer = BatchingBuffer::new(CountingSink::default(), 5);
        assert_eq!(buffer.add(records(0..4)), None);
        assert_eq!(buffer.pending_len(), 4);
        assert!(buffer.sink().batches.lock().unwrap().is_empty());
    }

    #[test]
    fn crossing_threshold_flushes_everything_once() {
        let buffer = BatchingBuffer::new(CountingSink::default(), 5);
        buffer.add(records(0..3));
        assert_eq!(buffer.add(records(3..7)), Some(FlushOutcome::Written(7)));
        assert_eq!(*buffer.sink().batches.lock().unwrap(), vec![7]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn empty_flush_skips_sink() {
        let buffer = BatchingBuffer::new(CountingSink::default(), 5);
        assert_eq!(buffer.flush(), FlushOutcome::Empty);
        assert!(buffer.sink().batches.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_batch_is_dropped_not_retried() {
        let sink = CountingSink {
            fail: true,
            ..Default::default()
        };
        let buffer = BatchingBuffer::new(sink, 2);
        assert_eq!(buffer.add(records(0..2)), Some(FlushOutcome::Dropped(2)));
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(buffer.flush(), FlushOutcome::Empty);

        let stats = buffer.stats();
        assert_eq!(stats.batches_dropped, 1);
        assert_eq!(stats.rows_dropped, 2);
        assert_eq!(buffer.sink().batches.lock().unwrap().len(), 1);
    }

    #[test]
    fn records_without_key_are_rejected() {
        let buffer = BatchingBuffer::new(CountingSink::default(), 10);
        let mut batch = records(0..2);
        batch[1].script_id = "  ".to_string();
        buffer.add(batch);
        assert_eq!(buffer.pending_len(), 1);
        assert_eq!(buffer.stats().rows_rejected, 1);
    }

    proptest! {
        #[test]
        fn every_added_record_is_flushed_once(
            sizes in prop::collection::vec(0usize..12, 0..20),
            threshold in 1usize..10,
        ) {
            let buffer = BatchingBuffer::new(CountingSink::default(), threshold);
            let mut next = 0;
            for size in &sizes {
                buffer.add(records(next..next + size));
                next += size;
            }
            buffer.flush();

            let batches = buffer.sink().batches.lock().unwrap().clone();
            prop_assert_eq!(batches.iter().sum::<usize>(), next);
            if let Some((_, full)) = batches.split_last() {
                prop_assert!(full.iter().all(|b| *b >= threshold));
            }
            prop_assert_eq!(buffer.pending_len(), 0);
        }
    }
}
