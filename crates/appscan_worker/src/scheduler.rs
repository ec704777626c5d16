//! Bounded-concurrency fan-out over a key list.
//!
//! - At most `pool_size` tasks run at once; a new one starts as each finishes
//! - Outputs are delivered in completion order, not submission order
//! - A panicking task is logged with its key and counted; the rest continue

use std::fmt::Display;
use std::future::Future;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error};

/// Counts for one scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Runs one async task per key with a fixed concurrency window.
#[derive(Debug, Clone, Copy)]
pub struct BoundedScheduler {
    pool_size: usize,
}

/// Aborts the wrapped task if the scheduler is dropped mid-run.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl BoundedScheduler {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size: pool_size.max(1),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Start `task(key)` for every key and hand each `(key, output)` to
    /// `on_complete` as it finishes.
    pub async fn run<K, T, I, F, Fut, C>(
        &self,
        keys: I,
        task: F,
        mut on_complete: C,
    ) -> SchedulerReport
    where
        I: IntoIterator<Item = K>,
        K: Display + Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(K) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        C: FnMut(K, T),
    {
        let mut keys = keys.into_iter();
        let mut in_flight: JoinSet<(K, Result<T, JoinError>)> = JoinSet::new();
        let mut report = SchedulerReport::default();

        loop {
            while in_flight.len() < self.pool_size {
                let Some(key) = keys.next() else { break };
                // Inner task isolates panics so the key survives for reporting.
                let mut handle = AbortOnDrop(tokio::spawn(task(key.clone())));
                in_flight.spawn(async move {
                    let result = (&mut handle.0).await;
                    (key, result)
                });
                report.submitted += 1;
            }

            match in_flight.join_next().await {
                Some(Ok((key, Ok(output)))) => {
                    report.completed += 1;
                    debug!(key = %key, in_flight = in_flight.len(), "Task completed");
                    on_complete(key, output);
                }
                Some(Ok((key, Err(err)))) => {
                    report.failed += 1;
                    error!(key = %key, "Task failed: {}", describe_join_error(err));
                }
                Some(Err(err)) => {
                    report.failed += 1;
                    error!("Task wrapper failed: {}", describe_join_error(err));
                }
                None => break,
            }
        }

        report
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(message) = payload.downcast_ref::<&str>() {
                format!("panicked: {}", message)
            } else if let Some(message) = payload.downcast_ref::<String>() {
                format!("panicked: {}", message)
            } else {
                "panicked".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_pool_size() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let scheduler = BoundedScheduler::new(3);

        let mut done = Vec::new();
        let report = scheduler
            .run(
                0..20u64,
                |key| {
                    let current = current.clone();
                    let peak = peak.clone();
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2 + key % 5)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        key * 10
                    }
                },
                |key, output| done.push((key, output)),
            )
            .await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(report, SchedulerReport { submitted: 20, completed: 20, failed: 0 });
        assert_eq!(done.len(), 20);
        assert!(done.iter().all(|(k, v)| *v == k * 10));
    }

    #[tokio::test]
    async fn delivers_in_completion_order() {
        let mut order = Vec::new();
        BoundedScheduler::new(2)
            .run(
                vec![40u64, 5],
                |delay| async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay
                },
                |key, _| order.push(key),
            )
            .await;
        assert_eq!(order, vec![5, 40]);
    }

    #[tokio::test]
    async fn panicking_task_does_not_stop_siblings() {
        let mut seen = Vec::new();
        let report = BoundedScheduler::new(2)
            .run(
                vec!["a".to_string(), "boom".to_string(), "c".to_string()],
                |key| async move {
                    if key == "boom" {
                        panic!("task exploded");
                    }
                    key.len()
                },
                |key, _| seen.push(key),
            )
            .await;

        seen.sort();
        assert_eq!(seen, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(report, SchedulerReport { submitted: 3, completed: 2, failed: 1 });
    }

    #[tokio::test]
    async fn zero_pool_size_still_runs() {
        let scheduler = BoundedScheduler::new(0);
        assert_eq!(scheduler.pool_size(), 1);
        let report = scheduler.run(vec![1u8, 2], |k| async move { k }, |_, _| {}).await;
        assert_eq!(report.completed, 2);
    }

    #[tokio::test]
    async fn panic_payload_is_described() {
        let err = tokio::spawn(async { panic!("bad input") }).await.unwrap_err();
        assert_eq!(describe_join_error(err), "panicked: bad input");

        let owned = tokio::spawn(async { panic!("{} failed", "user@example.com") })
            .await
            .unwrap_err();
        assert_eq!(describe_join_error(owned), "panicked: user@example.com failed");
    }
}
