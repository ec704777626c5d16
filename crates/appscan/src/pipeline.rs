//! One audit run: directory listing, concurrent scans, batched merge.

use crate::config::AuditConfig;
use appscan_protocol::{DomainUser, ManifestRecord, RunStatus};
use appscan_sinks::{BatchSink, BatchingBuffer, BufferStats};
use appscan_worker::{
    collect_pages, retry_remote, scan_user, BoundedScheduler, Impersonator, RetryPolicy,
    ScanContext, SchedulerReport,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The knobs of a run that are independent of where results go.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub admin_email: String,
    pub max_workers: usize,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl From<&AuditConfig> for PipelineSettings {
    fn from(config: &AuditConfig) -> Self {
        Self {
            admin_email: config.admin_email.clone(),
            max_workers: config.max_workers,
            batch_size: config.batch_size,
            retry: config.retry_policy(),
        }
    }
}

/// Outcome and counters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: RunStatus,
    pub users_total: usize,
    pub users_active: usize,
    pub scheduler: SchedulerReport,
    pub buffer: BufferStats,
}

impl RunReport {
    fn stopped(status: RunStatus) -> Self {
        Self {
            status,
            users_total: 0,
            users_active: 0,
            scheduler: SchedulerReport::default(),
            buffer: BufferStats::default(),
        }
    }
}

pub struct AuditPipeline {
    settings: PipelineSettings,
    impersonator: Arc<dyn Impersonator>,
    sink: Arc<dyn BatchSink>,
}

impl AuditPipeline {
    pub fn new(
        settings: PipelineSettings,
        impersonator: Arc<dyn Impersonator>,
        sink: Arc<dyn BatchSink>,
    ) -> Self {
        Self {
            settings,
            impersonator,
            sink,
        }
    }

    /// Run on a separate task; a panic anywhere in the run becomes `Failed`.
    pub async fn run_isolated(self) -> RunReport {
        match tokio::spawn(async move { self.run().await }).await {
            Ok(report) => report,
            Err(err) => {
                error!("Audit run aborted: {}", err);
                RunReport::stopped(RunStatus::failed(format!("run task aborted: {}", err)))
            }
        }
    }

    pub async fn run(&self) -> RunReport {
        let start = Instant::now();
        let admin = self.settings.admin_email.as_str();
        info!(admin = %admin, workers = self.settings.max_workers, "Starting manifest audit");

        let directory = match self.impersonator.directory(admin).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(admin = %admin, "Admin delegation failed: {}", err);
                return RunReport::stopped(RunStatus::AdminAuthFailure);
            }
        };

        let retry = &self.settings.retry;
        let directory = &directory;
        let users = match collect_pages(move |token: Option<String>| async move {
            retry_remote(retry, "directory.list_users", || {
                directory.list_users(token.clone())
            })
            .await
        })
        .await
        {
            Ok(users) => users,
            // An unreadable directory is a failed run, not an empty domain.
            Err(err) => {
                error!("Listing directory users failed: {}", err);
                return RunReport::stopped(RunStatus::failed(format!(
                    "listing directory users: {}",
                    err
                )));
            }
        };

        let users_total = users.len();
        let active: Vec<String> = users
            .into_iter()
            .filter(DomainUser::is_active)
            .map(|user| user.primary_email)
            .collect();
        let users_active = active.len();
        info!(total = users_total, active = users_active, "Directory listing complete");

        if active.is_empty() {
            warn!("No active users to scan");
            return RunReport {
                users_total,
                ..RunReport::stopped(RunStatus::NoUsersFound)
            };
        }

        let (records_tx, records_rx) = unbounded_channel();
        let writer = spawn_batch_writer(
            BatchingBuffer::new(Arc::clone(&self.sink), self.settings.batch_size),
            records_rx,
        );
        let ctx = Arc::new(ScanContext::new(
            Arc::clone(&self.impersonator),
            self.settings.retry.clone(),
        ));

        let scheduler = BoundedScheduler::new(self.settings.max_workers);
        let scheduler_report = scheduler
            .run(
                active,
                |email: String| {
                    let ctx = Arc::clone(&ctx);
                    async move { scan_user(&ctx, &email).await }
                },
                |email, records| {
                    if records.is_empty() {
                        return;
                    }
                    debug!(user = %email, records = records.len(), "Buffering manifests");
                    if records_tx.send(records).is_err() {
                        error!(user = %email, "Batch writer is gone, discarding manifests");
                    }
                },
            )
            .await;
        drop(records_tx);

        let stats = match writer.await {
            Ok(stats) => stats,
            Err(err) => {
                error!("Batch writer aborted: {}", err);
                return RunReport {
                    users_total,
                    users_active,
                    scheduler: scheduler_report,
                    ..RunReport::stopped(RunStatus::failed(format!(
                        "batch writer aborted: {}",
                        err
                    )))
                };
            }
        };
        info!(
            users = users_active,
            scanned = scheduler_report.completed,
            failed = scheduler_report.failed,
            rows_written = stats.rows_written,
            rows_dropped = stats.rows_dropped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Manifest audit finished"
        );

        RunReport {
            status: RunStatus::Success,
            users_total,
            users_active,
            scheduler: scheduler_report,
            buffer: stats,
        }
    }
}

/// Feed the buffer from a blocking thread; threshold merges never run on the
/// async workers, and scans keep going while a batch is being written.
fn spawn_batch_writer(
    buffer: BatchingBuffer<Arc<dyn BatchSink>>,
    mut records: UnboundedReceiver<Vec<ManifestRecord>>,
) -> JoinHandle<BufferStats> {
    tokio::task::spawn_blocking(move || {
        while let Some(batch) = records.blocking_recv() {
            buffer.add(batch);
        }
        buffer.flush();
        buffer.stats()
    })
}
