//! # Concurrency Controller
//!
//! Bounded worker pool. At most `limit` tasks run at once; each outcome is
//! recorded on its own, so a failing (or panicking) task never blocks or
//! aborts its siblings.

use crate::progress::{ProgressAggregate, ProgressSnapshot};
use crate::report::TransferReport;
use crate::task::{PoolTask, TaskOutcome};
use crate::error::TransferError;
use core_runtime::events::{EventBus, TransferEvent};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    limit: usize,
    events: Option<EventBus>,
}

impl ConcurrencyController {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `per_task` over every task and aggregate the outcomes.
    ///
    /// Once `cancel` fires no new task is started; tasks already running are
    /// left to finish on their own and the rest are counted as cancelled.
    #[instrument(skip_all, fields(tasks = tasks.len(), limit = self.limit))]
    pub async fn run_all<T, F, Fut>(
        &self,
        tasks: Vec<T>,
        progress: Arc<ProgressAggregate>,
        cancel: &CancellationToken,
        per_task: F,
    ) -> TransferReport
    where
        T: PoolTask,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let total = tasks.len();
        progress.set_total(total as u64);
        let mut report = TransferReport::new(total);

        let semaphore = Arc::new(Semaphore::new(self.limit));
        let per_task = Arc::new(per_task);
        let mut handles = Vec::with_capacity(total);
        let mut pending = tasks.into_iter();

        while let Some(task) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.cancelled = 1 + pending.len();
                warn!(cancelled = report.cancelled, "Run cancelled, not starting remaining tasks");
                break;
            };

            let label = task.label();
            let per_task = Arc::clone(&per_task);
            let progress = Arc::clone(&progress);
            let events = self.events.clone();

            let handle = tokio::spawn(async move {
                let outcome = per_task(task).await;
                drop(permit);
                let snapshot = progress.record(&outcome);
                announce(events.as_ref(), &outcome, &snapshot);
                outcome
            });
            handles.push((label, handle));
        }

        for (label, handle) in handles {
            match handle.await {
                Ok(outcome) => report.push(outcome),
                Err(e) => {
                    error!(task = %label, error = %e, "Task panicked");
                    let outcome = TaskOutcome::failed(
                        label,
                        TransferError::Internal(format!("worker panicked: {}", e)),
                    );
                    let snapshot = progress.record(&outcome);
                    announce(self.events.as_ref(), &outcome, &snapshot);
                    report.push(outcome);
                }
            }
        }

        info!(summary = %report.summary(), "Worker pool drained");
        report
    }
}

fn announce(events: Option<&EventBus>, outcome: &TaskOutcome, snapshot: &ProgressSnapshot) {
    info!(
        task = %outcome.label,
        status = %outcome.status,
        completed = snapshot.completed,
        total = snapshot.total,
        succeeded = snapshot.succeeded,
        skipped = snapshot.skipped,
        failed = snapshot.failed,
        "Task finished"
    );

    if let Some(events) = events {
        events.emit_transfer(TransferEvent::TaskCompleted {
            label: outcome.label.clone(),
            status: outcome.status.as_str().to_string(),
            reason: outcome.reason(),
            completed: snapshot.completed,
            total: snapshot.total,
            succeeded: snapshot.succeeded,
            skipped: snapshot.skipped,
            failed: snapshot.failed,
            bytes_transferred: snapshot.bytes_transferred,
        });
    }
}
