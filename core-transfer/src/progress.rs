//! # Progress Aggregation
//!
//! Counters shared by every worker of one run. All updates are atomic, so
//! completions may arrive in any order without losing increments.

use crate::task::{TaskOutcome, TaskStatus};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ProgressAggregate {
    total: AtomicU64,
    completed: AtomicU64,
    succeeded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    bytes_transferred: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes_transferred: u64,
}

impl ProgressSnapshot {
    /// Completion percentage (0-100)
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed.min(self.total) * 100) / self.total) as u8
    }
}

impl ProgressAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce how many tasks the run will attempt.
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    /// Count bytes as they leave (or land on) the machine.
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record one finished task and return the running totals.
    pub fn record(&self, outcome: &TaskOutcome) -> ProgressSnapshot {
        let counter = match outcome.status {
            TaskStatus::Success => &self.succeeded,
            TaskStatus::Skipped => &self.skipped,
            TaskStatus::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;

        ProgressSnapshot {
            completed,
            ..self.snapshot()
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferError;
    use std::sync::Arc;

    #[test]
    fn test_record_updates_running_totals() {
        let progress = ProgressAggregate::new();
        progress.set_total(3);

        let first = progress.record(&TaskOutcome::success("a", 10));
        assert_eq!(first.completed, 1);
        assert_eq!(first.succeeded, 1);

        progress.record(&TaskOutcome::skipped("b"));
        let last = progress.record(&TaskOutcome::failed("c", TransferError::Cancelled));

        assert_eq!(last.completed, 3);
        assert_eq!(last.skipped, 1);
        assert_eq!(last.failed, 1);
        assert_eq!(last.percent(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let progress = Arc::new(ProgressAggregate::new());
        let mut handles = Vec::new();

        for i in 0..64 {
            let progress = Arc::clone(&progress);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    progress.add_bytes(1);
                }
                let outcome = if i % 2 == 0 {
                    TaskOutcome::success("even", 100)
                } else {
                    TaskOutcome::skipped("odd")
                };
                progress.record(&outcome);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.completed, 64);
        assert_eq!(snapshot.succeeded, 32);
        assert_eq!(snapshot.skipped, 32);
        assert_eq!(snapshot.bytes_transferred, 6400);
    }

    #[test]
    fn test_percent_with_no_tasks() {
        assert_eq!(ProgressSnapshot::default().percent(), 100);
    }
}
