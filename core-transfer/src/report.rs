//! Aggregated result of a worker-pool run.

use crate::task::{TaskOutcome, TaskStatus};
use serde::{Deserialize, Serialize};

/// A task that did not succeed, with enough context to re-run it by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    pub label: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Tasks never started because the run was cancelled
    pub cancelled: usize,
    pub bytes_transferred: u64,
    pub failures: Vec<FailedTask>,
    /// Every finished task, in completion order
    pub outcomes: Vec<TaskOutcome>,
}

impl TransferReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn push(&mut self, outcome: TaskOutcome) {
        match outcome.status {
            TaskStatus::Success => self.succeeded += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::Failed => {
                self.failed += 1;
                self.failures.push(FailedTask {
                    label: outcome.label.clone(),
                    reason: outcome.reason().unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }
        self.bytes_transferred += outcome.bytes_sent;
        self.outcomes.push(outcome);
    }

    /// Count a failure that happened outside any task (e.g. an unmappable
    /// directory) so it shows up in totals and in `failures`.
    pub fn push_failure(&mut self, label: impl Into<String>, reason: impl Into<String>) {
        self.total += 1;
        self.failed += 1;
        self.failures.push(FailedTask {
            label: label.into(),
            reason: reason.into(),
        });
    }

    /// True when nothing failed and nothing was cut short.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} total, {} succeeded, {} skipped, {} failed, {} cancelled",
            self.total, self.succeeded, self.skipped, self.failed, self.cancelled
        )
    }
}
