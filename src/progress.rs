//! Live progress counters for a running batch.

use serde::Serialize;

use crate::executor::OperationOutcome;
use crate::orchestrator::{BatchObserver, BatchResult, TerminalState};

/// Counters published after every attempted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
    /// Zero-based index of the item that produced this snapshot.
    pub current_index: usize,
}

impl ProgressSnapshot {
    /// `processed / total` as a percentage, 0 for an empty batch.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }

    pub fn status_line(&self) -> String {
        format!(
            "{} of {} processed ({} deleted, {} failed)",
            self.processed, self.total, self.succeeded, self.failed
        )
    }
}

/// Purely additive counters; the orchestrator is the only writer.
#[derive(Debug)]
pub struct ProgressReporter {
    total: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Record one outcome and publish the new snapshot synchronously.
    pub fn update(
        &mut self,
        index: usize,
        outcome: &OperationOutcome,
        observer: &mut dyn BatchObserver,
    ) -> ProgressSnapshot {
        match outcome {
            OperationOutcome::Success => self.succeeded += 1,
            OperationOutcome::Failure(_) => self.failed += 1,
            OperationOutcome::Skipped(_) => self.skipped += 1,
        }
        let snapshot = self.snapshot(index);
        observer.on_progress(&snapshot);
        snapshot
    }

    pub fn snapshot(&self, current_index: usize) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed(),
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            total: self.total,
            current_index,
        }
    }

    /// Freeze the counters. Items never attempted are folded into `skipped`.
    pub fn finalize(&self, state: TerminalState) -> BatchResult {
        let attempted = self.processed();
        BatchResult {
            total: self.total,
            attempted,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped + self.total.saturating_sub(attempted),
            cancelled: state != TerminalState::Completed,
            state,
        }
    }
}
