//! Cycle and run counters.

use serde::{Deserialize, Serialize};

use super::RecordOutcome;

/// Result of one fetch-process-commit cycle.
///
/// Counts only mean something once the cycle committed; a failed commit
/// surfaces as an error instead of a report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub published: usize,
    pub retried: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Published => self.published += 1,
            RecordOutcome::Retry { .. } => self.retried += 1,
            RecordOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.fetched == 0
    }
}

/// Totals over the lifetime of a running dispatcher.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub cycles: u64,
    /// Cycles aborted by a storage error (fetch or commit).
    pub failed_cycles: u64,
    pub published: u64,
    pub retried: u64,
    pub failed: u64,
}

impl DispatcherStats {
    pub fn absorb(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.published += report.published as u64;
        self.retried += report.retried as u64;
        self.failed += report.failed as u64;
    }

    pub fn record_failed_cycle(&mut self) {
        self.cycles += 1;
        self.failed_cycles += 1;
    }

    /// Fold another loop's totals into these.
    pub fn merge(&mut self, other: &DispatcherStats) {
        self.cycles += other.cycles;
        self.failed_cycles += other.failed_cycles;
        self.published += other.published;
        self.retried += other.retried;
        self.failed += other.failed;
    }
}
