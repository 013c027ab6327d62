//! Run-scoped outcome counters.

use serde::Serialize;

use crate::core::result_state::ErrorKind;

/// Terminal disposition of one processed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(String),
    NotFound,
    RetryableError(ErrorKind),
    /// Both names were empty; no lookup was made.
    Skipped,
}

/// Accumulates outcomes across one run.
///
/// Only `Success` and `NotFound` feed the headline tallies; retryable errors and
/// skips are still outstanding work and are tracked separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub selected: usize,
    pub success: usize,
    pub not_found: usize,
    pub retryable: usize,
    pub skipped: usize,
}

impl RunCounters {
    pub fn new(selected: usize) -> Self {
        Self {
            selected,
            ..Self::default()
        }
    }

    pub fn observe(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Success(_) => self.success += 1,
            TaskOutcome::NotFound => self.not_found += 1,
            TaskOutcome::RetryableError(_) => self.retryable += 1,
            TaskOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Tasks observed so far.
    pub fn processed(&self) -> usize {
        self.success + self.not_found + self.retryable + self.skipped
    }
}
