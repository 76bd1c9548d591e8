use chrono::{DateTime, Duration, Utc};

use crate::contract::{SweepSummary, TransferOutcome};

pub const DEFAULT_AGE_THRESHOLD_MINUTES: i64 = 60;

pub fn cutoff_time(now: DateTime<Utc>, age_threshold_minutes: i64) -> DateTime<Utc> {
    now - Duration::minutes(age_threshold_minutes)
}

/// Objects created strictly before the cutoff are stale.
pub fn is_stale(created_at: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    created_at < cutoff
}

#[derive(Debug, Clone)]
pub struct SweepTally {
    summary: SweepSummary,
}

impl SweepTally {
    pub fn new(now: DateTime<Utc>, age_threshold_minutes: i64) -> Self {
        Self {
            summary: SweepSummary {
                total_files: 0,
                stale_files: 0,
                successes: 0,
                failures: 0,
                already_transferred: 0,
                age_threshold_minutes,
                cutoff_time: cutoff_time(now, age_threshold_minutes),
            },
        }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.summary.cutoff_time
    }

    /// Counts a listed object and reports whether it should be retried.
    pub fn observe(&mut self, created_at: DateTime<Utc>) -> bool {
        self.summary.total_files += 1;
        let stale = is_stale(created_at, self.summary.cutoff_time);
        if stale {
            self.summary.stale_files += 1;
        }
        stale
    }

    /// A listed entry that could not be decoded counts as seen and failed.
    pub fn record_unreadable(&mut self) {
        self.summary.total_files += 1;
        self.summary.failures += 1;
    }

    pub fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::AlreadyExists { .. } => {
                self.summary.successes += 1;
                self.summary.already_transferred += 1;
            }
            TransferOutcome::Success { .. } => self.summary.successes += 1,
            TransferOutcome::Failure { .. } => self.summary.failures += 1,
        }
    }

    pub fn finish(self) -> SweepSummary {
        self.summary
    }
}
