//! Per-item outcomes and run statistics for harvests.

use std::fmt;

use uuid::Uuid;

/// Outcome of processing a single work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Fetched and persisted.
    Succeeded,
    /// Permanent error, recorded in the failure ledger.
    FailedPermanently,
    /// Transient errors on every attempt; left out of the ledger so a later run can retry.
    RetriesExhausted,
    /// Already in the failure ledger, not fetched.
    SkippedFailed,
}

/// Statistics for one harvester run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub succeeded: usize,
    pub failed_permanently: usize,
    pub retries_exhausted: usize,
    pub skipped_failed: usize,
    /// Pages persisted, including the last page of each item.
    pub pages: usize,
    /// Credential rotations performed.
    pub rotations: usize,
}

impl HarvestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::FailedPermanently => self.failed_permanently += 1,
            ItemOutcome::RetriesExhausted => self.retries_exhausted += 1,
            ItemOutcome::SkippedFailed => self.skipped_failed += 1,
        }
    }

    /// Items the run reached, whatever their outcome.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed_permanently + self.retries_exhausted + self.skipped_failed
    }

    /// Items that ended in an error during this run.
    pub fn failed(&self) -> usize {
        self.failed_permanently + self.retries_exhausted
    }
}

/// How a harvester run ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStatus {
    /// The worklist was drained and the progress file removed.
    Exhausted,
    /// Cancellation was observed; the progress file holds the resume point.
    Interrupted,
}

impl HarvestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a harvester run.
#[derive(Debug, Clone)]
pub struct HarvestResult {
    pub run_id: Uuid,
    pub status: HarvestStatus,
    pub stats: HarvestStats,
    /// Worklist length at the start of the run.
    pub worklist_len: usize,
    /// Index the run started from.
    pub start_position: usize,
}

impl HarvestResult {
    pub fn is_interrupted(&self) -> bool {
        self.status.is_interrupted()
    }
}
