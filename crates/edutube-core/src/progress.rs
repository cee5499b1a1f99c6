//! Harvest lifecycle events and reporters.
//!
//! The harvester loop never logs directly; it emits [`HarvestEvent`]s and the
//! caller decides what to do with them. The CLI uses [`TracingReporter`],
//! tests use [`SilentReporter`] or a recording reporter.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::HarvesterKind;
use crate::error::{AppError, FetchError};
use crate::outcome::HarvestStats;

/// Events emitted by the harvester loop.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    /// Run started. `start` is the first index to process.
    Started {
        kind: HarvesterKind,
        worklist_len: usize,
        start: usize,
        resumed: bool,
    },
    /// Work on an item began.
    ItemStarted { position: usize, item: &'a str },
    /// One page of a paginated item was persisted.
    PagePersisted {
        position: usize,
        item: &'a str,
        has_more: bool,
    },
    /// Item fully fetched and persisted.
    ItemSucceeded { position: usize, item: &'a str },
    /// A transient failure; the loop waits `delay` before attempt `attempt + 1`.
    TransientFailure {
        item: &'a str,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: &'a FetchError,
    },
    /// Quota exhausted on the active credential, rotated to `credential`.
    CredentialRotated { item: &'a str, credential: &'a str },
    /// Permanent failure, recorded in the failure ledger.
    PermanentFailure {
        position: usize,
        item: &'a str,
        error: &'a FetchError,
    },
    /// All attempts failed transiently; the item is skipped for this run.
    RetriesExhausted {
        position: usize,
        item: &'a str,
        error: &'a FetchError,
    },
    /// Item is already in the failure ledger.
    SkippedFailed { position: usize, item: &'a str },
    /// Long scheduled pause after `completed` items.
    BatchPause { completed: usize, pause: Duration },
    /// Cancellation observed; progress flushed.
    Interrupted {
        last_completed_position: i64,
        stats: &'a HarvestStats,
    },
    /// A fatal error stopped the run while working on `item`.
    Aborted {
        position: usize,
        item: &'a str,
        error: &'a AppError,
    },
    /// Worklist drained.
    Completed { stats: &'a HarvestStats },
}

/// Trait for reporting harvest progress.
pub trait ProgressReporter: Send + Sync {
    /// Called when a harvest event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Reporter that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::Started {
                kind,
                worklist_len,
                start,
                resumed,
            } => {
                if resumed {
                    info!(harvester = %kind, worklist_len, start, "Resuming harvest");
                } else {
                    info!(harvester = %kind, worklist_len, "Starting harvest");
                }
            }
            HarvestEvent::ItemStarted { position, item } => {
                info!(position, item, "Processing item");
            }
            HarvestEvent::PagePersisted {
                position,
                item,
                has_more,
            } => {
                info!(position, item, has_more, "Page persisted");
            }
            HarvestEvent::ItemSucceeded { position, item } => {
                info!(position, item, "Item completed");
            }
            HarvestEvent::TransientFailure {
                item,
                attempt,
                max_attempts,
                delay,
                error,
            } => {
                warn!(
                    item,
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    %error,
                    "Transient failure, backing off"
                );
            }
            HarvestEvent::CredentialRotated { item, credential } => {
                warn!(item, credential, "Quota exhausted, switched credential");
            }
            HarvestEvent::PermanentFailure {
                position,
                item,
                error,
            } => {
                warn!(position, item, reason = %error, "Permanent failure, recorded in ledger");
            }
            HarvestEvent::RetriesExhausted {
                position,
                item,
                error,
            } => {
                error!(position, item, reason = %error, "Retries exhausted, skipping item");
            }
            HarvestEvent::SkippedFailed { position, item } => {
                info!(position, item, "Skipping item already in failure ledger");
            }
            HarvestEvent::BatchPause { completed, pause } => {
                info!(completed, pause_secs = pause.as_secs(), "Batch pause");
            }
            HarvestEvent::Interrupted {
                last_completed_position,
                stats,
            } => {
                warn!(
                    last_completed_position,
                    succeeded = stats.succeeded,
                    failed = stats.failed(),
                    "Harvest interrupted, progress saved"
                );
            }
            HarvestEvent::Aborted {
                position,
                item,
                error,
            } => {
                error!(position, item, %error, "Harvest aborted, progress file left in place");
            }
            HarvestEvent::Completed { stats } => {
                info!(
                    succeeded = stats.succeeded,
                    failed_permanently = stats.failed_permanently,
                    retries_exhausted = stats.retries_exhausted,
                    skipped = stats.skipped_failed,
                    "Harvest complete"
                );
            }
        }
    }
}
