//! Harvest service for resumable, rate-limited batch fetching.
//!
//! One loop drives every harvester:
//!
//! 1. Load the worklist and the progress file, compute the resume point.
//! 2. For each item in order: skip it if the failure ledger has it, otherwise
//!    fetch (retrying transient errors, rotating credentials on quota errors),
//!    persist every page through the sink, then advance the progress file.
//! 3. Pace between items, with a long pause every N items if configured.
//! 4. Clear the progress file once the worklist is drained.
//!
//! The progress file is only ever advanced after the sink write for that
//! position has returned, so a crash at any point loses nothing and redoes at
//! most the item that was in flight.
//!
//! Cancellation is observed at item and page boundaries and during retry
//! backoff. In-flight requests are allowed to finish; batch pauses are not
//! interrupted.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::checkpoint::{ProgressState, ProgressTracker, ResumeContext, ResumePoint};
use crate::config::{HarvestConfig, HarvesterKind, PacingConfig};
use crate::credentials::CredentialPool;
use crate::error::{AppError, FetchError, FetchErrorKind};
use crate::outcome::{HarvestResult, HarvestStats, HarvestStatus, ItemOutcome};
use crate::progress::{HarvestEvent, ProgressReporter, SilentReporter};
use crate::traits::{FailureLedger, FetchedPage, Fetcher, FetcherFactory, ResultSink, WorkSource};

/// Result of fetching one page with retries and rotation.
enum Attempt<R> {
    Fetched(FetchedPage<R>),
    Permanent(FetchError),
    RetriesExhausted(FetchError),
    Cancelled,
}

/// Service for running one harvester over its worklist.
///
/// Generic over:
/// - `F`: builds credential-bound fetchers
/// - `S`: persists fetched records
/// - `L`: records permanently failed items
pub struct HarvestService<F, S, L>
where
    F: FetcherFactory,
    S: ResultSink<Record = <F::Fetcher as Fetcher>::Record>,
    L: FailureLedger,
{
    kind: HarvesterKind,
    factory: F,
    sink: S,
    ledger: L,
    tracker: ProgressTracker,
    config: HarvestConfig,
}

impl<F, S, L> HarvestService<F, S, L>
where
    F: FetcherFactory,
    S: ResultSink<Record = <F::Fetcher as Fetcher>::Record>,
    L: FailureLedger,
{
    /// Creates a service with the default retry policy and the tuned pacing for `kind`.
    pub fn new(kind: HarvesterKind, factory: F, sink: S, ledger: L, tracker: ProgressTracker) -> Self {
        Self::with_config(
            kind,
            factory,
            sink,
            ledger,
            tracker,
            HarvestConfig::for_kind(kind),
        )
    }

    /// Creates a service with custom configuration.
    pub fn with_config(
        kind: HarvesterKind,
        factory: F,
        sink: S,
        ledger: L,
        tracker: ProgressTracker,
        config: HarvestConfig,
    ) -> Self {
        Self {
            kind,
            factory,
            sink,
            ledger,
            tracker,
            config,
        }
    }

    pub fn kind(&self) -> HarvesterKind {
        self.kind
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Runs the harvester to completion without progress reporting.
    pub async fn run<W: WorkSource>(
        &self,
        source: &W,
        pool: &mut CredentialPool,
    ) -> Result<HarvestResult, AppError> {
        self.run_with_progress(source, pool, &SilentReporter, CancellationToken::new()) // never cancelled
            .await
    }

    /// Runs the harvester with cancellation support.
    pub async fn run_cancellable<W: WorkSource>(
        &self,
        source: &W,
        pool: &mut CredentialPool,
        cancel_token: CancellationToken,
    ) -> Result<HarvestResult, AppError> {
        self.run_with_progress(source, pool, &SilentReporter, cancel_token)
            .await
    }

    /// Runs the harvester with progress reporting and cancellation support.
    ///
    /// # Returns
    ///
    /// - `Ok` with [`HarvestStatus::Exhausted`] when the worklist was drained
    /// - `Ok` with [`HarvestStatus::Interrupted`] when `cancel_token` fired
    /// - `Err` on a fatal condition (credential pool exhausted, storage or
    ///   progress-file failure, unreadable worklist). The progress file is
    ///   left as it was after the last completed item.
    pub async fn run_with_progress<W: WorkSource, R: ProgressReporter>(
        &self,
        source: &W,
        pool: &mut CredentialPool,
        reporter: &R,
        cancel_token: CancellationToken,
    ) -> Result<HarvestResult, AppError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("harvest", harvester = %self.kind, %run_id);

        self.run_inner(run_id, source, pool, reporter, cancel_token)
            .instrument(span)
            .await
    }

    async fn run_inner<W: WorkSource, R: ProgressReporter>(
        &self,
        run_id: Uuid,
        source: &W,
        pool: &mut CredentialPool,
        reporter: &R,
        cancel_token: CancellationToken,
    ) -> Result<HarvestResult, AppError> {
        let worklist = source.worklist().await?;
        let mut saved = self.tracker.load()?;
        let ResumePoint { start, mut cursor } = saved.resume_point(&worklist);

        reporter.report(HarvestEvent::Started {
            kind: self.kind,
            worklist_len: worklist.len(),
            start,
            resumed: !saved.is_fresh(),
        });

        let mut stats = HarvestStats::new();
        let mut last_completed = start as i64 - 1;
        let mut fetcher = self.factory.create(pool.active())?;

        let finish = |status: HarvestStatus, stats: HarvestStats| HarvestResult {
            run_id,
            status,
            stats,
            worklist_len: worklist.len(),
            start_position: start,
        };

        for position in start..worklist.len() {
            if cancel_token.is_cancelled() {
                self.flush(&saved, last_completed, &stats, reporter)?;
                return Ok(finish(HarvestStatus::Interrupted, stats));
            }

            let item = worklist[position].as_str();

            let already_failed = self
                .ledger
                .is_failed(self.kind, item)
                .await
                .map_err(|e| self.abort(position, item, reporter, e))?;
            if already_failed {
                reporter.report(HarvestEvent::SkippedFailed { position, item });
                stats.record(ItemOutcome::SkippedFailed);
                saved = self
                    .tracker
                    .advance(position as i64, Some(item), ResumeContext::default())
                    .map_err(|e| self.abort(position, item, reporter, e))?;
                last_completed = position as i64;
                cursor = None;
                continue;
            }

            reporter.report(HarvestEvent::ItemStarted { position, item });

            let mut page_cursor = cursor.take();
            let outcome = loop {
                let attempt = self
                    .fetch_with_retry(
                        &mut fetcher,
                        pool,
                        item,
                        page_cursor.as_deref(),
                        reporter,
                        &cancel_token,
                        &mut stats,
                    )
                    .await
                    .map_err(|e| self.abort(position, item, reporter, e))?;

                match attempt {
                    Attempt::Fetched(page) => {
                        self.sink
                            .persist(item, &page.record)
                            .await
                            .map_err(|e| self.abort(position, item, reporter, e))?;
                        stats.pages += 1;

                        let Some(next) = page.next_cursor else {
                            break ItemOutcome::Succeeded;
                        };

                        reporter.report(HarvestEvent::PagePersisted {
                            position,
                            item,
                            has_more: true,
                        });
                        saved = self
                            .tracker
                            .advance(
                                last_completed,
                                item_at(&worklist, last_completed),
                                ResumeContext::page(item, &next),
                            )
                            .map_err(|e| self.abort(position, item, reporter, e))?;

                        if cancel_token.is_cancelled() {
                            self.flush(&saved, last_completed, &stats, reporter)
                                .map_err(|e| self.abort(position, item, reporter, e))?;
                            return Ok(finish(HarvestStatus::Interrupted, stats));
                        }
                        pause(self.config.pacing.page_delay).await;
                        page_cursor = Some(next);
                    }
                    Attempt::Permanent(error) => {
                        self.ledger
                            .mark_failed(self.kind, item, &error.message)
                            .await
                            .map_err(|e| self.abort(position, item, reporter, e))?;
                        reporter.report(HarvestEvent::PermanentFailure {
                            position,
                            item,
                            error: &error,
                        });
                        break ItemOutcome::FailedPermanently;
                    }
                    Attempt::RetriesExhausted(error) => {
                        reporter.report(HarvestEvent::RetriesExhausted {
                            position,
                            item,
                            error: &error,
                        });
                        break ItemOutcome::RetriesExhausted;
                    }
                    Attempt::Cancelled => {
                        self.flush(&saved, last_completed, &stats, reporter)
                            .map_err(|e| self.abort(position, item, reporter, e))?;
                        return Ok(finish(HarvestStatus::Interrupted, stats));
                    }
                }
            };

            if outcome == ItemOutcome::Succeeded {
                reporter.report(HarvestEvent::ItemSucceeded { position, item });
            }
            stats.record(outcome);
            saved = self
                .tracker
                .advance(position as i64, Some(item), ResumeContext::default())
                .map_err(|e| self.abort(position, item, reporter, e))?;
            last_completed = position as i64;

            if position + 1 < worklist.len() {
                self.pace(position + 1, reporter).await;
            }
        }

        self.tracker.clear()?;
        reporter.report(HarvestEvent::Completed { stats: &stats });
        Ok(finish(HarvestStatus::Exhausted, stats))
    }

    /// Fetches one page, retrying transient failures and rotating credentials
    /// on quota failures. Quota rotations do not consume attempts.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_with_retry<R: ProgressReporter>(
        &self,
        fetcher: &mut F::Fetcher,
        pool: &mut CredentialPool,
        item: &str,
        cursor: Option<&str>,
        reporter: &R,
        cancel_token: &CancellationToken,
        stats: &mut HarvestStats,
    ) -> Result<Attempt<<F::Fetcher as Fetcher>::Record>, AppError> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let error = match fetcher.fetch(item, cursor).await {
                Ok(page) => {
                    pool.record_success();
                    return Ok(Attempt::Fetched(page));
                }
                Err(error) => error,
            };

            match error.kind {
                FetchErrorKind::QuotaExhausted => {
                    tracing::warn!(item, credential = %pool.active().redacted(), %error, "Quota exhausted");
                    let credential = pool.rotate()?.redacted();
                    *fetcher = self.factory.create(pool.active())?;
                    stats.rotations += 1;
                    reporter.report(HarvestEvent::CredentialRotated {
                        item,
                        credential: &credential,
                    });
                }
                FetchErrorKind::Permanent => return Ok(Attempt::Permanent(error)),
                FetchErrorKind::Transient | FetchErrorKind::NetworkReset => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Ok(Attempt::RetriesExhausted(error));
                    }

                    let delay = if error.kind == FetchErrorKind::NetworkReset {
                        self.config.retry.network_backoff
                    } else {
                        self.config.retry.backoff
                    };
                    reporter.report(HarvestEvent::TransientFailure {
                        item,
                        attempt,
                        max_attempts,
                        delay,
                        error: &error,
                    });

                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = cancel_token.cancelled() => return Ok(Attempt::Cancelled),
                    }
                }
            }
        }
    }

    /// Rewrites the last durable state on the interrupt path.
    fn flush<R: ProgressReporter>(
        &self,
        saved: &ProgressState,
        last_completed: i64,
        stats: &HarvestStats,
        reporter: &R,
    ) -> Result<(), AppError> {
        self.tracker.save(saved)?;
        reporter.report(HarvestEvent::Interrupted {
            last_completed_position: last_completed,
            stats,
        });
        Ok(())
    }

    /// Reports a fatal error together with the item it happened on.
    fn abort<R: ProgressReporter>(
        &self,
        position: usize,
        item: &str,
        reporter: &R,
        error: AppError,
    ) -> AppError {
        reporter.report(HarvestEvent::Aborted {
            position,
            item,
            error: &error,
        });
        error
    }

    /// Sleeps a random jitter, plus the batch pause when one is due.
    async fn pace<R: ProgressReporter>(&self, completed: usize, reporter: &R) {
        let pacing = &self.config.pacing;
        pause(jitter(pacing)).await;

        if pacing.batch_pause_due(completed) {
            reporter.report(HarvestEvent::BatchPause {
                completed,
                pause: pacing.batch_pause,
            });
            pause(pacing.batch_pause).await;
        }
    }
}

fn item_at(worklist: &[String], position: i64) -> Option<&str> {
    usize::try_from(position)
        .ok()
        .and_then(|p| worklist.get(p))
        .map(String::as_str)
}

/// Random delay in `[jitter_min, jitter_max]`, millisecond resolution.
fn jitter(pacing: &PacingConfig) -> Duration {
    let min = pacing.jitter_min.as_millis() as u64;
    let max = pacing.jitter_max.as_millis() as u64;
    if max <= min {
        return Duration::from_millis(min);
    }
    Duration::from_millis(rand::rng().random_range(min..=max))
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration).await;
    }
}
