//! Integration tests for HarvestService using mock implementations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use edutube_core::traits::ResultSink;
use edutube_core::{
    AppError, CredentialPool, FetchError, FetchedPage, HarvestConfig, HarvestService,
    HarvestStatus, HarvesterKind, PacingConfig, ProgressState, ProgressTracker, ResumeContext,
};
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::integration::common::{
    MockFetcherFactory, MockLedger, MockSink, RecordingReporter, worklist,
};

fn tracker(dir: &TempDir, kind: HarvesterKind) -> ProgressTracker {
    ProgressTracker::new(dir.path().join(kind.state_file_name()))
}

fn service<S: ResultSink<Record = String>>(
    kind: HarvesterKind,
    factory: MockFetcherFactory,
    sink: S,
    ledger: MockLedger,
    tracker: ProgressTracker,
) -> HarvestService<MockFetcherFactory, S, MockLedger> {
    HarvestService::with_config(kind, factory, sink, ledger, tracker, HarvestConfig::default())
}

fn pool(n: usize) -> CredentialPool {
    CredentialPool::new((0..n).map(|i| format!("key-{}", i)).collect()).unwrap()
}

// =============================================================================
// Outcomes and the failure ledger
// =============================================================================

/// Test 1: Success, permanent failure, success.
///
/// The permanent failure lands in the ledger and the run still completes,
/// removing the progress file.
#[tokio::test]
async fn test_mixed_outcomes_complete_run() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let factory = MockFetcherFactory::new()
        .always_fail("v2", FetchError::permanent("Transcripts are disabled"));
    let sink = MockSink::new();
    let ledger = MockLedger::new();
    let tracker = tracker(&dir, HarvesterKind::Transcripts);
    let svc = service(
        HarvesterKind::Transcripts,
        factory.clone(),
        sink.clone(),
        ledger.clone(),
        tracker.clone(),
    );

    // Act
    let result = svc
        .run(&worklist(&["v1", "v2", "v3"]), &mut CredentialPool::anonymous())
        .await
        .unwrap();

    // Assert
    assert_eq!(result.status, HarvestStatus::Exhausted);
    assert_eq!(result.stats.succeeded, 2);
    assert_eq!(result.stats.failed_permanently, 1);
    assert_eq!(sink.items(), vec!["v1", "v3"]);
    assert!(ledger.contains(HarvesterKind::Transcripts, "v2"));
    assert_eq!(ledger.len(), 1);
    assert!(!tracker.exists());
}

/// Test 2: A rerun after completion skips ledger items without fetching them.
#[tokio::test]
async fn test_rerun_skips_failed_items() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let ledger = MockLedger::new();
    let first = MockFetcherFactory::new()
        .always_fail("v2", FetchError::permanent("Video unavailable"));
    service(
        HarvesterKind::Transcripts,
        first,
        MockSink::new(),
        ledger.clone(),
        tracker(&dir, HarvesterKind::Transcripts),
    )
    .run(&worklist(&["v1", "v2", "v3"]), &mut CredentialPool::anonymous())
    .await
    .unwrap();

    let second = MockFetcherFactory::new();
    let reporter = RecordingReporter::new();
    let svc = service(
        HarvesterKind::Transcripts,
        second.clone(),
        MockSink::new(),
        ledger.clone(),
        tracker(&dir, HarvesterKind::Transcripts),
    );

    // Act
    let result = svc
        .run_with_progress(
            &worklist(&["v1", "v2", "v3"]),
            &mut CredentialPool::anonymous(),
            &reporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(second.called_items(), vec!["v1", "v3"]);
    assert_eq!(result.stats.skipped_failed, 1);
    assert!(reporter.events().contains(&"skipped v2".to_string()));
}

/// Test 3: The ledger is scoped per harvester.
///
/// An item failed for transcripts is still fetched by the comments harvester.
#[tokio::test]
async fn test_ledger_is_per_harvester() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let ledger = MockLedger::with_failed(HarvesterKind::Transcripts, &["v2"]);
    let factory = MockFetcherFactory::new();
    let svc = service(
        HarvesterKind::Comments,
        factory.clone(),
        MockSink::new(),
        ledger.clone(),
        tracker(&dir, HarvesterKind::Comments),
    );

    // Act
    svc.run(&worklist(&["v1", "v2"]), &mut CredentialPool::anonymous())
        .await
        .unwrap();

    // Assert
    assert_eq!(factory.called_items(), vec!["v1", "v2"]);
}

/// Test 4: Ledger items are never fetched, including the first item.
#[tokio::test]
async fn test_ledger_items_never_fetched() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let ledger = MockLedger::with_failed(HarvesterKind::Channels, &["v1", "v3"]);
    let factory = MockFetcherFactory::new();
    let sink = MockSink::new();
    let svc = service(
        HarvesterKind::Channels,
        factory.clone(),
        sink.clone(),
        ledger,
        tracker(&dir, HarvesterKind::Channels),
    );

    // Act
    let result = svc
        .run(&worklist(&["v1", "v2", "v3"]), &mut CredentialPool::anonymous())
        .await
        .unwrap();

    // Assert
    assert_eq!(factory.called_items(), vec!["v2"]);
    assert_eq!(sink.items(), vec!["v2"]);
    assert_eq!(result.stats.skipped_failed, 2);
}

// =============================================================================
// Resume
// =============================================================================

/// Test 5: A run resumes right after the stored position.
#[tokio::test]
async fn test_resume_from_saved_position() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let tracker = tracker(&dir, HarvesterKind::Search);
    tracker
        .advance(0, Some("sql join"), ResumeContext::default())
        .unwrap();
    let factory = MockFetcherFactory::new();
    let svc = service(
        HarvesterKind::Search,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker,
    );

    // Act
    let result = svc
        .run(
            &worklist(&["sql join", "data mining", "b-tree"]),
            &mut pool(1),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(result.start_position, 1);
    assert_eq!(factory.called_items(), vec!["data mining", "b-tree"]);
}

/// Test 6: When the worklist changed, the run re-anchors on the last completed item.
#[tokio::test]
async fn test_resume_reanchors_on_changed_worklist() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let tracker = tracker(&dir, HarvesterKind::Channels);
    tracker
        .advance(1, Some("v2"), ResumeContext::default())
        .unwrap();
    let factory = MockFetcherFactory::new();
    let svc = service(
        HarvesterKind::Channels,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker,
    );

    // Act: v0 was inserted before v1 since the last run
    svc.run(
        &worklist(&["v0", "v1", "v2", "v3"]),
        &mut CredentialPool::anonymous(),
    )
    .await
    .unwrap();

    // Assert
    assert_eq!(factory.called_items(), vec!["v3"]);
}

/// Test 7: A corrupt progress file aborts the run instead of starting over.
#[tokio::test]
async fn test_corrupt_progress_file_is_fatal() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let tracker = tracker(&dir, HarvesterKind::Comments);
    std::fs::write(tracker.path(), "{ not json").unwrap();
    let factory = MockFetcherFactory::new();
    let svc = service(
        HarvesterKind::Comments,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker,
    );

    // Act
    let result = svc
        .run(&worklist(&["v1"]), &mut CredentialPool::anonymous())
        .await;

    // Assert
    assert!(matches!(result, Err(AppError::ProgressFileError(_))));
    assert!(factory.calls().is_empty());
}

// =============================================================================
// Pagination
// =============================================================================

/// Test 8: Pages are requested with the cursor returned by the previous page.
#[tokio::test]
async fn test_pagination_follows_cursors() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let factory = MockFetcherFactory::new().script(
        "sql join",
        vec![
            Ok(FetchedPage::with_next("p1".to_string(), "T2")),
            Ok(FetchedPage::with_next("p2".to_string(), "T3")),
            Ok(FetchedPage::last("p3".to_string())),
        ],
    );
    let sink = MockSink::new();
    let svc = service(
        HarvesterKind::Search,
        factory.clone(),
        sink.clone(),
        MockLedger::new(),
        tracker(&dir, HarvesterKind::Search),
    );

    // Act
    let result = svc
        .run(&worklist(&["sql join"]), &mut pool(1))
        .await
        .unwrap();

    // Assert
    let cursors: Vec<Option<String>> = factory.calls().into_iter().map(|c| c.cursor).collect();
    assert_eq!(
        cursors,
        vec![None, Some("T2".to_string()), Some("T3".to_string())]
    );
    assert_eq!(sink.records(), vec!["p1", "p2", "p3"]);
    assert_eq!(result.stats.pages, 3);
    assert_eq!(result.stats.succeeded, 1);
}

/// Test 9: A run interrupted mid-pagination continues from the saved page token.
#[tokio::test]
async fn test_resume_mid_pagination() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let tracker = tracker(&dir, HarvesterKind::Search);
    tracker
        .advance(-1, None, ResumeContext::page("sql join", "T2"))
        .unwrap();
    let factory = MockFetcherFactory::new().script(
        "sql join",
        vec![Ok(FetchedPage::last("p2".to_string()))],
    );
    let svc = service(
        HarvesterKind::Search,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker,
    );

    // Act
    svc.run(&worklist(&["sql join", "b-tree"]), &mut pool(1))
        .await
        .unwrap();

    // Assert
    let calls = factory.calls();
    assert_eq!(calls[0].item, "sql join");
    assert_eq!(calls[0].cursor.as_deref(), Some("T2"));
    assert_eq!(calls[1].item, "b-tree");
    assert_eq!(calls[1].cursor, None);
}

/// Test 10: Interrupting between pages saves the next page token.
#[tokio::test]
async fn test_interrupt_between_pages_saves_token() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let factory = MockFetcherFactory::new()
        .script(
            "sql join",
            vec![Ok(FetchedPage::with_next("p1".to_string(), "T2"))],
        )
        .cancel_after("sql join", token.clone());
    let tracker = tracker(&dir, HarvesterKind::Search);
    let svc = service(
        HarvesterKind::Search,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker.clone(),
    );

    // Act
    let result = svc
        .run_cancellable(&worklist(&["sql join", "b-tree"]), &mut pool(1), token)
        .await
        .unwrap();

    // Assert
    assert_eq!(result.status, HarvestStatus::Interrupted);
    let saved = tracker.load().unwrap();
    assert_eq!(saved.last_completed_position, -1);
    assert_eq!(saved.context.next_page_token.as_deref(), Some("T2"));
    assert_eq!(saved.context.current_item.as_deref(), Some("sql join"));
    assert_eq!(factory.calls().len(), 1);
}

// =============================================================================
// Credential rotation
// =============================================================================

/// Test 11: Every credential reporting quota exhaustion aborts the run.
///
/// Each credential is tried exactly once before the pool gives up.
#[tokio::test]
async fn test_pool_exhaustion_is_fatal() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let factory = MockFetcherFactory::new()
        .always_fail("sql join", FetchError::quota_exhausted("quotaExceeded").with_status(403));
    let tracker = tracker(&dir, HarvesterKind::Search);
    let svc = service(
        HarvesterKind::Search,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker.clone(),
    );

    // Act
    let result = svc.run(&worklist(&["sql join"]), &mut pool(3)).await;

    // Assert
    assert!(matches!(
        result,
        Err(AppError::PoolExhausted { credentials: 3 })
    ));
    let creds: Vec<usize> = factory.calls().into_iter().map(|c| c.credential).collect();
    assert_eq!(creds, vec![0, 1, 2]);
    assert!(!tracker.exists());
}

/// Test 12: Rotation retries the same request with the next credential.
///
/// Quota failures do not consume retry attempts and later items keep the
/// rotated credential.
#[tokio::test]
async fn test_rotation_then_success() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let factory = MockFetcherFactory::new().script(
        "v1",
        vec![
            Err(FetchError::quota_exhausted("dailyLimitExceeded")),
            Ok(FetchedPage::last("channel".to_string())),
        ],
    );
    let reporter = RecordingReporter::new();
    let mut pool = pool(2);
    let svc = service(
        HarvesterKind::Channels,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker(&dir, HarvesterKind::Channels),
    );

    // Act
    let result = svc
        .run_with_progress(
            &worklist(&["v1", "v2"]),
            &mut pool,
            &reporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Assert
    let calls: Vec<(usize, String)> = factory
        .calls()
        .into_iter()
        .map(|c| (c.credential, c.item))
        .collect();
    assert_eq!(
        calls,
        vec![
            (0, "v1".to_string()),
            (1, "v1".to_string()),
            (1, "v2".to_string())
        ]
    );
    assert_eq!(result.stats.rotations, 1);
    assert_eq!(result.stats.succeeded, 2);
    assert_eq!(pool.active().index(), 1);
    assert_eq!(reporter.count("rotated"), 1);
}

// =============================================================================
// Retry and backoff
// =============================================================================

/// Test 13: Transient failures are retried up to the attempt bound with the
/// fixed backoff between attempts, then the item is skipped.
#[tokio::test(start_paused = true)]
async fn test_retry_bound_and_backoff() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let factory = MockFetcherFactory::new()
        .always_fail("v1", FetchError::transient("HTTP 503").with_status(503));
    let ledger = MockLedger::new();
    let sink = MockSink::new();
    let tracker = tracker(&dir, HarvesterKind::Comments);
    let svc = service(
        HarvesterKind::Comments,
        factory.clone(),
        sink.clone(),
        ledger.clone(),
        tracker.clone(),
    );
    let started = Instant::now();

    // Act
    let result = svc
        .run(&worklist(&["v1", "v2"]), &mut pool(1))
        .await
        .unwrap();

    // Assert
    let v1_calls = factory
        .called_items()
        .into_iter()
        .filter(|i| i == "v1")
        .count();
    assert_eq!(v1_calls, 3);
    assert!(started.elapsed() >= Duration::from_secs(120));
    assert_eq!(result.stats.retries_exhausted, 1);
    assert_eq!(result.stats.succeeded, 1);
    assert_eq!(ledger.len(), 0);
    assert_eq!(sink.items(), vec!["v2"]);
}

/// Test 14: Connection resets use the short network backoff.
#[tokio::test(start_paused = true)]
async fn test_network_reset_short_backoff() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let factory = MockFetcherFactory::new().script(
        "v1",
        vec![
            Err(FetchError::network_reset("connection reset by peer")),
            Ok(FetchedPage::last("t".to_string())),
        ],
    );
    let svc = service(
        HarvesterKind::Transcripts,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker(&dir, HarvesterKind::Transcripts),
    );
    let started = Instant::now();

    // Act
    let result = svc
        .run(&worklist(&["v1"]), &mut CredentialPool::anonymous())
        .await
        .unwrap();

    // Assert
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(60));
    assert_eq!(result.stats.succeeded, 1);
    assert_eq!(factory.calls().len(), 2);
}

// =============================================================================
// Durability
// =============================================================================

/// Sink that records the progress file position seen at each write.
#[derive(Clone)]
struct ProbeSink {
    tracker: ProgressTracker,
    observed: Arc<Mutex<Vec<i64>>>,
}

impl ResultSink for ProbeSink {
    type Record = String;

    async fn persist(&self, _item: &str, _record: &String) -> Result<(), AppError> {
        let state = self.tracker.load()?;
        self.observed
            .lock()
            .unwrap()
            .push(state.last_completed_position);
        Ok(())
    }
}

/// Test 15: The progress file never runs ahead of the sink.
///
/// While item N is being written, the file still says N - 1.
#[tokio::test]
async fn test_persist_before_advance() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let tracker = tracker(&dir, HarvesterKind::Channels);
    let sink = ProbeSink {
        tracker: tracker.clone(),
        observed: Arc::new(Mutex::new(Vec::new())),
    };
    let svc = service(
        HarvesterKind::Channels,
        MockFetcherFactory::new(),
        sink.clone(),
        MockLedger::new(),
        tracker,
    );

    // Act
    svc.run(&worklist(&["v1", "v2", "v3"]), &mut pool(1))
        .await
        .unwrap();

    // Assert
    assert_eq!(*sink.observed.lock().unwrap(), vec![-1, 0, 1]);
}

/// Test 16: A storage failure aborts the run without advancing past it.
#[tokio::test]
async fn test_storage_failure_is_fatal() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let tracker = tracker(&dir, HarvesterKind::Comments);
    let factory = MockFetcherFactory::new();
    let svc = service(
        HarvesterKind::Comments,
        factory.clone(),
        MockSink::failing_on("v2"),
        MockLedger::new(),
        tracker.clone(),
    );

    // Act
    let result = svc
        .run(&worklist(&["v1", "v2", "v3"]), &mut pool(1))
        .await;

    // Assert
    assert!(result.is_err());
    let saved: ProgressState = tracker.load().unwrap();
    assert_eq!(saved.last_completed_position, 0);
    assert_eq!(saved.last_completed_item.as_deref(), Some("v1"));
    assert_eq!(factory.called_items(), vec!["v1", "v2"]);
}

// =============================================================================
// Interruption and pacing
// =============================================================================

/// Test 17: Interrupt after the first item, then resume.
///
/// The progress file records position 0 and the second run fetches only the
/// remaining items.
#[tokio::test]
async fn test_interrupt_then_resume() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let first = MockFetcherFactory::new().cancel_after("v1", token.clone());
    let tracker = tracker(&dir, HarvesterKind::Transcripts);
    let reporter = RecordingReporter::new();

    // Act
    let interrupted = service(
        HarvesterKind::Transcripts,
        first.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker.clone(),
    )
    .run_with_progress(
        &worklist(&["v1", "v2", "v3"]),
        &mut CredentialPool::anonymous(),
        &reporter,
        token,
    )
    .await
    .unwrap();

    let saved = tracker.load().unwrap();

    let second = MockFetcherFactory::new();
    let resumed = service(
        HarvesterKind::Transcripts,
        second.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker.clone(),
    )
    .run(&worklist(&["v1", "v2", "v3"]), &mut CredentialPool::anonymous())
    .await
    .unwrap();

    // Assert
    assert!(interrupted.is_interrupted());
    assert_eq!(first.called_items(), vec!["v1"]);
    assert_eq!(saved.last_completed_position, 0);
    assert!(reporter.events().contains(&"interrupted 0".to_string()));

    assert_eq!(resumed.status, HarvestStatus::Exhausted);
    assert_eq!(second.called_items(), vec!["v2", "v3"]);
    assert!(!tracker.exists());
}

/// Test 18: Cancelling after the third of four items leaves position 2.
#[tokio::test]
async fn test_interrupt_records_last_completed_position() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let factory = MockFetcherFactory::new().cancel_after("v3", token.clone());
    let tracker = tracker(&dir, HarvesterKind::Channels);
    let svc = service(
        HarvesterKind::Channels,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker.clone(),
    );

    // Act
    let result = svc
        .run_cancellable(&worklist(&["v1", "v2", "v3", "v4"]), &mut pool(1), token)
        .await
        .unwrap();

    // Assert
    assert_eq!(result.status, HarvestStatus::Interrupted);
    assert_eq!(result.stats.succeeded, 3);
    let saved = tracker.load().unwrap();
    assert_eq!(saved.last_completed_position, 2);
    assert_eq!(saved.last_completed_item.as_deref(), Some("v3"));
}

/// Test 19: The long pause runs after every full batch, but not after the last item.
#[tokio::test(start_paused = true)]
async fn test_batch_pause() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let pacing = PacingConfig {
        batch_size: Some(2),
        batch_pause: Duration::from_secs(300),
        ..PacingConfig::none()
    };
    let reporter = RecordingReporter::new();
    let svc = HarvestService::with_config(
        HarvesterKind::Transcripts,
        MockFetcherFactory::new(),
        MockSink::new(),
        MockLedger::new(),
        tracker(&dir, HarvesterKind::Transcripts),
        HarvestConfig::default().with_pacing(pacing),
    );
    let started = Instant::now();

    // Act: pauses are due after items 2 and 4
    svc.run_with_progress(
        &worklist(&["v1", "v2", "v3", "v4", "v5"]),
        &mut CredentialPool::anonymous(),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    // Assert
    assert_eq!(reporter.count("pause"), 2);
    assert!(started.elapsed() >= Duration::from_secs(600));
    assert!(started.elapsed() < Duration::from_secs(900));
}

/// Test 20: Default pacing for a kind comes from its tuned profile.
#[test]
fn test_new_uses_kind_pacing() {
    let dir = TempDir::new().unwrap();
    let svc = HarvestService::new(
        HarvesterKind::Comments,
        MockFetcherFactory::new(),
        MockSink::new(),
        MockLedger::new(),
        tracker(&dir, HarvesterKind::Comments),
    );
    assert_eq!(svc.kind(), HarvesterKind::Comments);
    assert!(svc.tracker().path().ends_with("comments_state.json"));
}

/// Test 21: A fatal storage error is reported with the item it happened on.
#[tokio::test]
async fn test_fatal_error_reports_item() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let reporter = RecordingReporter::new();
    let svc = service(
        HarvesterKind::Comments,
        MockFetcherFactory::new(),
        MockSink::failing_on("v2"),
        MockLedger::new(),
        tracker(&dir, HarvesterKind::Comments),
    );

    // Act
    let result = svc
        .run_with_progress(
            &worklist(&["v1", "v2", "v3"]),
            &mut pool(1),
            &reporter,
            CancellationToken::new(),
        )
        .await;

    // Assert
    assert!(result.is_err());
    assert_eq!(reporter.count("aborted"), 1);
    assert!(reporter.events().contains(&"aborted v2 position=1".to_string()));
    assert!(!reporter.events().iter().any(|e| e.starts_with("item v3")));
}
