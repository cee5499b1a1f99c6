//! Integration tests for cancellation support in HarvestService and EmbeddingService.

use std::time::Duration;

use edutube_core::{
    CredentialPool, EmbeddingConfig, EmbeddingService, FetchError, HarvestConfig, HarvestService,
    HarvestStatus, HarvesterKind, ProgressTracker, VideoText,
};
use tempfile::TempDir;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::integration::common::{
    MockEmbeddingProvider, MockEmbeddingStore, MockFetcherFactory, MockLedger, MockSink,
    RecordingReporter, worklist,
};

#[tokio::test]
async fn test_cancellation_before_start() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let tracker = ProgressTracker::new(dir.path().join("channels_state.json"));
    let factory = MockFetcherFactory::new();
    let service = HarvestService::with_config(
        HarvesterKind::Channels,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker.clone(),
        HarvestConfig::default(),
    );

    let token = CancellationToken::new();
    token.cancel(); // Cancel immediately

    // Act
    let result = service
        .run_cancellable(
            &worklist(&["v1", "v2"]),
            &mut CredentialPool::anonymous(),
            token,
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(result.status, HarvestStatus::Interrupted);
    assert_eq!(result.stats.total(), 0, "Should have processed 0 items");
    assert!(factory.calls().is_empty());

    let saved = tracker.load().unwrap();
    assert_eq!(saved.last_completed_position, -1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_backoff() {
    // Arrange: v2 keeps failing so the loop sits in a 60s backoff
    let dir = TempDir::new().unwrap();
    let tracker = ProgressTracker::new(dir.path().join("comments_state.json"));
    let factory = MockFetcherFactory::new()
        .always_fail("v2", FetchError::transient("HTTP 500").with_status(500));
    let reporter = RecordingReporter::new();
    let service = HarvestService::with_config(
        HarvesterKind::Comments,
        factory.clone(),
        MockSink::new(),
        MockLedger::new(),
        tracker.clone(),
        HarvestConfig::default(),
    );
    let token = CancellationToken::new();

    // Act: cancel 10s into the first backoff
    let token_clone = token.clone();
    let canceller = tokio::spawn(async move {
        sleep(Duration::from_secs(10)).await;
        token_clone.cancel();
    });
    let started = Instant::now();
    let result = service
        .run_with_progress(
            &worklist(&["v1", "v2", "v3"]),
            &mut CredentialPool::anonymous(),
            &reporter,
            token,
        )
        .await
        .unwrap();
    canceller.await.unwrap();

    // Assert
    assert_eq!(result.status, HarvestStatus::Interrupted);
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(
        factory.called_items(),
        vec!["v1".to_string(), "v2".to_string()]
    );

    let saved = tracker.load().unwrap();
    assert_eq!(saved.last_completed_position, 0);
    assert_eq!(saved.last_completed_item.as_deref(), Some("v1"));
    assert_eq!(reporter.count("transient"), 1);
    assert!(reporter.events().contains(&"interrupted 0".to_string()));
}

#[tokio::test]
async fn test_embedding_cancelled_before_start() {
    // Arrange
    let store = MockEmbeddingStore::with_videos(vec![VideoText {
        video_id: "v1".to_string(),
        title: "Intro to SQL".to_string(),
        description: None,
        transcript: None,
    }]);
    let provider = MockEmbeddingProvider::new(4, 8);
    let service = EmbeddingService::with_config(
        store.clone(),
        provider.clone(),
        EmbeddingConfig::default(),
    );
    let token = CancellationToken::new();
    token.cancel();

    // Act
    let summary = service.embed_pending(token).await.unwrap();

    // Assert
    assert!(summary.cancelled);
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.embedded, 0);
    assert!(store.stored.lock().unwrap().is_empty());
}
