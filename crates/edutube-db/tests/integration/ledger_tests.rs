//! Integration tests for SqliteFailureLedger.

use edutube_core::HarvesterKind;
use edutube_core::traits::FailureLedger;
use edutube_db::SqliteFailureLedger;

use crate::integration::common::setup_test_db;

/// Test 1: Marking twice keeps the first reason
#[tokio::test]
async fn test_mark_failed_is_idempotent() {
    // Arrange
    let pool = setup_test_db().await;
    let ledger = SqliteFailureLedger::new(pool);

    // Act
    ledger
        .mark_failed(HarvesterKind::Comments, "v1", "commentsDisabled")
        .await
        .unwrap();
    ledger
        .mark_failed(HarvesterKind::Comments, "v1", "videoNotFound")
        .await
        .unwrap();

    // Assert
    let entries = ledger.list(HarvesterKind::Comments).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].item_id, "v1");
    assert_eq!(entries[0].reason, "commentsDisabled");
    assert_eq!(entries[0].harvester, "comments");
}

/// Test 2: Entries are scoped to their harvester
#[tokio::test]
async fn test_ledger_is_per_harvester() {
    // Arrange
    let pool = setup_test_db().await;
    let ledger = SqliteFailureLedger::new(pool);

    // Act
    ledger
        .mark_failed(HarvesterKind::Transcripts, "v1", "transcripts are disabled")
        .await
        .unwrap();

    // Assert
    assert!(ledger.is_failed(HarvesterKind::Transcripts, "v1").await.unwrap());
    assert!(!ledger.is_failed(HarvesterKind::Comments, "v1").await.unwrap());
    assert!(!ledger.is_failed(HarvesterKind::Transcripts, "v2").await.unwrap());
}

/// Test 3: Clearing a harvester makes its items eligible again
#[tokio::test]
async fn test_clear_harvester() {
    // Arrange
    let pool = setup_test_db().await;
    let ledger = SqliteFailureLedger::new(pool);
    for item in ["v1", "v2"] {
        ledger
            .mark_failed(HarvesterKind::Channels, item, "channel not found")
            .await
            .unwrap();
    }
    ledger
        .mark_failed(HarvesterKind::Comments, "v1", "commentsDisabled")
        .await
        .unwrap();

    // Act
    let removed = ledger.clear(HarvesterKind::Channels).await.unwrap();

    // Assert
    assert_eq!(removed, 2);
    assert!(!ledger.is_failed(HarvesterKind::Channels, "v1").await.unwrap());
    assert!(ledger.is_failed(HarvesterKind::Comments, "v1").await.unwrap());
}
