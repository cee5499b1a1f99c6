//! Integration tests for VideoRepository and the harvester sinks.

use edutube_core::models::{VideoEmbedding, VideoLabel};
use edutube_core::traits::{EmbeddingStore, FailureLedger, ResultSink, WorkSource};
use edutube_core::HarvesterKind;
use edutube_db::{
    ChannelSink, CommentSink, SearchSink, SqliteFailureLedger, TranscriptSink, VideoQuery,
    VideoRepository, VideoWorklist,
};

use crate::integration::common::{
    comment_page, count, sample_channel, sample_transcript, search_page, setup_test_db,
};

/// Test 1: Search pages insert videos once and link every keyword
#[tokio::test]
async fn test_search_sink_is_idempotent() {
    // Arrange
    let pool = setup_test_db().await;
    let repo = VideoRepository::new(pool.clone());
    let sink = SearchSink::new(repo.clone());

    // Act
    sink.persist("sql join", &search_page("sql join", &["v1", "v2"]))
        .await
        .unwrap();
    sink.persist("sql join", &search_page("sql join", &["v1", "v2"]))
        .await
        .unwrap();
    sink.persist("data mining", &search_page("data mining", &["v2", "v3"]))
        .await
        .unwrap();

    // Assert
    assert_eq!(count(&pool, "videos").await, 3);
    assert_eq!(count(&pool, "video_keywords").await, 4);

    let tags: String = sqlx::query_scalar("SELECT tags FROM videos WHERE video_id = 'v1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tags, "sql,databases");
}

/// Test 2: A second transcript for the same video is ignored
#[tokio::test]
async fn test_transcript_insert_or_ignore() {
    // Arrange
    let pool = setup_test_db().await;
    let repo = VideoRepository::new(pool.clone());
    let first = sample_transcript("v1");
    let mut second = sample_transcript("v1");
    second.text = "different text".to_string();

    // Act
    let inserted_first = repo.insert_transcript(&first).await.unwrap();
    let inserted_second = repo.insert_transcript(&second).await.unwrap();

    // Assert
    assert!(inserted_first);
    assert!(!inserted_second);
    let (text, kind): (String, String) =
        sqlx::query_as("SELECT transcript, kind FROM transcripts WHERE video_id = 'v1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(text, "transcript of v1");
    assert_eq!(kind, "auto-generated");
}

/// Test 3: Translated transcripts keep the source language and labelled kind
#[tokio::test]
async fn test_translated_transcript_kind() {
    // Arrange
    let pool = setup_test_db().await;
    let sink = TranscriptSink::new(VideoRepository::new(pool.clone()));
    let mut record = sample_transcript("v9");
    record.translated_from = Some("de".to_string());

    // Act
    sink.persist("v9", &record).await.unwrap();

    // Assert
    let (kind, source): (String, String) = sqlx::query_as(
        "SELECT kind, source_language FROM transcripts WHERE video_id = 'v9'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(kind, "auto-generated (translated from de)");
    assert_eq!(source, "de");
}

/// Test 4: Channels are replaced on refetch and linked to the video
#[tokio::test]
async fn test_channel_sink_replaces_and_links() {
    // Arrange
    let pool = setup_test_db().await;
    let repo = VideoRepository::new(pool.clone());
    repo.insert_search_page(&search_page("sql", &["v1", "v2"]))
        .await
        .unwrap();
    let sink = ChannelSink::new(repo.clone());

    // Act
    sink.persist("v1", &sample_channel("v1", "UC1", 100))
        .await
        .unwrap();
    sink.persist("v2", &sample_channel("v2", "UC1", 250))
        .await
        .unwrap();

    // Assert
    assert_eq!(count(&pool, "channels").await, 1);
    let subscribers: i64 =
        sqlx::query_scalar("SELECT subscriber_count FROM channels WHERE channel_id = 'UC1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(subscribers, 250);
    assert!(repo.videos_missing_channel().await.unwrap().is_empty());
}

/// Test 5: Comment pages are idempotent across re-fetches
#[tokio::test]
async fn test_comment_sink_is_idempotent() {
    // Arrange
    let pool = setup_test_db().await;
    let sink = CommentSink::new(VideoRepository::new(pool.clone()));

    // Act
    sink.persist("v1", &comment_page("v1", &["t1", "t2"]))
        .await
        .unwrap();
    sink.persist("v1", &comment_page("v1", &["t2", "t3"]))
        .await
        .unwrap();

    // Assert
    assert_eq!(count(&pool, "comments").await, 3);
    assert_eq!(count(&pool, "replies").await, 2);
}

/// Test 6: Worklists are ordered by video id
#[tokio::test]
async fn test_worklists_are_ordered() {
    // Arrange
    let pool = setup_test_db().await;
    let repo = VideoRepository::new(pool.clone());
    repo.insert_search_page(&search_page("sql", &["c", "a", "b"]))
        .await
        .unwrap();
    repo.upsert_channel(&sample_channel("b", "UC1", 1))
        .await
        .unwrap();

    // Act
    let all = VideoWorklist::new(repo.clone(), VideoQuery::All)
        .worklist()
        .await
        .unwrap();
    let missing_channel = VideoWorklist::new(repo.clone(), VideoQuery::MissingChannel)
        .worklist()
        .await
        .unwrap();

    // Assert
    assert_eq!(all, vec!["a", "b", "c"]);
    assert_eq!(missing_channel, vec!["a", "c"]);
}

/// Test 7: The supplement worklist skips transcribed and given-up videos
#[tokio::test]
async fn test_missing_transcript_worklist() {
    // Arrange
    let pool = setup_test_db().await;
    let repo = VideoRepository::new(pool.clone());
    let ledger = SqliteFailureLedger::new(pool.clone());
    repo.insert_search_page(&search_page("sql", &["v1", "v2", "v3", "v4"]))
        .await
        .unwrap();
    repo.insert_transcript(&sample_transcript("v1")).await.unwrap();
    ledger
        .mark_failed(HarvesterKind::SupplementTranscripts, "v2", "no transcript")
        .await
        .unwrap();
    // A failure of the English pass does not exclude the video here
    ledger
        .mark_failed(HarvesterKind::Transcripts, "v3", "no English transcript")
        .await
        .unwrap();

    // Act
    let worklist = VideoWorklist::new(repo, VideoQuery::MissingTranscript)
        .worklist()
        .await
        .unwrap();

    // Assert
    assert_eq!(worklist, vec!["v3", "v4"]);
}

/// Test 8: Embedding store returns only videos pending for the model
#[tokio::test]
async fn test_embedding_store_pending_and_roundtrip() {
    // Arrange
    let pool = setup_test_db().await;
    let repo = VideoRepository::new(pool.clone());
    repo.insert_search_page(&search_page("sql", &["v1", "v2", "v3"]))
        .await
        .unwrap();
    repo.insert_transcript(&sample_transcript("v2")).await.unwrap();

    // Act
    repo.store_embeddings(&[VideoEmbedding {
        video_id: "v1".to_string(),
        model: "m1".to_string(),
        vector: vec![0.6, 0.8],
    }])
    .await
    .unwrap();
    let pending_m1 = repo.pending_texts("m1", None).await.unwrap();
    let pending_m2 = repo.pending_texts("m2", Some(2)).await.unwrap();

    // Assert
    let ids: Vec<&str> = pending_m1.iter().map(|v| v.video_id.as_str()).collect();
    assert_eq!(ids, vec!["v2", "v3"]);
    assert_eq!(pending_m1[0].transcript.as_deref(), Some("transcript of v2"));
    assert!(pending_m1[1].transcript.is_none());
    assert_eq!(pending_m2.len(), 2);
    assert_eq!(
        repo.get_embedding("v1", "m1").await.unwrap(),
        Some(vec![0.6, 0.8])
    );
}

/// Test 9: Sample candidates need a transcript and no manual label
#[tokio::test]
async fn test_sample_candidates() {
    // Arrange
    let pool = setup_test_db().await;
    let repo = VideoRepository::new(pool.clone());
    repo.insert_search_page(&search_page("sql join", &["v1", "v2", "v3"]))
        .await
        .unwrap();
    repo.insert_search_page(&search_page("data mining", &["v1"]))
        .await
        .unwrap();
    for id in ["v1", "v2", "v3"] {
        repo.insert_transcript(&sample_transcript(id)).await.unwrap();
    }
    sqlx::query("INSERT INTO manual_labels (video_id, label) VALUES ('v3', 1)")
        .execute(&pool)
        .await
        .unwrap();

    // Act
    let candidates = repo.sample_candidates().await.unwrap();

    // Assert
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].video_id, "v1");
    assert_eq!(candidates[0].keywords, vec!["data mining", "sql join"]);
    assert_eq!(candidates[1].keywords, vec!["sql join"]);
}

/// Test 10: The training sample keeps the order it was stored in and feeds the label worklist
#[tokio::test]
async fn test_training_sample_and_labels() {
    // Arrange
    let pool = setup_test_db().await;
    let repo = VideoRepository::new(pool.clone());
    repo.insert_search_page(&search_page("sql", &["v1", "v2", "v3"]))
        .await
        .unwrap();
    repo.insert_transcript(&sample_transcript("v2")).await.unwrap();
    assert!(!repo.training_sample_exists().await.unwrap());

    // Act
    repo.replace_training_sample(&["v3".to_string(), "v2".to_string()])
        .await
        .unwrap();
    repo.insert_label(&VideoLabel {
        video_id: "v2".to_string(),
        educational: true,
        model: "gpt-4o".to_string(),
    })
    .await
    .unwrap();

    // Assert
    assert!(repo.training_sample_exists().await.unwrap());
    let examples = repo.training_examples().await.unwrap();
    assert_eq!(examples[0].video_id, "v3");
    assert_eq!(examples[1].transcript.as_deref(), Some("transcript of v2"));
    assert_eq!(repo.unlabeled_sample_ids().await.unwrap(), vec!["v3"]);

    repo.replace_training_sample(&["v1".to_string()])
        .await
        .unwrap();
    assert_eq!(count(&pool, "training_sample").await, 1);
}

/// Test 11: Stats count every table and ledger entries per harvester
#[tokio::test]
async fn test_get_stats() {
    // Arrange
    let pool = setup_test_db().await;
    let repo = VideoRepository::new(pool.clone());
    let ledger = SqliteFailureLedger::new(pool.clone());
    repo.insert_search_page(&search_page("sql", &["v1", "v2"]))
        .await
        .unwrap();
    repo.insert_comment_page(&comment_page("v1", &["t1"]))
        .await
        .unwrap();
    ledger
        .mark_failed(HarvesterKind::Comments, "v2", "commentsDisabled")
        .await
        .unwrap();
    ledger
        .mark_failed(HarvesterKind::Channels, "v2", "video not found")
        .await
        .unwrap();

    // Act
    let stats = repo.get_stats().await.unwrap();

    // Assert
    assert_eq!(stats.videos, 2);
    assert_eq!(stats.videos_with_channel, 0);
    assert_eq!(stats.comments, 1);
    assert_eq!(stats.replies, 1);
    assert_eq!(
        stats.failed_items,
        vec![("channels".to_string(), 1), ("comments".to_string(), 1)]
    );
}
