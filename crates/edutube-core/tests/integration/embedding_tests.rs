//! Integration tests for EmbeddingService and training-sample selection.

use edutube_core::sampling::keyword_distribution;
use edutube_core::{
    EmbeddingConfig, EmbeddingService, SampleCandidate, SampleConfig, VideoText, weighted_sample,
};
use tokio_util::sync::CancellationToken;

use crate::integration::common::{MockEmbeddingProvider, MockEmbeddingStore};

fn video(id: &str, title: &str) -> VideoText {
    VideoText {
        video_id: id.to_string(),
        title: title.to_string(),
        description: Some("Learn relational databases, normalization and indexing".to_string()),
        transcript: Some("today we build a query planner from scratch".to_string()),
    }
}

/// Test 1: Every pending video is embedded once, in batches capped by the provider.
#[tokio::test]
async fn test_embed_pending_batches_and_normalizes() {
    // Arrange
    let videos: Vec<VideoText> = (0..5)
        .map(|i| video(&format!("v{}", i), "Database Systems"))
        .collect();
    let store = MockEmbeddingStore::with_videos(videos);
    let provider = MockEmbeddingProvider::new(2, 2);
    let config = EmbeddingConfig {
        batch_size: 64,
        ..Default::default()
    };
    let service = EmbeddingService::with_config(store.clone(), provider.clone(), config);

    // Act
    let summary = service
        .embed_pending(CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(summary.pending, 5);
    assert_eq!(summary.embedded, 5);
    assert_eq!(summary.batches, 3);
    assert_eq!(*provider.batch_sizes.lock().unwrap(), vec![2, 2, 1]);

    let stored = store.stored.lock().unwrap();
    assert_eq!(stored.len(), 5);
    for embedding in stored.iter() {
        assert_eq!(embedding.model, "mock-embedding");
        let norm: f32 = embedding.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}

/// Test 2: A second run finds nothing pending for the same model.
#[tokio::test]
async fn test_embed_pending_is_incremental() {
    // Arrange
    let store = MockEmbeddingStore::with_videos(vec![video("v1", "SQL"), video("v2", "NoSQL")]);
    let provider = MockEmbeddingProvider::new(3, 16);
    let service = EmbeddingService::new(store.clone(), provider.clone());
    service
        .embed_pending(CancellationToken::new())
        .await
        .unwrap();

    // Act
    let second = service
        .embed_pending(CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(second.pending, 0);
    assert_eq!(second.embedded, 0);
    assert_eq!(store.stored.lock().unwrap().len(), 2);
}

/// Test 3: Inputs carry the instruction prefix and the title.
#[tokio::test]
async fn test_embedding_input_has_instruction_and_title() {
    // Arrange
    let store = MockEmbeddingStore::with_videos(vec![video("v1", "B-Tree Indexes")]);
    let provider = MockEmbeddingProvider::new(2, 4);
    let service = EmbeddingService::new(store, provider.clone());

    // Act
    service
        .embed_pending(CancellationToken::new())
        .await
        .unwrap();

    // Assert
    let inputs = provider.inputs.lock().unwrap();
    assert_eq!(inputs.len(), 1);
    assert!(inputs[0].starts_with("Instruct: Classify the following video"));
    assert!(inputs[0].contains("Query: Title: B-Tree Indexes\n"));
    assert!(inputs[0].contains("Description Keywords: "));
}

/// Test 4: The sample favors rare keywords and stays reproducible.
#[test]
fn test_weighted_sample_balances_keywords() {
    // Arrange: 90 videos for a popular keyword, 10 for a rare one
    let mut candidates: Vec<SampleCandidate> = (0..90)
        .map(|i| SampleCandidate {
            video_id: format!("popular-{}", i),
            keywords: vec!["python tutorial".to_string()],
        })
        .collect();
    candidates.extend((0..10).map(|i| SampleCandidate {
        video_id: format!("rare-{}", i),
        keywords: vec!["query optimization".to_string()],
    }));
    let config = SampleConfig { size: 20, seed: 42 };

    // Act
    let sample = weighted_sample(&candidates, &config).unwrap();
    let again = weighted_sample(&candidates, &config).unwrap();

    // Assert
    assert_eq!(sample.len(), 20);
    assert_eq!(sample, again);
    let distribution = keyword_distribution(&candidates, &sample);
    // Uniform sampling would draw about 2 rare videos; weighting gives both keywords equal mass
    assert!(distribution.get("query optimization").copied().unwrap_or(0) >= 3);
}
