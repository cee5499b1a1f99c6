//! Test utilities for integration tests.
//!
//! Provides an in-memory SQLite database with the full schema, plus sample
//! records for each harvester.

use chrono::Utc;
use edutube_core::models::{
    ChannelLookup, ChannelRecord, CommentPage, CommentThreadRecord, ReplyRecord, SearchPage,
    TranscriptKind, TranscriptRecord, VideoRecord,
};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Opens a fresh in-memory database and creates the schema.
///
/// An in-memory database lives as long as its connection, so the pool is
/// pinned to a single connection that is never recycled.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    edutube_db::init_schema(&pool)
        .await
        .expect("Failed to initialize schema");

    pool
}

/// A video as returned by the search harvester.
pub fn sample_video(id: &str) -> VideoRecord {
    VideoRecord {
        video_id: id.to_string(),
        title: format!("Video {}", id),
        channel_title: Some("DB Academy".to_string()),
        published_at: Some("2023-05-01T12:00:00Z".to_string()),
        description: Some(format!("Description for {}", id)),
        tags: vec!["sql".to_string(), "databases".to_string()],
        default_audio_language: Some("en".to_string()),
        default_language: None,
        duration: Some("PT10M".to_string()),
        definition: Some("hd".to_string()),
        caption: Some(true),
        view_count: Some(1000),
        like_count: Some(50),
        comment_count: Some(7),
        paid_product_placement: Some(false),
        collected_at: Utc::now(),
    }
}

/// A search page for `keyword` containing `ids`.
pub fn search_page(keyword: &str, ids: &[&str]) -> SearchPage {
    SearchPage {
        keyword: keyword.to_string(),
        videos: ids.iter().map(|id| sample_video(id)).collect(),
    }
}

pub fn sample_transcript(id: &str) -> TranscriptRecord {
    TranscriptRecord {
        video_id: id.to_string(),
        text: format!("transcript of {}", id),
        kind: TranscriptKind::AutoGenerated,
        translatable: true,
        language_code: "en".to_string(),
        translated_from: None,
    }
}

pub fn sample_channel(video_id: &str, channel_id: &str, subscribers: i64) -> ChannelLookup {
    ChannelLookup {
        video_id: video_id.to_string(),
        channel: ChannelRecord {
            channel_id: channel_id.to_string(),
            title: Some("DB Academy".to_string()),
            description: Some("Databases explained".to_string()),
            localized_title: None,
            localized_description: None,
            published_at: Some("2015-01-01T00:00:00Z".to_string()),
            country: Some("US".to_string()),
            likes_playlist: None,
            uploads_playlist: Some(format!("UU{}", channel_id)),
            view_count: Some(100_000),
            subscriber_count: Some(subscribers),
            video_count: Some(42),
            fetched_at: Utc::now(),
        },
    }
}

/// A comment page with one thread per id and one reply on the first thread.
pub fn comment_page(video_id: &str, thread_ids: &[&str]) -> CommentPage {
    let threads: Vec<CommentThreadRecord> = thread_ids
        .iter()
        .map(|id| CommentThreadRecord {
            thread_id: id.to_string(),
            video_id: video_id.to_string(),
            text: format!("comment {}", id),
            like_count: 1,
            published_at: None,
            updated_at: None,
            total_reply_count: 1,
        })
        .collect();
    let replies = thread_ids
        .first()
        .map(|id| ReplyRecord {
            reply_id: format!("{}.r1", id),
            thread_id: id.to_string(),
            video_id: video_id.to_string(),
            text: "reply".to_string(),
            like_count: 0,
            published_at: None,
            updated_at: None,
        })
        .into_iter()
        .collect();

    CommentPage {
        video_id: video_id.to_string(),
        threads,
        replies,
    }
}

/// Counts rows in `table`.
pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count query should succeed")
}
