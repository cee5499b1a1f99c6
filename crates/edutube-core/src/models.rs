//! Domain records produced by the harvesters and consumed by the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Videos
// =============================================================================

/// Video metadata from `videos.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub channel_title: Option<String>,
    pub published_at: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub default_audio_language: Option<String>,
    pub default_language: Option<String>,
    /// ISO 8601 duration, e.g. `PT12M3S`.
    pub duration: Option<String>,
    pub definition: Option<String>,
    pub caption: Option<bool>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub paid_product_placement: Option<bool>,
    pub collected_at: DateTime<Utc>,
}

/// One page of keyword search results with full metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub keyword: String,
    pub videos: Vec<VideoRecord>,
}

// =============================================================================
// Transcripts
// =============================================================================

/// How a transcript track was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptKind {
    CreatorUploaded,
    AutoGenerated,
}

impl TranscriptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatorUploaded => "creator-uploaded",
            Self::AutoGenerated => "auto-generated",
        }
    }
}

/// A transcript joined into a single text.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRecord {
    pub video_id: String,
    pub text: String,
    pub kind: TranscriptKind,
    pub translatable: bool,
    /// Language of the stored text.
    pub language_code: String,
    /// Original language when the text was machine-translated.
    pub translated_from: Option<String>,
}

impl TranscriptRecord {
    /// Value stored in the `kind` column.
    ///
    /// ```
    /// # use edutube_core::models::{TranscriptKind, TranscriptRecord};
    /// let record = TranscriptRecord {
    ///     video_id: "v".into(),
    ///     text: "hello".into(),
    ///     kind: TranscriptKind::CreatorUploaded,
    ///     translatable: true,
    ///     language_code: "en".into(),
    ///     translated_from: Some("de".into()),
    /// };
    /// assert_eq!(record.kind_label(), "creator-uploaded (translated from de)");
    /// ```
    pub fn kind_label(&self) -> String {
        match &self.translated_from {
            Some(lang) => format!("{} (translated from {})", self.kind.as_str(), lang),
            None => self.kind.as_str().to_string(),
        }
    }
}

// =============================================================================
// Channels
// =============================================================================

/// Channel metadata and statistics from `channels.list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub channel_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub localized_title: Option<String>,
    pub localized_description: Option<String>,
    pub published_at: Option<String>,
    pub country: Option<String>,
    pub likes_playlist: Option<String>,
    pub uploads_playlist: Option<String>,
    pub view_count: Option<i64>,
    pub subscriber_count: Option<i64>,
    pub video_count: Option<i64>,
    pub fetched_at: DateTime<Utc>,
}

/// A channel resolved from one of its videos.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLookup {
    pub video_id: String,
    pub channel: ChannelRecord,
}

// =============================================================================
// Comments
// =============================================================================

/// Top-level comment of a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentThreadRecord {
    pub thread_id: String,
    pub video_id: String,
    pub text: String,
    pub like_count: i64,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
    pub total_reply_count: i64,
}

/// Reply inside a comment thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyRecord {
    pub reply_id: String,
    pub thread_id: String,
    pub video_id: String,
    pub text: String,
    pub like_count: i64,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
}

/// One page of `commentThreads.list`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentPage {
    pub video_id: String,
    pub threads: Vec<CommentThreadRecord>,
    pub replies: Vec<ReplyRecord>,
}

// =============================================================================
// Feature preparation
// =============================================================================

/// Text fields used to build an embedding input.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoText {
    pub video_id: String,
    pub title: String,
    pub description: Option<String>,
    pub transcript: Option<String>,
}

/// A normalized embedding for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEmbedding {
    pub video_id: String,
    pub model: String,
    pub vector: Vec<f32>,
}

/// A video eligible for the training sample, with the keywords that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCandidate {
    pub video_id: String,
    pub keywords: Vec<String>,
}

/// A training-sample row handed to the labeler.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub video_id: String,
    pub title: String,
    pub description: Option<String>,
    pub transcript: Option<String>,
}

/// Binary label from the chat classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLabel {
    pub video_id: String,
    /// `true` when the video is instructional on a listed topic.
    pub educational: bool,
    pub model: String,
}

// =============================================================================
// Ledger and statistics
// =============================================================================

/// A work item recorded as permanently unrecoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub harvester: String,
    pub item_id: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Row counts across the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub videos: i64,
    pub videos_with_channel: i64,
    pub transcripts: i64,
    pub channels: i64,
    pub comments: i64,
    pub replies: i64,
    pub embeddings: i64,
    pub training_sample: i64,
    pub labels: i64,
    /// Failure-ledger entries per harvester, sorted by harvester name.
    pub failed_items: Vec<(String, i64)>,
}
