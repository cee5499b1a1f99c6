//! Persistence sinks and worklists for the harvesters.
//!
//! Each sink adapts one [`VideoRepository`] write to [`ResultSink`]; each
//! worklist adapts one ordered query to [`WorkSource`].

use edutube_core::error::AppError;
use edutube_core::models::{ChannelLookup, CommentPage, SearchPage, TranscriptRecord, VideoLabel};
use edutube_core::traits::{ResultSink, WorkSource};

use crate::repository::VideoRepository;

/// Videos and keyword links from search pages.
#[derive(Clone)]
pub struct SearchSink {
    repo: VideoRepository,
}

impl SearchSink {
    pub fn new(repo: VideoRepository) -> Self {
        Self { repo }
    }
}

impl ResultSink for SearchSink {
    type Record = SearchPage;

    async fn persist(&self, _item: &str, page: &SearchPage) -> Result<(), AppError> {
        self.repo.insert_search_page(page).await?;
        Ok(())
    }
}

/// Transcripts, insert-or-ignore.
#[derive(Clone)]
pub struct TranscriptSink {
    repo: VideoRepository,
}

impl TranscriptSink {
    pub fn new(repo: VideoRepository) -> Self {
        Self { repo }
    }
}

impl ResultSink for TranscriptSink {
    type Record = TranscriptRecord;

    async fn persist(&self, _item: &str, record: &TranscriptRecord) -> Result<(), AppError> {
        self.repo.insert_transcript(record).await?;
        Ok(())
    }
}

/// Channel rows, insert-or-replace, plus the video link.
#[derive(Clone)]
pub struct ChannelSink {
    repo: VideoRepository,
}

impl ChannelSink {
    pub fn new(repo: VideoRepository) -> Self {
        Self { repo }
    }
}

impl ResultSink for ChannelSink {
    type Record = ChannelLookup;

    async fn persist(&self, _item: &str, lookup: &ChannelLookup) -> Result<(), AppError> {
        self.repo.upsert_channel(lookup).await?;
        Ok(())
    }
}

/// Comment threads and replies, one page per call.
#[derive(Clone)]
pub struct CommentSink {
    repo: VideoRepository,
}

impl CommentSink {
    pub fn new(repo: VideoRepository) -> Self {
        Self { repo }
    }
}

impl ResultSink for CommentSink {
    type Record = CommentPage;

    async fn persist(&self, _item: &str, page: &CommentPage) -> Result<(), AppError> {
        self.repo.insert_comment_page(page).await?;
        Ok(())
    }
}

/// Classifier labels, first label wins.
#[derive(Clone)]
pub struct LabelSink {
    repo: VideoRepository,
}

impl LabelSink {
    pub fn new(repo: VideoRepository) -> Self {
        Self { repo }
    }
}

impl ResultSink for LabelSink {
    type Record = VideoLabel;

    async fn persist(&self, _item: &str, label: &VideoLabel) -> Result<(), AppError> {
        self.repo.insert_label(label).await?;
        Ok(())
    }
}

/// Ordered worklist queries backed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuery {
    /// Every video.
    All,
    /// Videos without a transcript and not given up by the supplement pass.
    MissingTranscript,
    /// Videos whose channel is unresolved.
    MissingChannel,
    /// Training-sample videos without a label.
    UnlabeledSample,
}

/// A worklist of video ids read from the store at run start.
#[derive(Clone)]
pub struct VideoWorklist {
    repo: VideoRepository,
    query: VideoQuery,
}

impl VideoWorklist {
    pub fn new(repo: VideoRepository, query: VideoQuery) -> Self {
        Self { repo, query }
    }
}

impl WorkSource for VideoWorklist {
    async fn worklist(&self) -> Result<Vec<String>, AppError> {
        match self.query {
            VideoQuery::All => self.repo.all_video_ids().await,
            VideoQuery::MissingTranscript => self.repo.videos_missing_transcript().await,
            VideoQuery::MissingChannel => self.repo.videos_missing_channel().await,
            VideoQuery::UnlabeledSample => self.repo.unlabeled_sample_ids().await,
        }
    }
}
