//! `Fetcher` and `FetcherFactory` implementations for every harvester.
//!
//! Each factory turns the active credential into a client; the harvester loop
//! calls `create` again after every rotation.

use std::collections::HashMap;
use std::sync::Arc;

use edutube_core::Credential;
use edutube_core::error::{AppError, FetchError};
use edutube_core::models::{
    ChannelLookup, CommentPage, SearchPage, TrainingExample, TranscriptRecord, VideoLabel,
};
use edutube_core::traits::{FetchedPage, Fetcher, FetcherFactory};

use crate::classifier::{ChatClassifier, DEFAULT_CHAT_MODEL};
use crate::transcript::TranscriptClient;
use crate::youtube::{YOUTUBE_API_BASE, YouTubeClient};

// =============================================================================
// Data API factory
// =============================================================================

/// Builds [`YouTubeClient`]s for the active API key.
#[derive(Debug, Clone)]
pub struct YouTubeClientFactory {
    base_url: String,
}

impl YouTubeClientFactory {
    pub fn new() -> Self {
        Self::with_base_url(YOUTUBE_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
        }
    }

    fn client(&self, credential: &Credential) -> Result<YouTubeClient, AppError> {
        YouTubeClient::with_base_url(credential.secret(), &self.base_url)
    }
}

impl Default for YouTubeClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Search
// =============================================================================

/// Fetches search result pages for a keyword.
pub struct SearchFetcher {
    client: YouTubeClient,
}

impl Fetcher for SearchFetcher {
    type Record = SearchPage;

    async fn fetch(
        &self,
        item: &str,
        cursor: Option<&str>,
    ) -> Result<FetchedPage<SearchPage>, FetchError> {
        self.client.search_page(item, cursor).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchFetcherFactory {
    inner: YouTubeClientFactory,
}

impl SearchFetcherFactory {
    pub fn new(inner: YouTubeClientFactory) -> Self {
        Self { inner }
    }
}

impl FetcherFactory for SearchFetcherFactory {
    type Fetcher = SearchFetcher;

    fn create(&self, credential: &Credential) -> Result<SearchFetcher, AppError> {
        Ok(SearchFetcher {
            client: self.inner.client(credential)?,
        })
    }
}

// =============================================================================
// Channels
// =============================================================================

/// Resolves a video's channel and fetches its metadata.
pub struct ChannelFetcher {
    client: YouTubeClient,
}

impl Fetcher for ChannelFetcher {
    type Record = ChannelLookup;

    async fn fetch(
        &self,
        item: &str,
        _cursor: Option<&str>,
    ) -> Result<FetchedPage<ChannelLookup>, FetchError> {
        let channel_id = self
            .client
            .video_channel_id(item)
            .await?
            .ok_or_else(|| FetchError::permanent(format!("video {} not found", item)))?;

        let channel = self
            .client
            .channel(&channel_id)
            .await?
            .ok_or_else(|| FetchError::permanent(format!("channel {} not found", channel_id)))?;

        Ok(FetchedPage::last(ChannelLookup {
            video_id: item.to_string(),
            channel,
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelFetcherFactory {
    inner: YouTubeClientFactory,
}

impl ChannelFetcherFactory {
    pub fn new(inner: YouTubeClientFactory) -> Self {
        Self { inner }
    }
}

impl FetcherFactory for ChannelFetcherFactory {
    type Fetcher = ChannelFetcher;

    fn create(&self, credential: &Credential) -> Result<ChannelFetcher, AppError> {
        Ok(ChannelFetcher {
            client: self.inner.client(credential)?,
        })
    }
}

// =============================================================================
// Comments
// =============================================================================

/// Fetches comment thread pages for a video.
pub struct CommentFetcher {
    client: YouTubeClient,
}

impl Fetcher for CommentFetcher {
    type Record = CommentPage;

    async fn fetch(
        &self,
        item: &str,
        cursor: Option<&str>,
    ) -> Result<FetchedPage<CommentPage>, FetchError> {
        self.client.comment_page(item, cursor).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommentFetcherFactory {
    inner: YouTubeClientFactory,
}

impl CommentFetcherFactory {
    pub fn new(inner: YouTubeClientFactory) -> Self {
        Self { inner }
    }
}

impl FetcherFactory for CommentFetcherFactory {
    type Fetcher = CommentFetcher;

    fn create(&self, credential: &Credential) -> Result<CommentFetcher, AppError> {
        Ok(CommentFetcher {
            client: self.inner.client(credential)?,
        })
    }
}

// =============================================================================
// Transcripts
// =============================================================================

/// Which tracks the transcript fetcher accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptMode {
    /// English tracks only.
    EnglishOnly,
    /// Any language, machine-translated to English when needed.
    AnyLanguage,
}

/// Fetches one transcript per video.
#[derive(Clone)]
pub struct TranscriptFetcher {
    client: TranscriptClient,
    mode: TranscriptMode,
}

impl Fetcher for TranscriptFetcher {
    type Record = TranscriptRecord;

    async fn fetch(
        &self,
        item: &str,
        _cursor: Option<&str>,
    ) -> Result<FetchedPage<TranscriptRecord>, FetchError> {
        let record = match self.mode {
            TranscriptMode::EnglishOnly => self.client.english_transcript(item).await?,
            TranscriptMode::AnyLanguage => self.client.any_language_transcript(item).await?,
        };
        Ok(FetchedPage::last(record))
    }
}

/// Builds transcript fetchers. The credential is ignored.
#[derive(Clone)]
pub struct TranscriptFetcherFactory {
    client: TranscriptClient,
    mode: TranscriptMode,
}

impl TranscriptFetcherFactory {
    pub fn new(mode: TranscriptMode) -> Result<Self, AppError> {
        Ok(Self::with_client(TranscriptClient::new()?, mode))
    }

    pub fn with_client(client: TranscriptClient, mode: TranscriptMode) -> Self {
        Self { client, mode }
    }

    pub fn mode(&self) -> TranscriptMode {
        self.mode
    }
}

impl FetcherFactory for TranscriptFetcherFactory {
    type Fetcher = TranscriptFetcher;

    fn create(&self, _credential: &Credential) -> Result<TranscriptFetcher, AppError> {
        Ok(TranscriptFetcher {
            client: self.client.clone(),
            mode: self.mode,
        })
    }
}

// =============================================================================
// Labels
// =============================================================================

/// Labels training-sample videos with the chat classifier.
pub struct LabelFetcher {
    classifier: ChatClassifier,
    examples: Arc<HashMap<String, TrainingExample>>,
}

impl Fetcher for LabelFetcher {
    type Record = VideoLabel;

    async fn fetch(
        &self,
        item: &str,
        _cursor: Option<&str>,
    ) -> Result<FetchedPage<VideoLabel>, FetchError> {
        let example = self.examples.get(item).ok_or_else(|| {
            FetchError::permanent(format!("{} is not in the training sample", item))
        })?;
        let label = self.classifier.classify(example).await?;
        Ok(FetchedPage::last(label))
    }
}

/// Builds label fetchers for the active OpenAI key.
#[derive(Clone)]
pub struct LabelFetcherFactory {
    model: String,
    endpoint: Option<String>,
    keywords: Vec<String>,
    examples: Arc<HashMap<String, TrainingExample>>,
}

impl LabelFetcherFactory {
    pub fn new(examples: Vec<TrainingExample>, keywords: Vec<String>) -> Self {
        Self::with_model(examples, keywords, DEFAULT_CHAT_MODEL, None)
    }

    pub fn with_model(
        examples: Vec<TrainingExample>,
        keywords: Vec<String>,
        model: &str,
        endpoint: Option<&str>,
    ) -> Self {
        let examples = examples
            .into_iter()
            .map(|e| (e.video_id.clone(), e))
            .collect();
        Self {
            model: model.to_string(),
            endpoint: endpoint.map(str::to_string),
            keywords,
            examples: Arc::new(examples),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ids of the examples this factory can label, sorted.
    pub fn example_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.examples.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl FetcherFactory for LabelFetcherFactory {
    type Fetcher = LabelFetcher;

    fn create(&self, credential: &Credential) -> Result<LabelFetcher, AppError> {
        let classifier = ChatClassifier::with_config(
            credential.secret(),
            &self.model,
            self.endpoint.as_deref(),
            self.keywords.clone(),
        )?;
        Ok(LabelFetcher {
            classifier,
            examples: Arc::clone(&self.examples),
        })
    }
}
