//! Trait definitions for external dependencies.
//!
//! The harvester loop is written once against these traits and instantiated
//! per harvester with concrete fetchers (edutube-client) and stores
//! (edutube-db). Tests plug in in-memory mocks.
//!
//! # Example
//!
//! ```ignore
//! use edutube_core::{CredentialPool, HarvestService, HarvesterKind, ProgressTracker};
//!
//! let service = HarvestService::new(
//!     HarvesterKind::Comments,
//!     comment_fetcher_factory,
//!     comment_sink,
//!     ledger,
//!     ProgressTracker::new("comments_state.json"),
//! );
//! let mut pool = CredentialPool::new(keys)?;
//! let result = service.run(&worklist, &mut pool).await?;
//! ```

use std::future::Future;

use crate::config::HarvesterKind;
use crate::credentials::Credential;
use crate::error::{AppError, FetchError};
use crate::models::{VideoEmbedding, VideoText};

/// One page of fetched data and the cursor for the next page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage<R> {
    pub record: R,
    pub next_cursor: Option<String>,
}

impl<R> FetchedPage<R> {
    /// A page with nothing after it.
    pub fn last(record: R) -> Self {
        Self {
            record,
            next_cursor: None,
        }
    }

    /// A page followed by `cursor`.
    pub fn with_next(record: R, cursor: impl Into<String>) -> Self {
        Self {
            record,
            next_cursor: Some(cursor.into()),
        }
    }
}

/// Produces the ordered worklist for a harvester.
pub trait WorkSource: Send + Sync {
    /// Returns the full worklist in processing order.
    ///
    /// The order must be stable across runs for resume to be exact.
    fn worklist(&self) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;
}

/// A fixed worklist, e.g. keywords read from a file.
impl WorkSource for Vec<String> {
    async fn worklist(&self) -> Result<Vec<String>, AppError> {
        Ok(self.clone())
    }
}

/// Fetches one unit of work from an external API.
///
/// Implementations classify every failure; the harvester loop decides what
/// to do with it. Calling `fetch` twice for the same item must be safe.
pub trait Fetcher: Send + Sync {
    /// Payload handed to the matching [`ResultSink`].
    type Record: Send + Sync;

    /// Fetches `item`, continuing from `cursor` when the item is paginated.
    fn fetch(
        &self,
        item: &str,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<FetchedPage<Self::Record>, FetchError>> + Send;
}

/// Builds fetchers bound to a credential.
///
/// Separate from [`Fetcher`] because the harvester rebuilds the fetcher after
/// every credential rotation.
pub trait FetcherFactory: Send + Sync {
    type Fetcher: Fetcher;

    fn create(&self, credential: &Credential) -> Result<Self::Fetcher, AppError>;
}

/// Idempotent persistence for fetched records.
pub trait ResultSink: Send + Sync {
    type Record: Send + Sync;

    /// Upserts the records of one fetched page.
    ///
    /// Append-only facts use insert-or-ignore, refreshable facts use
    /// insert-or-replace. Must be durable when the future resolves.
    fn persist(
        &self,
        item: &str,
        record: &Self::Record,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Ledger of permanently failed work items, per harvester.
pub trait FailureLedger: Send + Sync {
    /// Records `item` as permanently failed. Recording it twice is a no-op.
    fn mark_failed(
        &self,
        harvester: HarvesterKind,
        item: &str,
        reason: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Returns true if `item` is already in the ledger for `harvester`.
    fn is_failed(
        &self,
        harvester: HarvesterKind,
        item: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// Provider for generating text embeddings.
pub trait EmbeddingProvider: Send + Sync + Clone {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Model identifier stored next to each vector.
    fn model(&self) -> &str;

    /// Length of the vectors this provider returns.
    fn dimension(&self) -> usize;

    /// Largest batch accepted by a single call.
    fn max_batch_size(&self) -> usize {
        1
    }

    /// Generates an embedding vector for the given text.
    fn generate(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, AppError>> + Send;

    /// Generates embeddings for several texts, in input order.
    ///
    /// The default implementation calls [`generate`](Self::generate) sequentially.
    fn generate_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, AppError>> + Send {
        async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.generate(text).await?);
            }
            Ok(out)
        }
    }
}

/// Store for embedding inputs and results.
pub trait EmbeddingStore: Send + Sync + Clone {
    /// Videos without an embedding for `model`, ordered by video id.
    fn pending_texts(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<VideoText>, AppError>> + Send;

    /// Upserts embeddings, replacing earlier vectors for the same video and model.
    fn store_embeddings(
        &self,
        embeddings: &[VideoEmbedding],
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
