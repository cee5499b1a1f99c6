//! edutube Core - Domain types, the resumable harvester loop and feature preparation.
//!
//! This crate provides the core functionality for edutube, including:
//!
//! - **Harvesting**: [`HarvestService`], one loop shared by every harvester,
//!   with the [`CredentialPool`] for quota rotation and the [`ProgressTracker`]
//!   for resume after interruption
//! - **Error taxonomy**: [`FetchError`] classifies external failures,
//!   [`AppError`] aborts a run
//! - **Feature preparation**: RAKE keyword extraction, the [`EmbeddingService`]
//!   and keyword-balanced training-sample selection
//! - **Traits**: [`Fetcher`], [`FetcherFactory`], [`ResultSink`],
//!   [`FailureLedger`], [`WorkSource`], [`EmbeddingProvider`],
//!   [`EmbeddingStore`] for dependency injection
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging
//!
//! # Architecture
//!
//! Nothing in this crate talks to the network or the database. The YouTube
//! and OpenAI clients live in `edutube-client`, SQLite persistence in
//! `edutube-db`, and `edutube-cli` wires them together.
//!
//! # Example
//!
//! ```ignore
//! use edutube_core::{CredentialPool, HarvestService, HarvesterKind, ProgressTracker, TracingReporter};
//! use tokio_util::sync::CancellationToken;
//!
//! let service = HarvestService::new(
//!     HarvesterKind::Transcripts,
//!     transcript_factory,
//!     transcript_sink,
//!     ledger,
//!     ProgressTracker::new("transcripts_state.json"),
//! );
//! let mut pool = CredentialPool::anonymous();
//! let result = service
//!     .run_with_progress(&worklist, &mut pool, &TracingReporter, CancellationToken::new())
//!     .await?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod credentials;
pub mod embedding;
pub mod error;
pub mod harvest;
pub mod keywords;
pub mod models;
pub mod outcome;
pub mod progress;
pub mod sampling;
pub mod traits;

// Configuration
pub use config::{
    DbConfig, HarvestConfig, HarvesterKind, HttpConfig, PacingConfig, RetryConfig, TuningConfig,
    default_tuning_path, load_credentials, load_keywords, load_tuning_config,
};

// Error handling
pub use error::{AppError, FetchError, FetchErrorKind};

// Harvest state
pub use checkpoint::{ProgressState, ProgressTracker, ResumeContext, ResumePoint};
pub use credentials::{Credential, CredentialPool};
pub use outcome::{HarvestResult, HarvestStats, HarvestStatus, ItemOutcome};

// Domain models
pub use models::{
    ChannelLookup, ChannelRecord, CommentPage, CommentThreadRecord, DatabaseStats, FailedItem,
    ReplyRecord, SampleCandidate, SearchPage, TrainingExample, TranscriptKind, TranscriptRecord,
    VideoEmbedding, VideoLabel, VideoRecord, VideoText,
};

// Progress reporting
pub use progress::{HarvestEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits for dependency injection
pub use traits::{
    EmbeddingProvider, EmbeddingStore, FailureLedger, FetchedPage, Fetcher, FetcherFactory,
    ResultSink, WorkSource,
};

// Services (generic over trait implementations)
pub use embedding::{EmbeddingConfig, EmbeddingService, EmbeddingSummary};
pub use harvest::HarvestService;
pub use keywords::RakeExtractor;
pub use sampling::{SampleConfig, weighted_sample};
