//! edutube Client - HTTP clients for external APIs
//!
//! This crate provides HTTP clients for interacting with:
//!
//! - [`youtube`] - YouTube Data API v3 (search, videos, channels, comment threads)
//! - [`transcript`] - caption tracks through the public player API
//! - [`openai`] - OpenAI embeddings API
//! - [`classifier`] - OpenAI chat completions used as a binary classifier
//!
//! # Overview
//!
//! The clients handle authentication, request building and response parsing.
//! Failures inside a harvest are classified into
//! [`FetchError`](edutube_core::FetchError) by `classify_youtube_error`,
//! `classify_transcript_failure` and `classify_openai_error`; the
//! [`fetchers`] module plugs the clients into the harvester loop.

mod http;

pub mod classifier;
pub mod fetchers;
pub mod openai;
pub mod transcript;
pub mod youtube;

// Re-export main client types
pub use classifier::ChatClassifier;
pub use fetchers::{
    ChannelFetcherFactory, CommentFetcherFactory, LabelFetcherFactory, SearchFetcherFactory,
    TranscriptFetcherFactory, TranscriptMode, YouTubeClientFactory,
};
pub use http::classify_transport_error;
pub use openai::{OpenAIClient, classify_openai_error};
pub use transcript::{TranscriptClient, TranscriptFailure, classify_transcript_failure};
pub use youtube::{ApiRequest, YouTubeClient, classify_youtube_error};
