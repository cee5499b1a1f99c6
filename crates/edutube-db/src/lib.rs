//! edutube DB - SQLite persistence for the harvesters
//!
//! This crate provides the repository pattern for everything the harvesters
//! collect and the feature-preparation steps derive.
//!
//! # Overview
//!
//! The main components are:
//! - [`connect`] and [`init_schema`] - connection pool and idempotent schema bootstrap
//! - [`VideoRepository`] - record persistence, worklist queries, embeddings,
//!   training sample and statistics
//! - [`SqliteFailureLedger`] - per-harvester failure ledger
//! - [`sinks`] - `ResultSink` and `WorkSource` adapters for the harvester loop

mod ledger;
mod repository;
mod schema;
pub mod sinks;

pub use ledger::SqliteFailureLedger;
pub use repository::VideoRepository;
pub use schema::{SCHEMA, connect, init_schema};
pub use sinks::{
    ChannelSink, CommentSink, LabelSink, SearchSink, TranscriptSink, VideoQuery, VideoWorklist,
};
