//! edutube CLI - argument definitions for the `edutube` binary.
//!
//! The binary itself lives in `main.rs`; this library exposes the parsed
//! configuration so it can be tested without spawning a process.

pub mod config;

pub use config::{Command, Config, HarvestArgs, version_info};
