//! Durable progress cursor for resumable harvests.
//!
//! The progress file is a small JSON document rewritten in full after every
//! unit of work:
//!
//! ```json
//! {
//!   "last_completed_position": 41,
//!   "last_completed_item": "dQw4w9WgXcQ",
//!   "nextPageToken": "CDIQAA",
//!   "keyword": "SQL join",
//!   "updated_at": "2026-10-19T08:00:00Z"
//! }
//! ```
//!
//! Writes go to a sibling temp file that is synced and renamed over the
//! target, so a crash mid-write leaves either the old or the new state.
//! A missing file means "start from the beginning".

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Where to continue inside a partially processed item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeContext {
    /// Page token to request next for `current_item`.
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
    /// The item the page token belongs to.
    #[serde(rename = "keyword", default)]
    pub current_item: Option<String>,
}

impl ResumeContext {
    pub fn page(item: &str, token: &str) -> Self {
        Self {
            next_page_token: Some(token.to_string()),
            current_item: Some(item.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.next_page_token.is_none() && self.current_item.is_none()
    }
}

/// Snapshot of harvest progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Index of the last fully persisted item, `-1` when nothing is done.
    pub last_completed_position: i64,
    /// Identifier of that item, used to re-anchor when the worklist changed.
    #[serde(default)]
    pub last_completed_item: Option<String>,
    #[serde(flatten)]
    pub context: ResumeContext,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Where a run starts, derived from a [`ProgressState`] and the current worklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    /// First worklist index to process.
    pub start: usize,
    /// Page token for the item at `start`, if it was interrupted mid-pagination.
    pub cursor: Option<String>,
}

impl ProgressState {
    pub fn initial() -> Self {
        Self {
            last_completed_position: -1,
            last_completed_item: None,
            context: ResumeContext::default(),
            updated_at: None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.last_completed_position < 0 && self.context.is_empty()
    }

    /// Computes the resume point against `worklist`.
    ///
    /// The stored position is trusted when the item recorded with it still sits
    /// there. Otherwise the item is looked up by id and the run continues right
    /// after it; if it is gone the run restarts from the beginning, which is
    /// safe because every sink write is idempotent.
    pub fn resume_point(&self, worklist: &[String]) -> ResumePoint {
        let start = match (&self.last_completed_item, self.last_completed_position) {
            (_, pos) if pos < 0 => 0,
            (None, pos) => pos as usize + 1,
            (Some(item), pos) => {
                let pos = pos as usize;
                if worklist.get(pos) == Some(item) {
                    pos + 1
                } else if let Some(found) = worklist.iter().position(|w| w == item) {
                    tracing::warn!(
                        item = %item,
                        stored_position = pos,
                        new_position = found,
                        "Worklist changed since last run, re-anchored on last completed item"
                    );
                    found + 1
                } else {
                    tracing::warn!(
                        item = %item,
                        "Last completed item no longer in worklist, starting from the beginning"
                    );
                    0
                }
            }
        };

        let cursor = match (&self.context.current_item, &self.context.next_page_token) {
            (Some(item), Some(token)) if worklist.get(start) == Some(item) => Some(token.clone()),
            _ => None,
        };

        ResumePoint { start, cursor }
    }
}

/// File-backed progress cursor for one harvester.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    path: PathBuf,
}

impl ProgressTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if a progress file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the progress file, or returns the initial state if there is none.
    ///
    /// A corrupt file is an error rather than a fresh start, so nothing is
    /// silently reprocessed or overwritten.
    pub fn load(&self) -> Result<ProgressState, AppError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProgressState::initial());
            }
            Err(e) => {
                return Err(AppError::ProgressFileError(format!(
                    "cannot read '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            AppError::ProgressFileError(format!(
                "'{}' is not a valid progress file: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Rewrites the progress file with `state`.
    pub fn save(&self, state: &ProgressState) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.tmp_path();

        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };

        write().map_err(|e| {
            AppError::ProgressFileError(format!("cannot write '{}': {}", self.path.display(), e))
        })
    }

    /// Records `position` as the last completed index.
    ///
    /// Must only be called after the sink write for that position returned.
    /// `position` is `-1` when the first item is still in progress and
    /// `context` carries its page token.
    pub fn advance(
        &self,
        position: i64,
        item: Option<&str>,
        context: ResumeContext,
    ) -> Result<ProgressState, AppError> {
        let state = ProgressState {
            last_completed_position: position,
            last_completed_item: item.map(str::to_string),
            context,
            updated_at: Some(Utc::now()),
        };
        self.save(&state)?;
        Ok(state)
    }

    /// Deletes the progress file once the worklist is drained.
    pub fn clear(&self) -> Result<(), AppError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::ProgressFileError(format!(
                "cannot remove '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
