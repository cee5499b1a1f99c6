//! Configuration types for edutube components.
//!
//! Defaults mirror the pacing the harvesters were tuned with against the
//! YouTube quotas. Every value can be overridden from an optional TOML file
//! (`~/.config/edutube/harvest.toml`), and the CLI layers flags on top.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

// =============================================================================
// Harvester kinds
// =============================================================================

/// The harvester instantiations shipped with edutube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HarvesterKind {
    /// Keyword search and video metadata collection.
    Search,
    /// English transcript retrieval.
    Transcripts,
    /// Second pass over videos without a transcript, any language.
    SupplementTranscripts,
    /// Channel metadata and statistics.
    Channels,
    /// Comment threads and replies.
    Comments,
    /// Chat-model labeling of the training sample.
    Labels,
}

impl HarvesterKind {
    pub const ALL: [HarvesterKind; 6] = [
        Self::Search,
        Self::Transcripts,
        Self::SupplementTranscripts,
        Self::Channels,
        Self::Comments,
        Self::Labels,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Transcripts => "transcripts",
            Self::SupplementTranscripts => "supplement_transcripts",
            Self::Channels => "channels",
            Self::Comments => "comments",
            Self::Labels => "labels",
        }
    }

    /// Default progress file name for this harvester.
    pub fn state_file_name(&self) -> String {
        format!("{}_state.json", self.as_str())
    }
}

impl fmt::Display for HarvesterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HarvesterKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.to_lowercase().replace('-', "_"))
            .ok_or_else(|| {
                AppError::ConfigError(format!(
                    "Unknown harvester: '{}'. Valid options: search, transcripts, supplement_transcripts, channels, comments, labels",
                    s
                ))
            })
    }
}

// =============================================================================
// Runtime configuration
// =============================================================================

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// HTTP client configuration for external API calls.
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("edutube/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Retry policy for transient fetch failures.
///
/// `max_attempts` counts calls, not retries: with 3 attempts a permanently
/// flaky item is fetched three times with two backoff sleeps in between.
/// Quota rotations are not counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Wait after a generic transient failure.
    pub backoff: Duration,
    /// Wait after a connection reset.
    pub network_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(60),
            network_backoff: Duration::from_secs(5),
        }
    }
}

/// Throttling applied between work items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingConfig {
    /// Lower bound of the random delay after every item.
    pub jitter_min: Duration,
    /// Upper bound of the random delay after every item.
    pub jitter_max: Duration,
    /// Delay between pages of a paginated item.
    pub page_delay: Duration,
    /// Number of items between long pauses. `None` disables the pause.
    pub batch_size: Option<usize>,
    /// Length of the long pause.
    pub batch_pause: Duration,
}

impl PacingConfig {
    /// No delays at all. Used by tests and dry runs.
    pub fn none() -> Self {
        Self {
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            page_delay: Duration::ZERO,
            batch_size: None,
            batch_pause: Duration::ZERO,
        }
    }

    /// Tuned defaults for each harvester.
    pub fn for_kind(kind: HarvesterKind) -> Self {
        let secs = Duration::from_secs;
        match kind {
            HarvesterKind::Search => Self {
                jitter_min: secs(1),
                jitter_max: secs(2),
                page_delay: secs(1),
                batch_size: None,
                batch_pause: Duration::ZERO,
            },
            HarvesterKind::Transcripts | HarvesterKind::SupplementTranscripts => Self {
                jitter_min: secs(1),
                jitter_max: secs(5),
                page_delay: Duration::ZERO,
                batch_size: Some(100),
                batch_pause: secs(300),
            },
            HarvesterKind::Channels => Self {
                jitter_min: secs(1),
                jitter_max: secs(2),
                page_delay: Duration::ZERO,
                batch_size: None,
                batch_pause: Duration::ZERO,
            },
            HarvesterKind::Comments => Self {
                jitter_min: secs(1),
                jitter_max: secs(3),
                page_delay: Duration::from_millis(500),
                batch_size: None,
                batch_pause: Duration::ZERO,
            },
            HarvesterKind::Labels => Self {
                jitter_min: secs(3),
                jitter_max: secs(3),
                page_delay: Duration::ZERO,
                batch_size: None,
                batch_pause: Duration::ZERO,
            },
        }
    }

    /// Returns true if the long pause is due after `completed` items.
    pub fn batch_pause_due(&self, completed: usize) -> bool {
        match self.batch_size {
            Some(size) if size > 0 => completed > 0 && completed % size == 0,
            _ => false,
        }
    }
}

/// Harvester loop configuration.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub retry: RetryConfig,
    pub pacing: PacingConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            pacing: PacingConfig::none(),
        }
    }
}

impl HarvestConfig {
    /// Default retry policy with the tuned pacing for `kind`.
    pub fn for_kind(kind: HarvesterKind) -> Self {
        Self {
            retry: RetryConfig::default(),
            pacing: PacingConfig::for_kind(kind),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Applies overrides from a tuning file, if one was loaded.
    pub fn with_tuning(mut self, kind: HarvesterKind, tuning: Option<&TuningConfig>) -> Self {
        if let Some(tuning) = tuning {
            tuning.retry.apply(&mut self.retry);
            if let Some(section) = tuning.pacing.get(kind.as_str()) {
                section.apply(&mut self.pacing);
            }
        }
        self
    }
}

// =============================================================================
// Tuning file (harvest.toml)
// =============================================================================

/// Optional overrides read from `harvest.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningConfig {
    #[serde(default)]
    pub retry: RetrySection,
    /// Keyed by harvester name, e.g. `[pacing.transcripts]`.
    #[serde(default)]
    pub pacing: BTreeMap<String, PacingSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub backoff_secs: Option<u64>,
    pub network_backoff_secs: Option<u64>,
}

impl RetrySection {
    fn apply(&self, retry: &mut RetryConfig) {
        if let Some(n) = self.max_attempts {
            retry.max_attempts = n.max(1);
        }
        if let Some(secs) = self.backoff_secs {
            retry.backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = self.network_backoff_secs {
            retry.network_backoff = Duration::from_secs(secs);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PacingSection {
    pub jitter_min_ms: Option<u64>,
    pub jitter_max_ms: Option<u64>,
    pub page_delay_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub batch_pause_secs: Option<u64>,
}

impl PacingSection {
    fn apply(&self, pacing: &mut PacingConfig) {
        if let Some(ms) = self.jitter_min_ms {
            pacing.jitter_min = Duration::from_millis(ms);
        }
        if let Some(ms) = self.jitter_max_ms {
            pacing.jitter_max = Duration::from_millis(ms);
        }
        if pacing.jitter_max < pacing.jitter_min {
            pacing.jitter_max = pacing.jitter_min;
        }
        if let Some(ms) = self.page_delay_ms {
            pacing.page_delay = Duration::from_millis(ms);
        }
        if let Some(size) = self.batch_size {
            pacing.batch_size = (size > 0).then_some(size);
        }
        if let Some(secs) = self.batch_pause_secs {
            pacing.batch_pause = Duration::from_secs(secs);
        }
    }
}

/// Default tuning file name.
pub const TUNING_FILE_NAME: &str = "harvest.toml";

/// Returns the default configuration directory: `~/.config/edutube/`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("edutube"))
}

/// Returns the default tuning file path: `~/.config/edutube/harvest.toml`.
pub fn default_tuning_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(TUNING_FILE_NAME))
}

/// Load tuning overrides from a TOML file.
///
/// # Returns
/// * `Ok(Some(config))` - overrides loaded
/// * `Ok(None)` - no path given and no file at the default location
/// * `Err(e)` - an explicit path is missing, or the file is invalid
pub fn load_tuning_config(path: Option<PathBuf>) -> Result<Option<TuningConfig>, AppError> {
    let explicit = path.is_some();
    let config_path = match path.or_else(default_tuning_path) {
        Some(p) => p,
        None => return Ok(None),
    };

    if !config_path.exists() {
        if explicit {
            return Err(AppError::ConfigError(format!(
                "Tuning file not found: {}",
                config_path.display()
            )));
        }
        return Ok(None);
    }

    let content = read_config_file(&config_path)?;
    let config: TuningConfig = toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    tracing::debug!(path = %config_path.display(), "Loaded tuning overrides");
    Ok(Some(config))
}

// =============================================================================
// Credential and keyword files
// =============================================================================

#[derive(Deserialize)]
struct CredentialsFile {
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct KeywordsFile {
    keywords: Vec<String>,
}

/// Loads the ordered credential list from `{"keys": [...]}`.
///
/// Blank entries are rejected rather than skipped so that key positions in
/// the logs match positions in the file.
pub fn load_credentials(path: &Path) -> Result<Vec<String>, AppError> {
    let content = read_config_file(path)?;
    let file: CredentialsFile = serde_json::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid credential file '{}': {}",
            path.display(),
            e
        ))
    })?;

    if file.keys.is_empty() {
        return Err(AppError::ConfigError(format!(
            "Credential file '{}' contains no keys",
            path.display()
        )));
    }
    if let Some(pos) = file.keys.iter().position(|k| k.trim().is_empty()) {
        return Err(AppError::ConfigError(format!(
            "Credential file '{}' has a blank key at position {}",
            path.display(),
            pos
        )));
    }

    Ok(file.keys.into_iter().map(|k| k.trim().to_string()).collect())
}

/// Loads the ordered keyword list from `{"keywords": [...]}`.
pub fn load_keywords(path: &Path) -> Result<Vec<String>, AppError> {
    let content = read_config_file(path)?;
    let file: KeywordsFile = serde_json::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!("Invalid keyword file '{}': {}", path.display(), e))
    })?;

    let keywords: Vec<String> = file
        .keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    if keywords.is_empty() {
        return Err(AppError::ConfigError(format!(
            "Keyword file '{}' contains no keywords",
            path.display()
        )));
    }

    Ok(keywords)
}

fn read_config_file(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(format!("Failed to read '{}': {}", path.display(), e))
    })
}
