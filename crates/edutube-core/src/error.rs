use thiserror::Error;

/// Classification of a failed external fetch.
///
/// Produced by the client crate at the API boundary and consumed only by the
/// harvester loop, which decides between retry, rotation, skip and abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Network error or unclassified HTTP failure. Retried with the generic backoff.
    Transient,
    /// Connection reset or refused. Retried with the short network backoff.
    NetworkReset,
    /// The active credential has no quota left. Rotate and retry the same item.
    QuotaExhausted,
    /// The resource is disabled, missing or unavailable. Never retried.
    Permanent,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::NetworkReset => "network_reset",
            Self::QuotaExhausted => "quota_exhausted",
            Self::Permanent => "permanent",
        }
    }
}

/// A classified failure returned by a [`Fetcher`](crate::traits::Fetcher).
#[derive(Debug, Clone)]
pub struct FetchError {
    /// The failure category
    pub kind: FetchErrorKind,
    /// Human-readable reason, logged and stored in the failure ledger
    pub message: String,
    /// HTTP status code, when the failure came from an HTTP response
    pub status_code: Option<u16>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transient, message)
    }

    pub fn network_reset(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NetworkReset, message)
    }

    pub fn quota_exhausted(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::QuotaExhausted, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Permanent, message)
    }

    /// Returns true if the harvester should retry this failure with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Transient | FetchErrorKind::NetworkReset
        )
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind.as_str(), code, self.message),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

impl std::error::Error for FetchError {}

/// Application-wide error types.
///
/// Fetch failures are not represented here: they are classified as
/// [`FetchError`] and handled inside the harvester loop. An `AppError` that
/// escapes the loop always aborts the run.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```no_run
/// use edutube_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::ConfigError("api_keys.json has no keys".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Storage write failures abort the run so the progress file is never
    /// advanced past an unpersisted item.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP client could not be constructed or a request failed outside a harvest.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration file missing, unreadable or invalid.
    ///
    /// Covers the credential file, the keyword file and the TOML tuning file.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The progress file could not be read, written or removed.
    #[error("Progress file error: {0}")]
    ProgressFileError(String),

    /// Every credential in the pool failed with a quota error since the
    /// last successful call.
    #[error("All {credentials} credentials exhausted their quota")]
    PoolExhausted { credentials: usize },

    /// API response contained no data.
    #[error("Empty response from API")]
    EmptyResponse,

    /// Network or connection error outside a harvest loop.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded outside a harvest loop.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("unable to open") {
                    "Cannot open the SQLite database.\n   Check --database-url and that the directory exists.".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::PoolExhausted { credentials } => format!(
                "All {} credentials exhausted their quota.\n   Progress was saved; add keys to the credential file or rerun after the quota resets.",
                credentials
            ),
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your configuration files.",
                    msg
                )
            }
            AppError::ProgressFileError(msg) => format!(
                "Progress file error: {}\n   The file is left in place for manual inspection.",
                msg
            ),
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The server may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::EmptyResponse => {
                "The API returned no data. The service may be temporarily unavailable.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if no amount of waiting can make the run succeed without
    /// operator action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::PoolExhausted { .. }
                | AppError::ConfigError(_)
                | AppError::ProgressFileError(_)
                | AppError::DatabaseError(_)
        )
    }
}
