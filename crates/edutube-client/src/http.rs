//! Shared HTTP plumbing for the API clients.

use std::error::Error as StdError;
use std::io::ErrorKind;

use edutube_core::HttpConfig;
use edutube_core::error::{AppError, FetchError};
use reqwest::Client;

/// Builds a `reqwest` client with the default timeout and user agent.
pub(crate) fn build_client() -> Result<(Client, u64), AppError> {
    let http_config = HttpConfig::default();
    let client = Client::builder()
        .user_agent(http_config.user_agent.as_str())
        .timeout(http_config.timeout)
        .build()
        .map_err(|e| AppError::ClientError(e.to_string()))?;
    Ok((client, http_config.timeout.as_secs()))
}

/// Classifies a request that produced no HTTP response.
///
/// Dropped connections get the short network backoff; timeouts and anything
/// else the regular transient backoff.
pub fn classify_transport_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        return FetchError::transient(format!("request timed out: {}", error));
    }
    if error.is_connect() || is_connection_reset(error) {
        return FetchError::network_reset(format!("connection failed: {}", error));
    }
    FetchError::transient(error.to_string())
}

fn is_connection_reset(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
            )
        {
            return true;
        }
        source = err.source();
    }
    false
}
