//! Embedding of video keyword summaries.
//!
//! The `embed` command turns the RAKE summary of each video into one vector
//! per model and stores it next to the video. Vectors are requested in batches
//! and written back in the order the summaries were sent.
//!
//! Error bodies are decoded here and classified by [`classify_openai_error`],
//! which the label worker in [`crate::classifier`] shares.
//!
//! ```no_run
//! use edutube_client::OpenAIClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenAIClient::new("sk-your-api-key")?;
//! let vector = client.get_embeddings("relational algebra; join order; query planner").await?;
//! assert_eq!(vector.len(), 1536);
//! # Ok(())
//! # }
//! ```

use edutube_core::FetchErrorKind;
use edutube_core::error::{AppError, FetchError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::build_client;

pub const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Summaries sent per request at most, whatever `--batch-size` says.
pub const MAX_EMBEDDING_BATCH: usize = 256;

/// Vector width of the embedding models the `embed` command is used with.
const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// Vector width stored for `model`. Unlisted models are assumed to match the default.
pub fn model_dimension(model: &str) -> usize {
    EMBEDDING_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dim)| *dim)
        .unwrap_or(1536)
}

/// Classifies a non-success OpenAI response.
///
/// `insufficient_quota` and a rejected key (401) both mean the key is done for
/// the run and the pool moves to the next one. Plain 429s, 408, 409 and 5xx
/// are retried on the same key.
pub fn classify_openai_error(status: u16, code: Option<&str>, message: &str) -> FetchError {
    let text = if message.is_empty() {
        format!("HTTP {}", status)
    } else {
        message.to_string()
    };

    let error = match (status, code) {
        (429, Some("insufficient_quota")) | (401, _) => FetchError::quota_exhausted(text),
        (429 | 408 | 409, _) => FetchError::transient(text),
        (s, _) if s >= 500 => FetchError::transient(text),
        _ => FetchError::permanent(text),
    };
    error.with_status(status)
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
    code: Option<String>,
}

/// Extracts `(message, code)` from an error body, falling back to the raw text.
pub(crate) fn parse_error_body(status: u16, body: &str) -> (String, Option<String>) {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(parsed) => (parsed.error.message, parsed.error.code),
        Err(_) => (format!("HTTP {}: {}", status, body), None),
    }
}

/// Maps a failed embeddings response onto the error the `embed` command reports.
///
/// Embedding runs outside the harvest loop, so nothing is rotated or retried.
/// A rejected key becomes a configuration error pointing at `OPENAI_API_KEY`.
fn embedding_failure(status: u16, body: &str) -> AppError {
    let (message, code) = parse_error_body(status, body);
    let classified = classify_openai_error(status, code.as_deref(), &message);

    match (classified.kind, status) {
        (FetchErrorKind::QuotaExhausted, 401) => AppError::ConfigError(format!(
            "OpenAI rejected the key: {}. Check OPENAI_API_KEY.",
            classified.message
        )),
        (FetchErrorKind::QuotaExhausted, _) => {
            AppError::ClientError(format!("OpenAI account out of credit: {}", classified.message))
        }
        (FetchErrorKind::Transient, 429) => AppError::RateLimitExceeded,
        _ => AppError::ClientError(format!("OpenAI error: {}", classified.message)),
    }
}

#[derive(Serialize)]
struct EmbeddingsBody<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingsReply {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

/// Places each returned vector at the position of the summary it belongs to.
///
/// Fails unless every input position is filled exactly once.
fn in_input_order(items: Vec<EmbeddingItem>, inputs: usize) -> Result<Vec<Vec<f32>>, AppError> {
    if items.len() != inputs {
        return Err(AppError::ClientError(format!(
            "OpenAI returned {} embeddings for {} inputs",
            items.len(),
            inputs
        )));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; inputs];
    for item in items {
        match slots.get_mut(item.index) {
            Some(slot @ None) => *slot = Some(item.embedding),
            Some(Some(_)) => {
                return Err(AppError::ClientError(format!(
                    "OpenAI returned input {} twice",
                    item.index
                )));
            }
            None => {
                return Err(AppError::ClientError(format!(
                    "OpenAI returned index {} for {} inputs",
                    item.index, inputs
                )));
            }
        }
    }

    // Lengths match and no index repeated, so every slot is filled.
    Ok(slots.into_iter().flatten().collect())
}

/// Embeddings client for one model and one key.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    dim: usize,
    timeout_secs: u64,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_model(api_key, DEFAULT_EMBEDDING_MODEL)
    }

    pub fn with_model(api_key: &str, model: &str) -> Result<Self, AppError> {
        Self::with_config(api_key, model, None)
    }

    /// `endpoint` replaces the public embeddings URL, e.g. for a local gateway.
    pub fn with_config(
        api_key: &str,
        model: &str,
        endpoint: Option<&str>,
    ) -> Result<Self, AppError> {
        let (client, timeout_secs) = build_client()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.unwrap_or(OPENAI_EMBEDDINGS_URL).to_string(),
            dim: model_dimension(model),
            timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embeds a single summary.
    pub async fn get_embeddings(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let vectors = self.get_embeddings_batch(&[text]).await?;
        vectors.into_iter().next().ok_or(AppError::EmptyResponse)
    }

    /// Embeds a batch of summaries in one request, returning vectors in input order.
    pub async fn get_embeddings_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingsBody {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else {
                    AppError::NetworkError(format!("embeddings request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(embedding_failure(status.as_u16(), &text));
        }

        let reply: EmbeddingsReply = response.json().await.map_err(|e| {
            AppError::ClientError(format!("unreadable embeddings response: {}", e))
        })?;

        in_input_order(reply.data, texts.len())
    }
}

impl edutube_core::traits::EmbeddingProvider for OpenAIClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn max_batch_size(&self) -> usize {
        MAX_EMBEDDING_BATCH
    }

    async fn generate(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.get_embeddings(text).await
    }

    async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.get_embeddings_batch(&refs).await
    }
}
