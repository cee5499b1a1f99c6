//! Chat-completion classifier for the training sample.
//!
//! Asks a chat model whether a video is instructional on one of the topics in
//! the keyword list and expects a bare `1` or `0` back.

use edutube_core::error::{AppError, FetchError};
use edutube_core::models::{TrainingExample, VideoLabel};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{build_client, classify_transport_error};
use crate::openai::{classify_openai_error, parse_error_body};

/// Default chat completions endpoint.
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default classification model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

/// Word cap applied to descriptions in the prompt.
pub const DESCRIPTION_WORD_LIMIT: usize = 150;

/// Word cap applied to transcripts in the prompt.
pub const TRANSCRIPT_WORD_LIMIT: usize = 500;

const SYSTEM_MESSAGE: &str = "You are a helpful AI model that classifies YouTube videos.";

/// Keeps the first `limit` whitespace-separated words, joined by single spaces.
///
/// ```
/// use edutube_client::classifier::truncate_words;
///
/// assert_eq!(truncate_words("a  b\nc d", 3), "a b c");
/// assert_eq!(truncate_words("", 3), "");
/// ```
pub fn truncate_words(text: &str, limit: usize) -> String {
    text.split_whitespace()
        .take(limit)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the user prompt for one video.
pub fn build_prompt(example: &TrainingExample, keywords: &[String]) -> String {
    let description = truncate_words(
        example.description.as_deref().unwrap_or_default(),
        DESCRIPTION_WORD_LIMIT,
    );
    let transcript = truncate_words(
        example.transcript.as_deref().unwrap_or_default(),
        TRANSCRIPT_WORD_LIMIT,
    );
    let keyword_list = serde_json::to_string(keywords).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Given the following YouTube video INFORMATION, we are looking to see if it matches our KEYWORD LIST. \
Reply with \"1\" if and only if INFORMATION is an \"instructional video\" on any data system topic that matches KEYWORD LIST. \
Otherwise, reply \"0\".\n\
Instructional Video Definition: A video is instructional if it is designed to educate, train, or inform viewers \
by demonstrating a process, explaining a concept, or providing expert insights.\n\
Exclusions: Do not consider news reports, marketing/promotional material or legal interpretations/explanations.\n\
---- INFORMATION START -----\n\
Title: {}\n\
Description: {}\n\
Video Transcript: {}\n\
---- INFORMATION END -----\n\
---- KEYWORD LIST START -----\n\
{}\n\
---- KEYWORD LIST END -----\n",
        example.title, description, transcript, keyword_list
    )
}

/// Parses the model reply into a label.
///
/// Accepts `1`/`0` with surrounding whitespace or quotes. Anything else is a
/// permanent failure for the item.
pub fn parse_label(reply: &str) -> Result<bool, FetchError> {
    let trimmed = reply
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '.'));
    match trimmed {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(FetchError::permanent(format!(
            "unparseable classifier reply: {:?}",
            reply.chars().take(80).collect::<String>()
        ))),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Binary classifier backed by the OpenAI chat completions API.
#[derive(Clone)]
pub struct ChatClassifier {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    keywords: Vec<String>,
}

impl ChatClassifier {
    /// Creates a classifier for the default model.
    pub fn new(api_key: &str, keywords: Vec<String>) -> Result<Self, AppError> {
        Self::with_config(api_key, DEFAULT_CHAT_MODEL, None, keywords)
    }

    /// Creates a classifier with a custom model and endpoint.
    pub fn with_config(
        api_key: &str,
        model: &str,
        endpoint: Option<&str>,
        keywords: Vec<String>,
    ) -> Result<Self, AppError> {
        if keywords.is_empty() {
            return Err(AppError::ConfigError(
                "classifier keyword list is empty".to_string(),
            ));
        }
        let (client, _) = build_client()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.unwrap_or(OPENAI_CHAT_URL).to_string(),
            keywords,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Labels one training example.
    pub async fn classify(&self, example: &TrainingExample) -> Result<VideoLabel, FetchError> {
        let prompt = build_prompt(example, &self.keywords);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (message, code) = parse_error_body(status.as_u16(), &body);
            return Err(classify_openai_error(
                status.as_u16(),
                code.as_deref(),
                &message,
            ));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| FetchError::transient(format!("malformed chat response: {}", e)))?;

        if let Some(usage) = &chat.usage {
            tracing::debug!(
                item = %example.video_id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Classifier token usage"
            );
        }

        let reply = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| FetchError::transient("chat response has no choices"))?;

        Ok(VideoLabel {
            video_id: example.video_id.clone(),
            educational: parse_label(&reply)?,
            model: self.model.clone(),
        })
    }
}
