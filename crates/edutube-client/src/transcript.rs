//! Transcript retrieval through the public watch page and the innertube player API.
//!
//! Three requests per video:
//!
//! 1. the watch page, to read the innertube API key,
//! 2. `youtubei/v1/player`, which lists the caption tracks,
//! 3. the timed-text XML of the chosen track.
//!
//! No credential is needed; the transcript harvesters run with an anonymous
//! pool.

use std::fmt;
use std::sync::LazyLock;

use edutube_core::error::{AppError, FetchError};
use edutube_core::models::{TranscriptKind, TranscriptRecord};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::http::{build_client, classify_transport_error};

/// Base URL for watch pages and the innertube API.
pub const YOUTUBE_WEB_BASE: &str = "https://www.youtube.com/";

/// Innertube client version sent with player requests.
const INNERTUBE_CLIENT_VERSION: &str = "20.10.38";

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#).expect("valid api key regex")
});

static TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("valid text regex"));

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|amp|lt|gt|quot|apos|nbsp);").expect("valid entity regex")
});

/// Why a transcript could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptFailure {
    /// The video is private, removed or otherwise unplayable.
    VideoUnavailable(String),
    /// The video has no caption tracks at all.
    TranscriptsDisabled,
    /// Caption tracks exist but none matches the requested languages.
    NoTranscriptFound,
    /// YouTube answered with a captcha or bot check.
    RequestBlocked(String),
    /// Unexpected HTTP status.
    Http(u16),
    /// The response could not be understood.
    Malformed(String),
}

impl fmt::Display for TranscriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoUnavailable(reason) => write!(f, "video unavailable: {}", reason),
            Self::TranscriptsDisabled => f.write_str("transcripts are disabled"),
            Self::NoTranscriptFound => f.write_str("no matching transcript found"),
            Self::RequestBlocked(reason) => write!(f, "request blocked: {}", reason),
            Self::Http(status) => write!(f, "unexpected HTTP {}", status),
            Self::Malformed(detail) => write!(f, "malformed response: {}", detail),
        }
    }
}

/// Maps a transcript failure onto the harvester taxonomy.
///
/// Missing or disabled transcripts and unavailable videos go to the failure
/// ledger. Bot checks, rate limits and server errors are retried.
pub fn classify_transcript_failure(failure: &TranscriptFailure) -> FetchError {
    let message = failure.to_string();
    match failure {
        TranscriptFailure::VideoUnavailable(_)
        | TranscriptFailure::TranscriptsDisabled
        | TranscriptFailure::NoTranscriptFound => FetchError::permanent(message),
        TranscriptFailure::RequestBlocked(_) | TranscriptFailure::Malformed(_) => {
            FetchError::transient(message)
        }
        TranscriptFailure::Http(status) => match status {
            404 | 410 => FetchError::permanent(message),
            _ => FetchError::transient(message),
        }
        .with_status(*status),
    }
}

impl From<TranscriptFailure> for FetchError {
    fn from(failure: TranscriptFailure) -> Self {
        classify_transcript_failure(&failure)
    }
}

/// One caption track advertised by the player.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    pub kind: TranscriptKind,
    pub translatable: bool,
}

impl CaptionTrack {
    pub fn is_english(&self) -> bool {
        is_english(&self.language_code)
    }
}

fn is_english(code: &str) -> bool {
    code == "en" || code.starts_with("en-")
}

/// Picks an English track, creator-uploaded before auto-generated.
pub fn select_english(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    let english = || tracks.iter().filter(|t| t.is_english());
    english()
        .find(|t| t.kind == TranscriptKind::CreatorUploaded)
        .or_else(|| english().find(|t| t.kind == TranscriptKind::AutoGenerated))
}

/// Picks a track in any language that can be read in English.
///
/// Only English or translatable tracks qualify. Creator-uploaded tracks win
/// over auto-generated ones; within a kind the player's order is kept.
pub fn select_any(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    let usable = || tracks.iter().filter(|t| t.is_english() || t.translatable);
    usable()
        .find(|t| t.kind == TranscriptKind::CreatorUploaded)
        .or_else(|| usable().find(|t| t.kind == TranscriptKind::AutoGenerated))
}

/// Decodes the XML and HTML entities that appear in timed-text bodies.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            match entity {
                "amp" => "&".to_string(),
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "quot" => "\"".to_string(),
                "apos" => "'".to_string(),
                "nbsp" => " ".to_string(),
                _ => {
                    let code = if let Some(hex) = entity
                        .strip_prefix("#x")
                        .or_else(|| entity.strip_prefix("#X"))
                    {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        entity[1..].parse::<u32>().ok()
                    };
                    code.and_then(char::from_u32)
                        .map(String::from)
                        .unwrap_or_else(|| caps[0].to_string())
                }
            }
        })
        .into_owned()
}

/// Joins the `<text>` segments of a timed-text document into one string.
///
/// Segment text is escaped twice by YouTube (`&amp;#39;`), so entities are
/// decoded twice before markup is stripped.
pub fn parse_timed_text(xml: &str) -> String {
    TEXT_RE
        .captures_iter(xml)
        .map(|caps| {
            let decoded = decode_entities(&decode_entities(&caps[1]));
            TAG_RE.replace_all(&decoded, "").trim().to_string()
        })
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Player response
// =============================================================================

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    captions: Option<Captions>,
}

#[derive(Deserialize, Debug)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Captions {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<RawCaptionTrack>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawCaptionTrack {
    base_url: String,
    language_code: String,
    kind: Option<String>,
    #[serde(default)]
    is_translatable: bool,
}

/// Extracts the caption tracks from a player response.
fn caption_tracks(player: PlayerResponse) -> Result<Vec<CaptionTrack>, TranscriptFailure> {
    if let Some(playability) = &player.playability_status
        && playability.status != "OK"
    {
        let reason = playability
            .reason
            .clone()
            .unwrap_or_else(|| playability.status.clone());
        if playability.status == "LOGIN_REQUIRED" && reason.contains("not a bot") {
            return Err(TranscriptFailure::RequestBlocked(reason));
        }
        return Err(TranscriptFailure::VideoUnavailable(reason));
    }

    let raw = player
        .captions
        .and_then(|c| c.player_captions_tracklist_renderer)
        .map(|r| r.caption_tracks)
        .unwrap_or_default();
    if raw.is_empty() {
        return Err(TranscriptFailure::TranscriptsDisabled);
    }

    Ok(raw
        .into_iter()
        .map(|track| CaptionTrack {
            base_url: track.base_url.replace("&fmt=srv3", ""),
            language_code: track.language_code,
            kind: if track.kind.as_deref() == Some("asr") {
                TranscriptKind::AutoGenerated
            } else {
                TranscriptKind::CreatorUploaded
            },
            translatable: track.is_translatable,
        })
        .collect())
}

// =============================================================================
// Client
// =============================================================================

/// Anonymous transcript client.
#[derive(Clone)]
pub struct TranscriptClient {
    client: Client,
    base_url: Url,
}

impl TranscriptClient {
    pub fn new() -> Result<Self, AppError> {
        Self::with_base_url(YOUTUBE_WEB_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("invalid YouTube URL: {}", e)))?;
        let (client, _) = build_client()?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::permanent(format!("cannot build URL: {}", e)))
    }

    async fn get_text(&self, url: Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept-Language", "en-US")
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranscriptFailure::Http(status.as_u16()).into());
        }
        response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))
    }

    async fn innertube_key(&self, video_id: &str) -> Result<String, FetchError> {
        let mut url = self.url("watch")?;
        url.query_pairs_mut().append_pair("v", video_id);
        let html = self.get_text(url).await?;

        if html.contains("class=\"g-recaptcha\"") {
            return Err(TranscriptFailure::RequestBlocked("captcha page".to_string()).into());
        }
        API_KEY_RE
            .captures(&html)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| {
                TranscriptFailure::Malformed("watch page has no innertube key".to_string()).into()
            })
    }

    /// Lists the caption tracks of a video.
    pub async fn list_tracks(&self, video_id: &str) -> Result<Vec<CaptionTrack>, FetchError> {
        let key = self.innertube_key(video_id).await?;
        let mut url = self.url("youtubei/v1/player")?;
        url.query_pairs_mut().append_pair("key", &key);

        let body = json!({
            "context": {
                "client": {
                    "clientName": "ANDROID",
                    "clientVersion": INNERTUBE_CLIENT_VERSION,
                }
            },
            "videoId": video_id,
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranscriptFailure::Http(status.as_u16()).into());
        }
        let player: PlayerResponse = response
            .json()
            .await
            .map_err(|e| FetchError::from(TranscriptFailure::Malformed(e.to_string())))?;

        Ok(caption_tracks(player)?)
    }

    /// Downloads a track as plain text, optionally machine-translated.
    pub async fn fetch_text(
        &self,
        track: &CaptionTrack,
        translate_to: Option<&str>,
    ) -> Result<String, FetchError> {
        let mut url = Url::parse(&track.base_url)
            .map_err(|e| FetchError::from(TranscriptFailure::Malformed(e.to_string())))?;
        if let Some(lang) = translate_to {
            url.query_pairs_mut().append_pair("tlang", lang);
        }

        let xml = self.get_text(url).await?;
        if xml.trim().is_empty() {
            // Empty bodies come back when the request was throttled
            return Err(TranscriptFailure::RequestBlocked("empty timed-text body".to_string()).into());
        }
        Ok(parse_timed_text(&xml))
    }

    /// English transcript, creator-uploaded preferred.
    pub async fn english_transcript(&self, video_id: &str) -> Result<TranscriptRecord, FetchError> {
        let tracks = self.list_tracks(video_id).await?;
        let track = select_english(&tracks).ok_or(TranscriptFailure::NoTranscriptFound)?;
        let text = self.fetch_text(track, None).await?;

        Ok(TranscriptRecord {
            video_id: video_id.to_string(),
            text,
            kind: track.kind,
            translatable: track.translatable,
            language_code: track.language_code.clone(),
            translated_from: None,
        })
    }

    /// Transcript in any language, translated to English when needed.
    pub async fn any_language_transcript(
        &self,
        video_id: &str,
    ) -> Result<TranscriptRecord, FetchError> {
        let tracks = self.list_tracks(video_id).await?;
        let track = select_any(&tracks).ok_or(TranscriptFailure::NoTranscriptFound)?;

        let (text, language_code, translated_from) = if track.is_english() {
            (
                self.fetch_text(track, None).await?,
                track.language_code.clone(),
                None,
            )
        } else {
            (
                self.fetch_text(track, Some("en")).await?,
                "en".to_string(),
                Some(track.language_code.clone()),
            )
        };

        Ok(TranscriptRecord {
            video_id: video_id.to_string(),
            text,
            kind: track.kind,
            translatable: track.translatable,
            language_code,
            translated_from,
        })
    }
}
