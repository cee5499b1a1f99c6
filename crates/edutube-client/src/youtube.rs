//! YouTube Data API v3 client.
//!
//! Only the four list operations the harvesters need are supported, modelled
//! as the closed [`ApiRequest`] enum and dispatched through
//! [`YouTubeClient::execute`]. Every failure is returned as a classified
//! [`FetchError`] so the harvester loop can decide between retry, rotation and
//! the failure ledger.
//!
//! # Examples
//!
//! ```no_run
//! use edutube_client::YouTubeClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = YouTubeClient::new("AIza-your-key")?;
//! let page = client.search_page("relational algebra", None).await?;
//! println!("{} videos, more: {}", page.record.videos.len(), page.next_cursor.is_some());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use edutube_core::error::{AppError, FetchError};
use edutube_core::models::{
    ChannelRecord, CommentPage, CommentThreadRecord, ReplyRecord, SearchPage, VideoRecord,
};
use edutube_core::traits::FetchedPage;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::http::{build_client, classify_transport_error};

/// Base URL of the Data API.
pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3/";

/// Results per `search.list` page (API maximum).
pub const SEARCH_PAGE_SIZE: u32 = 50;

/// Threads per `commentThreads.list` page (API maximum).
pub const COMMENT_PAGE_SIZE: u32 = 100;

/// Parts requested when enriching search results.
pub const VIDEO_DETAIL_PARTS: &str = "snippet,statistics,contentDetails,paidProductPlacementDetails";

/// `errors[].reason` values meaning the key has no quota left.
const QUOTA_REASONS: &[&str] = &[
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

/// Reasons meaning the key itself is unusable. Handled like quota exhaustion
/// so the pool moves on and aborts once every key was rejected.
const CREDENTIAL_REASONS: &[&str] = &[
    "keyInvalid",
    "keyExpired",
    "accessNotConfigured",
    "ipRefererBlocked",
];

/// Reasons tied to the requested item rather than the key.
const PERMANENT_REASONS: &[&str] = &[
    "commentsDisabled",
    "videoNotFound",
    "channelNotFound",
    "forbidden",
    "invalidPageToken",
];

/// Classifies a non-success Data API response.
///
/// Decided on the structured `errors[].reason` values first, then on the
/// status code. A 403 or 429 without a recognised reason is transient.
pub fn classify_youtube_error<R: AsRef<str>>(status: u16, reasons: &[R], message: &str) -> FetchError {
    let has = |set: &[&str]| reasons.iter().any(|r| set.contains(&r.as_ref()));
    let text = if message.is_empty() {
        format!("HTTP {}", status)
    } else {
        message.to_string()
    };

    let error = if has(QUOTA_REASONS) || has(CREDENTIAL_REASONS) {
        FetchError::quota_exhausted(text)
    } else if has(PERMANENT_REASONS) {
        FetchError::permanent(text)
    } else {
        match status {
            401 => FetchError::quota_exhausted(text),
            400 | 404 | 410 => FetchError::permanent(text),
            403 | 408 | 429 => FetchError::transient(text),
            s if s >= 500 => FetchError::transient(text),
            _ => FetchError::permanent(text),
        }
    };
    error.with_status(status)
}

// =============================================================================
// Requests
// =============================================================================

/// The Data API operations used by the harvesters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// `search.list`: one page of videos for a keyword, most viewed first.
    SearchList {
        query: String,
        page_token: Option<String>,
    },
    /// `videos.list` for up to 50 ids.
    VideosList { ids: Vec<String>, part: &'static str },
    /// `channels.list` for one channel.
    ChannelsList { channel_id: String },
    /// `commentThreads.list`: one page of threads for a video, newest first.
    CommentThreadsList {
        video_id: String,
        page_token: Option<String>,
    },
}

impl ApiRequest {
    /// Path relative to [`YOUTUBE_API_BASE`].
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::SearchList { .. } => "search",
            Self::VideosList { .. } => "videos",
            Self::ChannelsList { .. } => "channels",
            Self::CommentThreadsList { .. } => "commentThreads",
        }
    }

    /// Query parameters, without the API key.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        match self {
            Self::SearchList { query, page_token } => {
                pairs.push(("part", "snippet".to_string()));
                pairs.push(("q", query.clone()));
                pairs.push(("type", "video".to_string()));
                pairs.push(("maxResults", SEARCH_PAGE_SIZE.to_string()));
                pairs.push(("order", "viewCount".to_string()));
                if let Some(token) = page_token {
                    pairs.push(("pageToken", token.clone()));
                }
            }
            Self::VideosList { ids, part } => {
                pairs.push(("part", part.to_string()));
                pairs.push(("id", ids.join(",")));
            }
            Self::ChannelsList { channel_id } => {
                pairs.push(("part", "snippet,contentDetails,statistics".to_string()));
                pairs.push(("id", channel_id.clone()));
                pairs.push(("hl", "en".to_string()));
            }
            Self::CommentThreadsList {
                video_id,
                page_token,
            } => {
                pairs.push(("part", "snippet,replies".to_string()));
                pairs.push(("videoId", video_id.clone()));
                pairs.push(("maxResults", COMMENT_PAGE_SIZE.to_string()));
                pairs.push(("order", "time".to_string()));
                if let Some(token) = page_token {
                    pairs.push(("pageToken", token.clone()));
                }
            }
        }
        pairs
    }
}

// =============================================================================
// Response DTOs
// =============================================================================

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorReason {
    #[serde(default)]
    reason: String,
}

/// Extracts `errors[].reason` and the message from an error body.
fn parse_error_body(body: &str) -> (Vec<String>, String) {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => (
            parsed
                .error
                .errors
                .into_iter()
                .map(|e| e.reason)
                .filter(|r| !r.is_empty())
                .collect(),
            parsed.error.message,
        ),
        Err(_) => (Vec::new(), body.chars().take(200).collect()),
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SearchItem {
    id: SearchItemId,
    snippet: Option<SearchSnippet>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    #[serde(default)]
    title: String,
    channel_title: Option<String>,
    published_at: Option<String>,
}

#[derive(Deserialize, Debug)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<VideoSnippet>,
    statistics: Option<VideoStatistics>,
    content_details: Option<VideoContentDetails>,
    paid_product_placement_details: Option<PaidProductPlacementDetails>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: Option<String>,
    channel_id: Option<String>,
    channel_title: Option<String>,
    published_at: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    default_audio_language: Option<String>,
    default_language: Option<String>,
}

/// Counts arrive as decimal strings.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Deserialize, Debug)]
struct VideoContentDetails {
    duration: Option<String>,
    definition: Option<String>,
    caption: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PaidProductPlacementDetails {
    has_paid_product_placement: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    id: String,
    snippet: Option<ChannelSnippet>,
    content_details: Option<ChannelContentDetails>,
    statistics: Option<ChannelStatistics>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChannelSnippet {
    title: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
    country: Option<String>,
    localized: Option<Localized>,
}

#[derive(Deserialize, Debug)]
struct Localized {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: Option<RelatedPlaylists>,
}

#[derive(Deserialize, Debug)]
struct RelatedPlaylists {
    likes: Option<String>,
    uploads: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    view_count: Option<String>,
    subscriber_count: Option<String>,
    video_count: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CommentThreadListResponse {
    #[serde(default)]
    items: Vec<CommentThreadItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CommentThreadItem {
    id: String,
    snippet: CommentThreadSnippet,
    replies: Option<CommentReplies>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CommentThreadSnippet {
    top_level_comment: Comment,
    #[serde(default)]
    total_reply_count: i64,
}

#[derive(Deserialize, Debug)]
struct CommentReplies {
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Deserialize, Debug)]
struct Comment {
    id: String,
    snippet: CommentSnippet,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    text_display: String,
    #[serde(default)]
    like_count: i64,
    published_at: Option<String>,
    updated_at: Option<String>,
}

fn parse_count(value: &Option<String>) -> Option<i64> {
    value.as_deref().and_then(|v| v.parse().ok())
}

/// Joins search hits with their `videos.list` details, keeping search order.
///
/// A hit whose details are missing (deleted between the two calls) keeps its
/// search snippet and has no statistics.
fn merge_search_results(
    hits: &[SearchItem],
    details: Vec<VideoItem>,
    collected_at: DateTime<Utc>,
) -> Vec<VideoRecord> {
    let mut by_id: HashMap<String, VideoItem> =
        details.into_iter().map(|d| (d.id.clone(), d)).collect();

    hits.iter()
        .filter_map(|hit| {
            let video_id = hit.id.video_id.clone()?;
            let detail = by_id.remove(&video_id);
            let search = hit.snippet.as_ref();

            let snippet = detail.as_ref().and_then(|d| d.snippet.as_ref());
            let stats = detail.as_ref().and_then(|d| d.statistics.as_ref());
            let content = detail.as_ref().and_then(|d| d.content_details.as_ref());
            let placement = detail
                .as_ref()
                .and_then(|d| d.paid_product_placement_details.as_ref());

            Some(VideoRecord {
                title: search
                    .map(|s| s.title.clone())
                    .filter(|t| !t.is_empty())
                    .or_else(|| snippet.and_then(|s| s.title.clone()))
                    .unwrap_or_default(),
                channel_title: search
                    .and_then(|s| s.channel_title.clone())
                    .or_else(|| snippet.and_then(|s| s.channel_title.clone())),
                published_at: search
                    .and_then(|s| s.published_at.clone())
                    .or_else(|| snippet.and_then(|s| s.published_at.clone())),
                description: snippet.and_then(|s| s.description.clone()),
                tags: snippet.map(|s| s.tags.clone()).unwrap_or_default(),
                default_audio_language: snippet.and_then(|s| s.default_audio_language.clone()),
                default_language: snippet.and_then(|s| s.default_language.clone()),
                duration: content.and_then(|c| c.duration.clone()),
                definition: content.and_then(|c| c.definition.clone()),
                caption: content
                    .and_then(|c| c.caption.as_deref())
                    .map(|c| c == "true"),
                view_count: stats.and_then(|s| parse_count(&s.view_count)),
                like_count: stats.and_then(|s| parse_count(&s.like_count)),
                comment_count: stats.and_then(|s| parse_count(&s.comment_count)),
                paid_product_placement: placement.and_then(|p| p.has_paid_product_placement),
                collected_at,
                video_id,
            })
        })
        .collect()
}

fn channel_record(item: ChannelItem, fetched_at: DateTime<Utc>) -> ChannelRecord {
    let snippet = item.snippet;
    let localized = snippet.as_ref().and_then(|s| s.localized.as_ref());
    let playlists = item
        .content_details
        .as_ref()
        .and_then(|c| c.related_playlists.as_ref());
    let stats = item.statistics.as_ref();

    ChannelRecord {
        title: snippet.as_ref().and_then(|s| s.title.clone()),
        description: snippet.as_ref().and_then(|s| s.description.clone()),
        localized_title: localized.and_then(|l| l.title.clone()),
        localized_description: localized.and_then(|l| l.description.clone()),
        published_at: snippet.as_ref().and_then(|s| s.published_at.clone()),
        country: snippet.as_ref().and_then(|s| s.country.clone()),
        likes_playlist: playlists.and_then(|p| p.likes.clone()),
        uploads_playlist: playlists.and_then(|p| p.uploads.clone()),
        view_count: stats.and_then(|s| parse_count(&s.view_count)),
        subscriber_count: stats.and_then(|s| parse_count(&s.subscriber_count)),
        video_count: stats.and_then(|s| parse_count(&s.video_count)),
        fetched_at,
        channel_id: item.id,
    }
}

fn comment_page(video_id: &str, items: Vec<CommentThreadItem>) -> CommentPage {
    let mut page = CommentPage {
        video_id: video_id.to_string(),
        ..Default::default()
    };

    for item in items {
        let top = item.snippet.top_level_comment.snippet;
        page.threads.push(CommentThreadRecord {
            thread_id: item.id.clone(),
            video_id: video_id.to_string(),
            text: top.text_display,
            like_count: top.like_count,
            published_at: top.published_at,
            updated_at: top.updated_at,
            total_reply_count: item.snippet.total_reply_count,
        });

        for reply in item.replies.map(|r| r.comments).unwrap_or_default() {
            page.replies.push(ReplyRecord {
                reply_id: reply.id,
                thread_id: item.id.clone(),
                video_id: video_id.to_string(),
                text: reply.snippet.text_display,
                like_count: reply.snippet.like_count,
                published_at: reply.snippet.published_at,
                updated_at: reply.snippet.updated_at,
            });
        }
    }

    page
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the YouTube Data API, bound to one API key.
#[derive(Clone)]
pub struct YouTubeClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl YouTubeClient {
    /// Creates a client for the public Data API endpoint.
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, YOUTUBE_API_BASE)
    }

    /// Creates a client against a custom base URL (proxies, API emulators).
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("invalid YouTube API URL: {}", e)))?;
        let (client, _) = build_client()?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    /// Full request URL, API key included.
    pub fn request_url(&self, request: &ApiRequest) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join(request.endpoint())
            .map_err(|e| FetchError::permanent(format!("cannot build request URL: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in request.query_pairs() {
                pairs.append_pair(name, &value);
            }
            pairs.append_pair("key", &self.api_key);
        }
        Ok(url)
    }

    /// Sends one request and decodes the response body.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, FetchError> {
        let url = self.request_url(request)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (reasons, message) = parse_error_body(&body);
            tracing::debug!(
                endpoint = request.endpoint(),
                status = status.as_u16(),
                reasons = ?reasons,
                "YouTube API error"
            );
            return Err(classify_youtube_error(status.as_u16(), &reasons, &message));
        }

        response.json::<T>().await.map_err(|e| {
            FetchError::transient(format!(
                "malformed {} response: {}",
                request.endpoint(),
                e
            ))
        })
    }

    /// One page of search results for `keyword`, enriched with video details.
    pub async fn search_page(
        &self,
        keyword: &str,
        page_token: Option<&str>,
    ) -> Result<FetchedPage<SearchPage>, FetchError> {
        let search: SearchListResponse = self
            .execute(&ApiRequest::SearchList {
                query: keyword.to_string(),
                page_token: page_token.map(str::to_string),
            })
            .await?;

        let ids: Vec<String> = search
            .items
            .iter()
            .filter_map(|hit| hit.id.video_id.clone())
            .collect();

        let details = if ids.is_empty() {
            Vec::new()
        } else {
            self.execute::<VideoListResponse>(&ApiRequest::VideosList {
                ids,
                part: VIDEO_DETAIL_PARTS,
            })
            .await?
            .items
        };

        let videos = merge_search_results(&search.items, details, Utc::now());
        Ok(FetchedPage {
            record: SearchPage {
                keyword: keyword.to_string(),
                videos,
            },
            next_cursor: non_empty(search.next_page_token),
        })
    }

    /// Channel id of a video, `None` if the video does not exist.
    pub async fn video_channel_id(&self, video_id: &str) -> Result<Option<String>, FetchError> {
        let response: VideoListResponse = self
            .execute(&ApiRequest::VideosList {
                ids: vec![video_id.to_string()],
                part: "snippet",
            })
            .await?;

        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.snippet)
            .and_then(|snippet| snippet.channel_id))
    }

    /// Channel metadata and statistics, `None` if the channel does not exist.
    pub async fn channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>, FetchError> {
        let response: ChannelListResponse = self
            .execute(&ApiRequest::ChannelsList {
                channel_id: channel_id.to_string(),
            })
            .await?;

        let fetched_at = Utc::now();
        Ok(response
            .items
            .into_iter()
            .next()
            .map(|item| channel_record(item, fetched_at)))
    }

    /// One page of comment threads with their inline replies.
    pub async fn comment_page(
        &self,
        video_id: &str,
        page_token: Option<&str>,
    ) -> Result<FetchedPage<CommentPage>, FetchError> {
        let response: CommentThreadListResponse = self
            .execute(&ApiRequest::CommentThreadsList {
                video_id: video_id.to_string(),
                page_token: page_token.map(str::to_string),
            })
            .await?;

        Ok(FetchedPage {
            record: comment_page(video_id, response.items),
            next_cursor: non_empty(response.next_page_token),
        })
    }
}
