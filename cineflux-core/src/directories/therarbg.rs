//! TheRARBG directory client.
//!
//! TheRARBG exposes a JSON API when asked with `format=json`, but sits
//! behind an anti-bot interstitial on some networks. When a challenge proxy
//! is configured, requests are routed through it and the JSON payload is
//! unwrapped from the HTML the solver hands back. A redirect to the homepage
//! is the provider's way of saying "never heard of this movie".

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use cineflux_model::{
    quality_to_resolution, DirectoryStatus, Language, Quality, SourceMetadata, SourceType,
};

use crate::config::DirectoryEndpoint;
use crate::directories::challenge::{unwrap_json_from_html, ChallengeClient};
use crate::directories::{ContentDirectory, DirectoryMovie, RequestTracker};
use crate::error::{Result, SourceError};
use crate::metadata::{
    approximate_bitrate_kbps, normalize_audio_codec, normalize_quality, normalize_source_type,
    normalize_video_codec,
};
use crate::ratelimit::{RateLimiter, RateLimiterRegistry};

pub const THERARBG_NAME: &str = "TheRARBG";

const MIN_BROADCASTERS: u32 = 2;
const MIN_SIZE_BYTES: u64 = 100 * 1024 * 1024;

static IMDB_CANONICAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tt\d{7,8}$").unwrap());
static IMDB_DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{7,8}$").unwrap());
static IMDB_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/title/(tt\d{7,8})").unwrap());

/// Validates and normalizes an IMDb identifier to its canonical `tt` form.
/// Accepts the canonical form, bare digits, and IMDb title URLs.
pub fn validate_imdb_id(imdb_id: &str) -> Result<String> {
    let cleaned = imdb_id.trim();
    if cleaned.is_empty() {
        return Err(SourceError::InvalidMediaId("empty IMDb id".into()));
    }
    if IMDB_CANONICAL_RE.is_match(cleaned) {
        return Ok(cleaned.to_owned());
    }
    if IMDB_DIGITS_RE.is_match(cleaned) {
        return Ok(format!("tt{cleaned}"));
    }
    if let Some(capture) = IMDB_URL_RE.captures(cleaned) {
        return Ok(capture[1].to_owned());
    }
    Err(SourceError::InvalidMediaId(imdb_id.to_owned()))
}

#[derive(Debug, Deserialize)]
struct ImdbDetailResponse {
    imdb: Option<ImdbMetadata>,
    #[serde(default)]
    trb_posts: Vec<TrbPost>,
}

#[derive(Debug, Deserialize)]
struct ImdbMetadata {
    /// Runtime in seconds, as a string.
    #[serde(default)]
    runtime: String,
}

#[derive(Debug, Deserialize)]
struct TrbPost {
    #[serde(default)]
    name: String,
    info_hash: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    seeders: u32,
    #[serde(default)]
    leechers: u32,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    trackers: Vec<TrbTracker>,
}

#[derive(Debug, Deserialize)]
struct TrbTracker {
    tracker: String,
    scrape_error: Option<String>,
}

pub struct TheRarbgDirectory {
    http: reqwest::Client,
    endpoints: Vec<String>,
    current_endpoint: AtomicUsize,
    limiter: Arc<RateLimiter>,
    high_priority_limiter: Arc<RateLimiter>,
    tracker: RequestTracker,
    challenge: Option<ChallengeClient>,
}

impl std::fmt::Debug for TheRarbgDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TheRarbgDirectory")
            .field("endpoints", &self.endpoints)
            .field("challenge", &self.challenge.is_some())
            .finish_non_exhaustive()
    }
}

impl TheRarbgDirectory {
    pub fn new(
        endpoint: &DirectoryEndpoint,
        challenge: Option<ChallengeClient>,
        limiters: &RateLimiterRegistry,
    ) -> Result<Self> {
        // Redirects carry meaning here (homepage redirect == not found), so
        // the client must not follow them on its own.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(15))
            .build()?;

        let mut endpoints = vec![endpoint.base_url.clone()];
        endpoints.extend(endpoint.mirrors.iter().cloned());

        Ok(Self {
            http,
            endpoints,
            current_endpoint: AtomicUsize::new(0),
            limiter: limiters.get(THERARBG_NAME, endpoint.rate_limit),
            high_priority_limiter: limiters
                .get(&format!("{THERARBG_NAME}:high"), endpoint.high_priority_rate_limit),
            tracker: RequestTracker::new(),
            challenge,
        })
    }

    async fn throttle(&self, high_priority: bool) {
        if high_priority && self.high_priority_limiter.delay() < self.limiter.delay() {
            self.high_priority_limiter.throttle().await;
        } else {
            self.limiter.throttle().await;
        }
    }

    /// Fetches the detail payload; `Ok(None)` means the provider has nothing
    /// for this movie.
    async fn fetch_detail(
        &self,
        imdb_id: &str,
        high_priority: bool,
    ) -> Result<Option<ImdbDetailResponse>> {
        let _guard = self.tracker.begin();
        self.throttle(high_priority).await;

        let start = self.current_endpoint.load(Ordering::Relaxed);
        let mut last_error = None;

        for attempt in 0..self.endpoints.len() {
            let idx = (start + attempt) % self.endpoints.len();
            let url = format!(
                "{}/imdb-detail/{}/?format=json",
                self.endpoints[idx], imdb_id
            );

            let outcome = match &self.challenge {
                Some(challenge) => self.fetch_via_challenge(challenge, &url).await,
                None => self.fetch_direct(&url).await,
            };

            match outcome {
                Ok(found) => {
                    self.current_endpoint.store(idx, Ordering::Relaxed);
                    self.tracker.record_success();
                    return Ok(found);
                }
                Err(err) => {
                    warn!(url, error = %err, "TheRARBG request failed, rotating mirror");
                    last_error = Some(err);
                }
            }
        }

        self.tracker.record_failure();
        Err(last_error.unwrap_or_else(|| SourceError::Api {
            directory: THERARBG_NAME,
            status: 0,
            message: "no endpoints configured".into(),
        }))
    }

    async fn fetch_direct(&self, url: &str) -> Result<Option<ImdbDetailResponse>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if location == "/" {
                // Homepage redirect is the provider's 404.
                return Ok(None);
            }
            return Err(SourceError::Api {
                directory: THERARBG_NAME,
                status: status.as_u16(),
                message: format!("unexpected redirect to {location}"),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::Api {
                directory: THERARBG_NAME,
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("request failed").into(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if content_type.contains("text/html") {
            return Err(SourceError::Api {
                directory: THERARBG_NAME,
                status: status.as_u16(),
                message: "received HTML response".into(),
            });
        }

        Ok(Some(response.json().await?))
    }

    async fn fetch_via_challenge(
        &self,
        challenge: &ChallengeClient,
        url: &str,
    ) -> Result<Option<ImdbDetailResponse>> {
        let response = challenge.get(url).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if response.status >= 400 {
            return Err(SourceError::Api {
                directory: THERARBG_NAME,
                status: response.status,
                message: "challenge-proxied request failed".into(),
            });
        }
        let payload = unwrap_json_from_html(&response.body);
        let detail = serde_json::from_str(&payload)
            .map_err(|e| SourceError::Parse(format!("TheRARBG detail payload: {e}")))?;
        Ok(Some(detail))
    }
}

fn is_viable(post: &TrbPost) -> bool {
    post.seeders >= MIN_BROADCASTERS && post.size >= MIN_SIZE_BYTES
}

static QUALITY_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(4320p|2160p|1440p|1080p|720p|480p|8k|4k|2k)\b").unwrap());
static SOURCE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(blu-?ray|bdremux|bdrip|web-?dl|webrip|web-?rip|hdtv|pdtv|dvdrip|dvdscr|dvd|telesync|telecine|screener|cam|ts|tc)\b",
    )
    .unwrap()
});

fn quality_from_name(name: &str) -> Option<Quality> {
    let capture = QUALITY_TOKEN_RE.captures(name)?;
    normalize_quality(&capture[1])
}

fn source_from_name(name: &str) -> Option<SourceType> {
    let capture = SOURCE_TOKEN_RE.captures(name)?;
    normalize_source_type(&capture[1])
}

fn parse_language(language: &str) -> Option<Language> {
    match language.trim().to_lowercase().as_str() {
        "english" | "en" => Some(Language::English),
        "spanish" | "es" => Some(Language::Spanish),
        "french" | "fr" => Some(Language::French),
        "german" | "de" => Some(Language::German),
        "italian" | "it" => Some(Language::Italian),
        "portuguese" | "pt" => Some(Language::Portuguese),
        "russian" | "ru" => Some(Language::Russian),
        "japanese" | "ja" => Some(Language::Japanese),
        "korean" | "ko" => Some(Language::Korean),
        "chinese" | "zh" => Some(Language::Chinese),
        "hindi" | "hi" => Some(Language::Hindi),
        "arabic" | "ar" => Some(Language::Arabic),
        "dutch" | "nl" => Some(Language::Dutch),
        "multi" | "multiple" => Some(Language::Multi),
        _ => None,
    }
}

fn parse_timestamp(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S")
                .map(|t| t.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

/// Builds a magnet link from the info hash and the trackers that answered
/// the last scrape.
fn magnet_link(hash: &str, name: &str, trackers: &[TrbTracker]) -> String {
    let encoded_name: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
    let mut link = format!("magnet:?xt=urn:btih:{hash}&dn={encoded_name}");
    for tracker in trackers.iter().filter(|t| t.scrape_error.is_none()) {
        let encoded: String =
            url::form_urlencoded::byte_serialize(tracker.tracker.as_bytes()).collect();
        link.push_str("&tr=");
        link.push_str(&encoded);
    }
    link
}

fn runtime_minutes(metadata: &ImdbMetadata) -> u32 {
    metadata
        .runtime
        .trim()
        .parse::<u32>()
        .map(|seconds| seconds / 60)
        .unwrap_or(0)
}

fn normalize_post(post: &TrbPost, runtime_minutes: u32) -> SourceMetadata {
    let quality = quality_from_name(&post.name);
    let hash = post.info_hash.to_lowercase();
    SourceMetadata {
        magnet_link: magnet_link(&hash, &post.name, &post.trackers),
        hash,
        // No stable torrent page URL on this provider.
        url: None,
        quality,
        video_codec: normalize_video_codec(&post.name),
        audio_codec: normalize_audio_codec(&post.name),
        source: source_from_name(&post.name),
        resolution: quality_to_resolution(quality),
        size: post.size,
        broadcasters: post.seeders,
        watchers: post.leechers,
        bitrate_kbps: approximate_bitrate_kbps(post.size, runtime_minutes),
        language: parse_language(&post.language).into_iter().collect(),
        upload_date: parse_timestamp(&post.timestamp),
        score: 0.0,
    }
}

#[async_trait]
impl ContentDirectory for TheRarbgDirectory {
    fn name(&self) -> &'static str {
        THERARBG_NAME
    }

    fn status(&self) -> DirectoryStatus {
        self.tracker.snapshot(THERARBG_NAME)
    }

    async fn get_movie(&self, imdb_id: &str, high_priority: bool) -> Result<DirectoryMovie> {
        let normalized_id = validate_imdb_id(imdb_id)?;

        let Some(detail) = self.fetch_detail(&normalized_id, high_priority).await? else {
            debug!(imdb_id, "TheRARBG has no entry for this movie");
            return Ok(DirectoryMovie::default());
        };
        let Some(metadata) = detail.imdb else {
            return Ok(DirectoryMovie::default());
        };

        let runtime = runtime_minutes(&metadata);
        let sources = detail
            .trb_posts
            .iter()
            .filter(|post| !post.info_hash.is_empty() && is_viable(post))
            .map(|post| normalize_post(post, runtime))
            .collect();

        // TheRARBG carries no trailer information.
        Ok(DirectoryMovie {
            sources,
            trailer_code: String::new(),
        })
    }
}
