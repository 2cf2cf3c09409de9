//! YTS directory client.
//!
//! YTS serves a JSON API with several community mirrors. The client rotates
//! to the next mirror on transport failures and treats HTML bodies as
//! provider errors (the API answers error pages as HTML with status 200).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use cineflux_model::{quality_to_resolution, DirectoryStatus, SourceMetadata, VideoCodec};

use crate::config::DirectoryEndpoint;
use crate::directories::{ContentDirectory, DirectoryMovie, RequestTracker};
use crate::error::{Result, SourceError};
use crate::metadata::{
    approximate_bitrate_kbps, detect_audio_codec_from_channels, estimate_quality_from_bitrate,
    normalize_quality, normalize_source_type, normalize_video_codec,
};
use crate::ratelimit::{RateLimiter, RateLimiterRegistry};

pub const YTS_NAME: &str = "YTS";

#[derive(Debug, Deserialize)]
struct ListMoviesResponse {
    status: String,
    #[serde(default)]
    status_message: String,
    data: Option<MovieListData>,
}

#[derive(Debug, Deserialize)]
struct MovieListData {
    #[serde(default)]
    movie_count: u32,
    #[serde(default)]
    movies: Vec<YtsMovie>,
}

#[derive(Debug, Deserialize)]
struct YtsMovie {
    title_long: String,
    /// Runtime in minutes.
    #[serde(default)]
    runtime: u32,
    #[serde(default)]
    yt_trailer_code: String,
    #[serde(default)]
    torrents: Vec<YtsTorrent>,
}

#[derive(Debug, Deserialize)]
struct YtsTorrent {
    #[serde(default)]
    url: String,
    hash: String,
    #[serde(default)]
    quality: String,
    #[serde(default, rename = "type")]
    release_type: String,
    #[serde(default)]
    video_codec: String,
    #[serde(default)]
    bit_depth: String,
    #[serde(default)]
    audio_channels: String,
    #[serde(default)]
    size_bytes: u64,
    #[serde(default)]
    seeds: u32,
    #[serde(default)]
    peers: u32,
    #[serde(default)]
    date_uploaded_unix: i64,
}

pub struct YtsDirectory {
    http: reqwest::Client,
    endpoints: Vec<String>,
    current_endpoint: AtomicUsize,
    limiter: Arc<RateLimiter>,
    high_priority_limiter: Arc<RateLimiter>,
    tracker: RequestTracker,
}

impl std::fmt::Debug for YtsDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtsDirectory")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl YtsDirectory {
    /// Limiter tiers live in `limiters` under the directory name, so owners
    /// of the registry can inspect and evict them alongside every other key.
    pub fn new(
        http: reqwest::Client,
        endpoint: &DirectoryEndpoint,
        limiters: &RateLimiterRegistry,
    ) -> Self {
        let mut endpoints = vec![endpoint.base_url.clone()];
        endpoints.extend(endpoint.mirrors.iter().cloned());
        Self {
            http,
            endpoints,
            current_endpoint: AtomicUsize::new(0),
            limiter: limiters.get(YTS_NAME, endpoint.rate_limit),
            high_priority_limiter: limiters
                .get(&format!("{YTS_NAME}:high"), endpoint.high_priority_rate_limit),
            tracker: RequestTracker::new(),
        }
    }

    /// High priority requests take whichever queue is currently cheaper; the
    /// dedicated tier is only a win while the default queue is backed up.
    async fn throttle(&self, high_priority: bool) {
        if high_priority && self.high_priority_limiter.delay() < self.limiter.delay() {
            self.high_priority_limiter.throttle().await;
        } else {
            self.limiter.throttle().await;
        }
    }

    async fn fetch_list(
        &self,
        query_term: &str,
        high_priority: bool,
    ) -> Result<ListMoviesResponse> {
        let _guard = self.tracker.begin();
        self.throttle(high_priority).await;

        let start = self.current_endpoint.load(Ordering::Relaxed);
        let mut last_error = None;

        for attempt in 0..self.endpoints.len() {
            let idx = (start + attempt) % self.endpoints.len();
            let url = format!("{}/list_movies.json", self.endpoints[idx]);

            match self.fetch_once(&url, query_term).await {
                Ok(response) => {
                    self.current_endpoint.store(idx, Ordering::Relaxed);
                    self.tracker.record_success();
                    return Ok(response);
                }
                Err(err) => {
                    warn!(url, error = %err, "YTS request failed, rotating mirror");
                    last_error = Some(err);
                }
            }
        }

        self.tracker.record_failure();
        Err(last_error.unwrap_or_else(|| SourceError::Api {
            directory: YTS_NAME,
            status: 0,
            message: "no endpoints configured".into(),
        }))
    }

    async fn fetch_once(&self, url: &str, query_term: &str) -> Result<ListMoviesResponse> {
        let response = self
            .http
            .get(url)
            .query(&[("query_term", query_term), ("page", "1"), ("limit", "20")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Api {
                directory: YTS_NAME,
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
            // Error and 404 pages come back as HTML with status 200.
            return Err(SourceError::Api {
                directory: YTS_NAME,
                status: status.as_u16(),
                message: "received HTML response".into(),
            });
        }

        Ok(response.json().await?)
    }
}

/// Combines the advertised codec with its bit depth into one enum value.
fn map_video_codec(codec: &str, bit_depth: &str) -> Option<VideoCodec> {
    let base = normalize_video_codec(codec)?;
    if bit_depth.trim() != "10" {
        return Some(base);
    }
    Some(match base {
        VideoCodec::X265 => VideoCodec::X265_10bit,
        VideoCodec::X264 => VideoCodec::X264_10bit,
        VideoCodec::Av1 => VideoCodec::Av1_10bit,
        other => other,
    })
}

fn map_quality(torrent: &YtsTorrent, runtime_minutes: u32) -> Option<cineflux_model::Quality> {
    if let Some(quality) = normalize_quality(&torrent.quality) {
        return Some(quality);
    }
    // Fall back to a bitrate estimate when the label is unrecognized.
    let codec = map_video_codec(&torrent.video_codec, &torrent.bit_depth)?;
    if runtime_minutes == 0 {
        return None;
    }
    let runtime_seconds = f64::from(runtime_minutes) * 60.0;
    let bitrate_mbps = (torrent.size_bytes as f64 * 8.0) / (runtime_seconds * 1_000_000.0);
    estimate_quality_from_bitrate(codec, bitrate_mbps)
}

fn magnet_link(hash: &str, title: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(title.as_bytes()).collect();
    format!("magnet:?xt=urn:btih:{hash}&dn={encoded}")
}

fn normalize_torrent(torrent: &YtsTorrent, title: &str, runtime_minutes: u32) -> SourceMetadata {
    let quality = map_quality(torrent, runtime_minutes);
    let hash = torrent.hash.to_lowercase();
    SourceMetadata {
        magnet_link: magnet_link(&hash, title),
        hash,
        url: (!torrent.url.is_empty()).then(|| torrent.url.clone()),
        quality,
        video_codec: map_video_codec(&torrent.video_codec, &torrent.bit_depth),
        audio_codec: detect_audio_codec_from_channels(&torrent.audio_channels),
        source: normalize_source_type(&torrent.release_type),
        resolution: quality_to_resolution(quality),
        size: torrent.size_bytes,
        broadcasters: torrent.seeds,
        watchers: torrent.peers,
        bitrate_kbps: approximate_bitrate_kbps(torrent.size_bytes, runtime_minutes),
        language: Vec::new(),
        upload_date: DateTime::<Utc>::from_timestamp(torrent.date_uploaded_unix, 0)
            .unwrap_or_else(Utc::now),
        score: 0.0,
    }
}

#[async_trait]
impl ContentDirectory for YtsDirectory {
    fn name(&self) -> &'static str {
        YTS_NAME
    }

    fn status(&self) -> DirectoryStatus {
        self.tracker.snapshot(YTS_NAME)
    }

    async fn get_movie(&self, imdb_id: &str, high_priority: bool) -> Result<DirectoryMovie> {
        let response = self.fetch_list(imdb_id, high_priority).await?;

        if response.status != "ok" {
            return Err(SourceError::Api {
                directory: YTS_NAME,
                status: 0,
                message: response.status_message,
            });
        }

        let Some(data) = response.data else {
            return Ok(DirectoryMovie::default());
        };
        if data.movie_count == 0 || data.movies.is_empty() {
            debug!(imdb_id, "YTS has no entry for this movie");
            return Ok(DirectoryMovie::default());
        }

        let movie = &data.movies[0];
        let sources = movie
            .torrents
            .iter()
            .filter(|t| !t.hash.is_empty())
            .map(|t| normalize_torrent(t, &movie.title_long, movie.runtime))
            .collect();

        Ok(DirectoryMovie {
            sources,
            trailer_code: movie.yt_trailer_code.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cineflux_model::{AudioCodec, Quality, SourceType};

    #[tokio::test]
    async fn constructor_registers_both_limiter_tiers() {
        let limiters = RateLimiterRegistry::new();
        let directory =
            YtsDirectory::new(reqwest::Client::new(), &DirectoryEndpoint::default(), &limiters);
        assert_eq!(directory.name(), YTS_NAME);
        assert_eq!(limiters.len(), 2);

        // A second client built from the same registry shares the tiers.
        let twin =
            YtsDirectory::new(reqwest::Client::new(), &DirectoryEndpoint::default(), &limiters);
        assert!(Arc::ptr_eq(&directory.limiter, &twin.limiter));
        assert_eq!(limiters.len(), 2);
    }

    fn torrent() -> YtsTorrent {
        YtsTorrent {
            url: "https://example.org/torrent/1".into(),
            hash: "ABCDEF0123456789ABCDEF0123456789ABCDEF01".into(),
            quality: "1080p".into(),
            release_type: "web".into(),
            video_codec: "x265".into(),
            bit_depth: "10".into(),
            audio_channels: "5.1 atmos".into(),
            size_bytes: 2 * 1024 * 1024 * 1024,
            seeds: 120,
            peers: 30,
            date_uploaded_unix: 1_700_000_000,
        }
    }

    #[test]
    fn codec_and_bit_depth_combine() {
        assert_eq!(map_video_codec("x265", "10"), Some(VideoCodec::X265_10bit));
        assert_eq!(map_video_codec("hevc", "8"), Some(VideoCodec::X265));
        assert_eq!(map_video_codec("av1", "10"), Some(VideoCodec::Av1_10bit));
        assert_eq!(map_video_codec("x264", ""), Some(VideoCodec::X264));
        assert_eq!(map_video_codec("unknown", "10"), None);
    }

    #[test]
    fn quality_prefers_the_advertised_label() {
        let t = torrent();
        assert_eq!(map_quality(&t, 120), Some(Quality::Fhd));
    }

    #[test]
    fn quality_falls_back_to_bitrate_estimate() {
        let mut t = torrent();
        t.quality = "unknown-label".into();
        // 2 GiB over 120 minutes is ~2.4 Mbps, FHD territory for HEVC.
        assert_eq!(map_quality(&t, 120), Some(Quality::Fhd));
        // Without a runtime there is nothing to estimate from.
        assert_eq!(map_quality(&t, 0), None);
    }

    #[test]
    fn torrent_normalization_fills_every_field() {
        let t = torrent();
        let meta = normalize_torrent(&t, "Example Movie (2023)", 120);

        assert_eq!(meta.hash, t.hash.to_lowercase());
        assert!(meta.magnet_link.starts_with(&format!(
            "magnet:?xt=urn:btih:{}&dn=Example+Movie",
            t.hash.to_lowercase()
        )));
        assert_eq!(meta.quality, Some(Quality::Fhd));
        assert_eq!(meta.video_codec, Some(VideoCodec::X265_10bit));
        assert_eq!(meta.audio_codec, Some(AudioCodec::Atmos));
        assert_eq!(meta.source, Some(SourceType::Web));
        assert_eq!(meta.resolution.height, 1080);
        assert_eq!(meta.broadcasters, 120);
        assert_eq!(meta.watchers, 30);
        assert!(meta.bitrate_kbps > 2000);
        assert_eq!(meta.score, 0.0);
    }
}
