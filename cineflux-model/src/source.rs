use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codecs::{AudioCodec, VideoCodec};
use crate::quality::{Quality, Resolution};

/// How a release was originally captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Web,
    Bluray,
    Hdtv,
    Dvd,
    Ts,
    Cam,
}

/// Audio languages advertised by a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Language {
    English,
    Spanish,
    French,
    German,
    Italian,
    Portuguese,
    Russian,
    Japanese,
    Korean,
    Chinese,
    Hindi,
    Arabic,
    Dutch,
    /// Multiple audio tracks in a single release.
    Multi,
}

/// Swarm health numbers for a single source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmStats {
    pub broadcasters: u32,
    pub watchers: u32,
}

/// A candidate source as reported by a content directory, before persistence.
///
/// `hash` is always lowercase hex. `score` starts at zero and is assigned by
/// the ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub hash: String,
    pub magnet_link: String,
    pub url: Option<String>,
    pub quality: Option<Quality>,
    pub video_codec: Option<VideoCodec>,
    pub audio_codec: Option<AudioCodec>,
    pub source: Option<SourceType>,
    pub resolution: Resolution,
    pub size: u64,
    pub broadcasters: u32,
    pub watchers: u32,
    pub bitrate_kbps: u32,
    pub language: Vec<Language>,
    pub upload_date: DateTime<Utc>,
    pub score: f64,
}

/// Lifecycle of a persisted source's local payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    #[default]
    Created,
    Downloading,
    Completed,
}

/// A source row as stored by the persistence boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSource {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub directory: String,
    pub hash: String,
    pub magnet_link: String,
    pub url: Option<String>,
    pub quality: Option<Quality>,
    pub video_codec: Option<VideoCodec>,
    pub audio_codec: Option<AudioCodec>,
    pub source: Option<SourceType>,
    pub resolution: Resolution,
    pub size: u64,
    pub broadcasters: u32,
    pub watchers: u32,
    pub bitrate_kbps: u32,
    pub language: Vec<Language>,
    pub upload_date: DateTime<Utc>,
    pub score: f64,
    pub status: SourceStatus,
    pub rejected: bool,
    pub download_percentage: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub next_stats_check_at: Option<DateTime<Utc>>,
    /// Milliseconds between the two most recent stats probes, if any.
    pub last_stats_check_interval_ms: Option<u64>,
}

impl PersistedSource {
    /// Builds a fresh row from directory metadata. The stats schedule starts
    /// unset so the scheduler baselines it on first probe.
    pub fn from_metadata(movie_id: Uuid, directory: &str, meta: SourceMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            movie_id,
            directory: directory.to_owned(),
            hash: meta.hash,
            magnet_link: meta.magnet_link,
            url: meta.url,
            quality: meta.quality,
            video_codec: meta.video_codec,
            audio_codec: meta.audio_codec,
            source: meta.source,
            resolution: meta.resolution,
            size: meta.size,
            broadcasters: meta.broadcasters,
            watchers: meta.watchers,
            bitrate_kbps: meta.bitrate_kbps,
            language: meta.language,
            upload_date: meta.upload_date,
            score: meta.score,
            status: SourceStatus::default(),
            rejected: false,
            download_percentage: 0.0,
            last_used_at: None,
            next_stats_check_at: None,
            last_stats_check_interval_ms: None,
        }
    }

    pub fn is_hevc(&self) -> bool {
        self.video_codec.is_some_and(VideoCodec::is_hevc)
    }
}
