//! Ranking and filtering of candidate sources for streaming.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use cineflux_model::{PersistedSource, Quality, SourceMetadata, SourceType, VideoCodec};

use crate::metadata::video_codec_quality_bonus;

/// Accessors the ranking pass needs from a source, regardless of whether it
/// came straight from a directory or out of the repository.
pub trait RankableSource {
    fn quality(&self) -> Option<Quality>;
    fn video_codec(&self) -> Option<VideoCodec>;
    fn broadcasters(&self) -> u32;
    fn watchers(&self) -> u32;
    fn size(&self) -> u64;

    fn is_hevc(&self) -> bool {
        self.video_codec().is_some_and(VideoCodec::is_hevc)
    }
}

impl RankableSource for SourceMetadata {
    fn quality(&self) -> Option<Quality> {
        self.quality
    }
    fn video_codec(&self) -> Option<VideoCodec> {
        self.video_codec
    }
    fn broadcasters(&self) -> u32 {
        self.broadcasters
    }
    fn watchers(&self) -> u32 {
        self.watchers
    }
    fn size(&self) -> u64 {
        self.size
    }
}

impl RankableSource for PersistedSource {
    fn quality(&self) -> Option<Quality> {
        self.quality
    }
    fn video_codec(&self) -> Option<VideoCodec> {
        self.video_codec
    }
    fn broadcasters(&self) -> u32 {
        self.broadcasters
    }
    fn watchers(&self) -> u32 {
        self.watchers
    }
    fn size(&self) -> u64 {
        self.size
    }
}

/// Drops HEVC-family sources when the player cannot decode them. With
/// `allow_hevc` the input passes through untouched.
pub fn filter_hevc_sources<S: RankableSource + Clone>(sources: &[S], allow_hevc: bool) -> Vec<S> {
    if allow_hevc {
        return sources.to_vec();
    }
    sources.iter().filter(|s| !s.is_hevc()).cloned().collect()
}

/// Splits sources into (streamable, hevc_excluded). Excluded sources stay
/// visible to the caller instead of silently disappearing.
pub fn partition_streamable<S: RankableSource + Clone>(
    sources: &[S],
    allow_hevc: bool,
) -> (Vec<S>, Vec<S>) {
    if allow_hevc {
        return (sources.to_vec(), Vec::new());
    }
    sources.iter().cloned().partition(|s| !s.is_hevc())
}

fn quality_rank<S: RankableSource>(s: &S) -> u8 {
    s.quality().map(Quality::rank).unwrap_or(0)
}

fn popularity<S: RankableSource>(s: &S) -> u64 {
    u64::from(s.broadcasters()) + u64::from(s.watchers())
}

/// Ordering for streaming: higher quality bucket first, then codec bonus,
/// then popularity. Larger size breaks remaining ties, a heuristic (more
/// bits usually means less aggressive compression).
pub fn compare_sources<S: RankableSource>(a: &S, b: &S) -> Ordering {
    quality_rank(b)
        .cmp(&quality_rank(a))
        .then_with(|| {
            video_codec_quality_bonus(b.video_codec())
                .total_cmp(&video_codec_quality_bonus(a.video_codec()))
        })
        .then_with(|| popularity(b).cmp(&popularity(a)))
        .then_with(|| b.size().cmp(&a.size()))
}

/// Single comparable score for a source, aligned with [`compare_sources`]:
/// the quality bucket dominates, the codec bonus refines it, and popularity
/// adds a small bounded term.
pub fn streaming_score<S: RankableSource>(source: &S) -> f64 {
    let popularity_term = (popularity(source) as f64).min(1000.0) / 10_000.0;
    f64::from(quality_rank(source)) * 10.0
        + video_codec_quality_bonus(source.video_codec())
        + popularity_term
}

/// Sorts best-first and assigns each source its streaming score.
/// Empty input yields empty output, never an error.
pub fn rank_sources(mut sources: Vec<SourceMetadata>) -> Vec<SourceMetadata> {
    for source in &mut sources {
        source.score = streaming_score(source);
    }
    sources.sort_by(compare_sources);
    sources
}

/// Inputs for the 1-to-5 quality score shown on source listings.
#[derive(Debug, Clone)]
pub struct QualityMetrics<'a> {
    pub resolution_label: &'a str,
    pub video_codec: Option<VideoCodec>,
    pub source_type: Option<SourceType>,
    pub file_size: u64,
    /// Broadcaster count, used as the availability signal.
    pub availability: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityLevel {
    High,
    Medium,
    Low,
}

/// Listing-facing quality summary: a 1-5 score, a 0-1 confidence in that
/// score, and a coarse availability bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: f64,
    pub confidence: f64,
    pub availability: AvailabilityLevel,
}

fn source_type_score(source_type: Option<SourceType>) -> f64 {
    match source_type {
        Some(SourceType::Bluray) => 5.0,
        Some(SourceType::Web) => 4.5,
        Some(SourceType::Hdtv) => 3.5,
        Some(SourceType::Dvd) => 3.0,
        Some(SourceType::Ts) => 2.0,
        Some(SourceType::Cam) => 1.0,
        None => 2.5,
    }
}

fn resolution_bonus(label: &str) -> f64 {
    let res = label.to_lowercase();
    if res.contains("2160p") || res.contains("4k") {
        1.5
    } else if res.contains("1440p") || res.contains("2k") {
        1.2
    } else if res.contains("1080p") || res.contains("fhd") {
        1.0
    } else if res.contains("720p") || res.contains("hd") {
        0.5
    } else if res.contains("480p") || res.contains("sd") {
        0.2
    } else {
        0.0
    }
}

fn expected_file_size(label: &str) -> u64 {
    const GIB: u64 = 1024 * 1024 * 1024;
    let res = label.to_lowercase();
    if res.contains("2160p") || res.contains("4k") {
        8 * GIB
    } else if res.contains("1440p") || res.contains("2k") {
        4 * GIB
    } else if res.contains("1080p") || res.contains("fhd") {
        2 * GIB
    } else if res.contains("720p") || res.contains("hd") {
        GIB
    } else if res.contains("480p") || res.contains("sd") {
        7 * GIB / 10
    } else {
        0
    }
}

fn size_adjustment(file_size: u64, label: &str) -> f64 {
    let expected = expected_file_size(label);
    if expected == 0 {
        return 0.0;
    }
    let ratio = file_size as f64 / expected as f64;
    if ratio < 0.3 {
        -1.0
    } else if ratio < 0.5 {
        -0.5
    } else if ratio < 0.7 {
        -0.2
    } else if ratio <= 2.0 {
        0.0
    } else if ratio <= 3.0 {
        0.1
    } else {
        -0.1
    }
}

fn confidence_for(metrics: &QualityMetrics<'_>) -> f64 {
    let mut confidence: f64 = 0.5;

    confidence += if metrics.availability > 50 {
        0.3
    } else if metrics.availability > 10 {
        0.2
    } else if metrics.availability > 0 {
        0.1
    } else {
        -0.2
    };

    if metrics.source_type.is_some() {
        confidence += 0.1;
    }
    if expected_file_size(metrics.resolution_label) > 0 {
        confidence += 0.1;
    }

    confidence.clamp(0.0, 1.0)
}

/// Computes the listing quality summary for one source.
pub fn quality_score(metrics: &QualityMetrics<'_>) -> QualityScore {
    let mut score = source_type_score(metrics.source_type);
    score += resolution_bonus(metrics.resolution_label);
    score += video_codec_quality_bonus(metrics.video_codec);
    score += size_adjustment(metrics.file_size, metrics.resolution_label);
    let score = score.clamp(1.0, 5.0);

    let availability = if metrics.availability >= 20 {
        AvailabilityLevel::High
    } else if metrics.availability >= 5 {
        AvailabilityLevel::Medium
    } else {
        AvailabilityLevel::Low
    };

    QualityScore {
        score: (score * 10.0).round() / 10.0,
        confidence: (confidence_for(metrics) * 100.0).round() / 100.0,
        availability,
    }
}
