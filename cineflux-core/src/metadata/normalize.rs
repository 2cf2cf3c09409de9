use once_cell::sync::Lazy;
use regex::Regex;

use cineflux_model::{AudioCodec, Quality, SourceType, VideoCodec};

fn has_10bit(s: &str) -> bool {
    s.contains("10bit") || s.contains("10-bit")
}

/// Maps a free-text codec string to a canonical video codec.
///
/// 10-bit variants are matched before their base forms, and more specific
/// substrings before generic ones, so "x265 10bit" never degrades to plain
/// X265 and "h.265" never falls through to unknown.
pub fn normalize_video_codec(codec: &str) -> Option<VideoCodec> {
    let lower = codec.to_lowercase();

    if lower.contains("x265") && has_10bit(&lower) {
        return Some(VideoCodec::X265_10bit);
    }
    if lower.contains("x264") && has_10bit(&lower) {
        return Some(VideoCodec::X264_10bit);
    }
    if lower.contains("av1") && has_10bit(&lower) {
        return Some(VideoCodec::Av1_10bit);
    }

    if lower.contains("x265") || lower.contains("hevc") || lower.contains("h.265") {
        return Some(VideoCodec::X265);
    }
    if lower.contains("x264") || lower.contains("h.264") || lower.contains("avc") {
        return Some(VideoCodec::X264);
    }
    if lower.contains("av1") {
        return Some(VideoCodec::Av1);
    }
    if lower.contains("vp9") {
        return Some(VideoCodec::Vp9);
    }
    if lower.contains("vp8") {
        return Some(VideoCodec::Vp8);
    }
    if lower.contains("xvid") {
        return Some(VideoCodec::Xvid);
    }
    if lower.contains("mpeg2") || lower.contains("mpeg-2") {
        return Some(VideoCodec::Mpeg2);
    }
    if lower.contains("mpeg4") || lower.contains("mpeg-4") || lower.contains("divx") {
        return Some(VideoCodec::Mpeg4);
    }
    if lower.contains("vc1") || lower.contains("vc-1") {
        return Some(VideoCodec::Vc1);
    }

    None
}

/// Maps a free-text audio codec string to a canonical audio codec.
pub fn normalize_audio_codec(codec: &str) -> Option<AudioCodec> {
    let lower = codec.to_lowercase();

    if lower.contains("truehd") || lower.contains("true-hd") {
        return Some(AudioCodec::Truehd);
    }
    if lower.contains("atmos") {
        return Some(AudioCodec::Atmos);
    }
    if lower.contains("dts-hd-ma") || lower.contains("dts hd ma") || lower.contains("dts-hd ma") {
        return Some(AudioCodec::DtsHdma);
    }
    if lower.contains("dts-hd") || lower.contains("dts hd") {
        return Some(AudioCodec::DtsHd);
    }
    if lower.contains("dts") {
        return Some(AudioCodec::Dts);
    }
    if lower.contains("eac3") || lower.contains("e-ac3") || lower.contains("dd+") || lower.contains("ddp") {
        return Some(AudioCodec::Eac3);
    }
    if lower.contains("ac3") || lower.contains("dolby digital") {
        return Some(AudioCodec::Ac3);
    }
    if lower.contains("aac") {
        return Some(AudioCodec::Aac);
    }
    if lower.contains("flac") {
        return Some(AudioCodec::Flac);
    }
    if lower.contains("mp3") {
        return Some(AudioCodec::Mp3);
    }
    if lower.contains("pcm") || lower.contains("lpcm") {
        return Some(AudioCodec::Pcm);
    }
    if lower.contains("opus") {
        return Some(AudioCodec::Opus);
    }

    None
}

/// Maps audio channel descriptors ("5.1 atmos", "2.0 aac") to a codec.
pub fn detect_audio_codec_from_channels(audio_channels: &str) -> Option<AudioCodec> {
    let lower = audio_channels.to_lowercase();

    if lower.contains("atmos") {
        return Some(AudioCodec::Atmos);
    }
    if lower.contains("truehd") {
        return Some(AudioCodec::Truehd);
    }
    if lower.contains("dts-hd ma") || lower.contains("dts-hdma") {
        return Some(AudioCodec::DtsHdma);
    }
    if lower.contains("dts-hd") {
        return Some(AudioCodec::DtsHd);
    }
    if lower.contains("dts") {
        return Some(AudioCodec::Dts);
    }
    if lower.contains("dd+") || lower.contains("ddp") || lower.contains("eac3") {
        return Some(AudioCodec::Eac3);
    }
    if lower.contains("ac3") || lower.contains("dolby digital") {
        return Some(AudioCodec::Ac3);
    }
    if lower.contains("aac") {
        return Some(AudioCodec::Aac);
    }
    if lower.contains("flac") {
        return Some(AudioCodec::Flac);
    }
    if lower.contains("opus") {
        return Some(AudioCodec::Opus);
    }
    if lower.contains("mp3") {
        return Some(AudioCodec::Mp3);
    }

    None
}

/// Maps a quality label ("2160p", "FHD", "3D") to a quality bucket.
pub fn normalize_quality(label: &str) -> Option<Quality> {
    match label.to_lowercase().trim() {
        "4320p" | "8k" => Some(Quality::EightK),
        "2160p" | "4k" => Some(Quality::FourK),
        "1440p" | "2k" => Some(Quality::TwoK),
        // 3D releases are encoded at 1080p per eye.
        "1080p" | "fhd" | "3d" => Some(Quality::Fhd),
        "720p" | "hd" => Some(Quality::Hd),
        "480p" | "sd" => Some(Quality::Sd),
        _ => None,
    }
}

static BLURAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"blu-?ray|bdremux|bdrip|bd$").unwrap());
static DVD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"dvd|dvdrip|dvdscr$").unwrap());
static WEB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^web|webrip|web-dl|webdl|web-rip$").unwrap());
static HDTV_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tv|hdtv|pdtv|sdtv$").unwrap());
static TS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ts$|telesync").unwrap());
static CAM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^cam|telecine|tc$").unwrap());
static SCREENER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"scr|screener").unwrap());

/// Maps a release type string ("WEB-DL", "BluRay", "telesync") to an origin
/// type. Screeners count as DVD quality.
pub fn normalize_source_type(release_type: &str) -> Option<SourceType> {
    let normalized = release_type.to_lowercase();
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return None;
    }

    if BLURAY_RE.is_match(normalized) {
        return Some(SourceType::Bluray);
    }
    if DVD_RE.is_match(normalized) {
        return Some(SourceType::Dvd);
    }
    if WEB_RE.is_match(normalized) {
        return Some(SourceType::Web);
    }
    if HDTV_RE.is_match(normalized) {
        return Some(SourceType::Hdtv);
    }
    if TS_RE.is_match(normalized) {
        return Some(SourceType::Ts);
    }
    if CAM_RE.is_match(normalized) {
        return Some(SourceType::Cam);
    }
    if SCREENER_RE.is_match(normalized) {
        return Some(SourceType::Dvd);
    }

    None
}

/// Fixed score bonus per video codec. Modern efficient codecs score higher.
pub fn video_codec_quality_bonus(codec: Option<VideoCodec>) -> f64 {
    match codec {
        Some(VideoCodec::X265) | Some(VideoCodec::X265_10bit) => 0.5,
        Some(VideoCodec::Av1) | Some(VideoCodec::Av1_10bit) => 0.4,
        Some(VideoCodec::X264) | Some(VideoCodec::X264_10bit) => 0.3,
        Some(VideoCodec::Vp9) => 0.2,
        Some(VideoCodec::Vp8) | Some(VideoCodec::Xvid) | Some(VideoCodec::Mpeg4) => 0.1,
        _ => 0.0,
    }
}
