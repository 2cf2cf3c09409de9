//! Normalization of raw provider strings into model enums.
//!
//! Everything here is pure: unknown input maps to `None` or zero, never an
//! error.

mod bitrate;
mod normalize;

pub use bitrate::{approximate_bitrate_kbps, estimate_quality_from_bitrate};
pub use normalize::{
    detect_audio_codec_from_channels, normalize_audio_codec, normalize_quality,
    normalize_source_type, normalize_video_codec, video_codec_quality_bonus,
};
