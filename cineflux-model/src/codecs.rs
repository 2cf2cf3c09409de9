use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical video codec identifiers.
///
/// The 10-bit variants are distinct values because downstream playback
/// compatibility and scoring treat them differently from their base codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoCodec {
    X265_10bit,
    X264_10bit,
    Av1_10bit,
    X265,
    X264,
    Av1,
    Xvid,
    Vp9,
    Vp8,
    Mpeg2,
    Mpeg4,
    Vc1,
}

impl VideoCodec {
    /// Whether this codec belongs to the HEVC family.
    ///
    /// Some playback clients (notably older TVs) cannot decode HEVC, so the
    /// stream selection layer filters on this.
    pub fn is_hevc(self) -> bool {
        matches!(self, VideoCodec::X265 | VideoCodec::X265_10bit)
    }

    /// Human readable label for display surfaces.
    pub fn display_name(self) -> &'static str {
        match self {
            VideoCodec::X264 => "H.264",
            VideoCodec::X264_10bit => "H.264 (10-bit)",
            VideoCodec::X265 => "HEVC (H.265)",
            VideoCodec::X265_10bit => "HEVC (H.265 10-bit)",
            VideoCodec::Av1 => "AV1",
            VideoCodec::Av1_10bit => "AV1 (10-bit)",
            VideoCodec::Vp9 => "VP9",
            VideoCodec::Vp8 => "VP8",
            VideoCodec::Xvid => "XVID",
            VideoCodec::Mpeg2 => "MPEG-2",
            VideoCodec::Mpeg4 => "MPEG-4",
            VideoCodec::Vc1 => "VC-1",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Canonical audio codec identifiers, ordered roughly by fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioCodec {
    Atmos,
    Truehd,
    DtsHdma,
    DtsHd,
    Dts,
    Eac3,
    Ac3,
    Aac,
    Flac,
    Mp3,
    Pcm,
    Opus,
}

impl AudioCodec {
    pub fn display_name(self) -> &'static str {
        match self {
            AudioCodec::Aac => "AAC",
            AudioCodec::Ac3 => "Dolby Digital (AC3)",
            AudioCodec::Eac3 => "Dolby Digital Plus (E-AC3)",
            AudioCodec::Dts => "DTS",
            AudioCodec::DtsHd => "DTS-HD",
            AudioCodec::DtsHdma => "DTS-HD Master Audio",
            AudioCodec::Truehd => "Dolby TrueHD",
            AudioCodec::Atmos => "Dolby Atmos",
            AudioCodec::Flac => "FLAC",
            AudioCodec::Mp3 => "MP3",
            AudioCodec::Opus => "Opus",
            AudioCodec::Pcm => "PCM",
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
