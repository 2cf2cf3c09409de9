use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete quality tiers used across the acquisition pipeline.
///
/// Ordering helpers rank these by fidelity, not by declaration order, so
/// callers should go through [`Quality::rank`] rather than deriving `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "8K")]
    EightK,
    #[serde(rename = "4K")]
    FourK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "FHD")]
    Fhd,
    #[serde(rename = "HD")]
    Hd,
    #[serde(rename = "SD")]
    Sd,
}

impl Quality {
    /// Fidelity rank, higher is better. SD maps to 0 and 8K to 5.
    pub fn rank(self) -> u8 {
        match self {
            Quality::Sd => 0,
            Quality::Hd => 1,
            Quality::Fhd => 2,
            Quality::TwoK => 3,
            Quality::FourK => 4,
            Quality::EightK => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quality::EightK => "8K",
            Quality::FourK => "4K",
            Quality::TwoK => "2K",
            Quality::Fhd => "FHD",
            Quality::Hd => "HD",
            Quality::Sd => "SD",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pixel dimensions paired with a display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub label: String,
}

/// Maps a quality tier to its nominal 16:9 resolution.
///
/// Unknown quality yields a zero-sized "Unknown" resolution rather than an
/// error so callers can always render something.
pub fn quality_to_resolution(quality: Option<Quality>) -> Resolution {
    let (width, height, label) = match quality {
        Some(Quality::EightK) => (7680, 4320, "8K"),
        Some(Quality::FourK) => (3840, 2160, "4K"),
        Some(Quality::TwoK) => (2560, 1440, "2K"),
        Some(Quality::Fhd) => (1920, 1080, "FHD"),
        Some(Quality::Hd) => (1280, 720, "HD"),
        Some(Quality::Sd) => (720, 480, "SD"),
        None => (0, 0, "Unknown"),
    };
    Resolution {
        width,
        height,
        label: label.to_owned(),
    }
}
