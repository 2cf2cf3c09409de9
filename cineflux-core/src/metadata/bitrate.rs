use cineflux_model::{Quality, VideoCodec};

/// Approximate average bitrate in kbps from file size and runtime.
///
/// Zero or missing runtime yields 0 rather than dividing by zero.
pub fn approximate_bitrate_kbps(size_bytes: u64, runtime_minutes: u32) -> u32 {
    if runtime_minutes == 0 {
        return 0;
    }
    let duration_seconds = u64::from(runtime_minutes) * 60;
    let bits_per_second = (size_bytes as f64 * 8.0) / duration_seconds as f64;
    (bits_per_second / 1000.0).round() as u32
}

/// Estimates the quality bucket a file most plausibly holds given its codec
/// efficiency and average bitrate in Mbps.
///
/// Thresholds are per-codec because an AV1 stream at 6 Mbps carries roughly
/// what an H.264 stream needs 20 Mbps for. Codecs without a threshold table
/// return `None`.
pub fn estimate_quality_from_bitrate(codec: VideoCodec, bitrate_mbps: f64) -> Option<Quality> {
    match codec {
        VideoCodec::Av1 | VideoCodec::Av1_10bit => Some(match bitrate_mbps {
            b if b >= 14.0 => Quality::EightK,
            b if b >= 6.0 => Quality::FourK,
            b if b >= 3.5 => Quality::TwoK,
            b if b >= 1.5 => Quality::Fhd,
            b if b >= 1.0 => Quality::Hd,
            _ => Quality::Sd,
        }),
        VideoCodec::X265 | VideoCodec::X265_10bit => Some(match bitrate_mbps {
            b if b >= 20.0 => Quality::EightK,
            b if b >= 10.0 => Quality::FourK,
            b if b >= 4.5 => Quality::TwoK,
            b if b >= 2.0 => Quality::Fhd,
            b if b >= 1.5 => Quality::Hd,
            _ => Quality::Sd,
        }),
        VideoCodec::X264 | VideoCodec::X264_10bit => Some(match bitrate_mbps {
            b if b >= 40.0 => Quality::EightK,
            b if b >= 20.0 => Quality::FourK,
            b if b >= 8.0 => Quality::TwoK,
            b if b >= 4.5 => Quality::Fhd,
            b if b >= 2.5 => Quality::Hd,
            _ => Quality::Sd,
        }),
        VideoCodec::Vp9 => Some(match bitrate_mbps {
            b if b >= 16.0 => Quality::EightK,
            b if b >= 8.0 => Quality::FourK,
            b if b >= 4.0 => Quality::TwoK,
            b if b >= 1.8 => Quality::Fhd,
            b if b >= 1.2 => Quality::Hd,
            _ => Quality::Sd,
        }),
        VideoCodec::Xvid => Some(match bitrate_mbps {
            b if b >= 10.0 => Quality::FourK,
            b if b >= 5.0 => Quality::TwoK,
            b if b >= 2.5 => Quality::Fhd,
            b if b >= 1.25 => Quality::Hd,
            _ => Quality::Sd,
        }),
        _ => None,
    }
}
