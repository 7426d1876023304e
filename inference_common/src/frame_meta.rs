use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::rounding;

/// Where a sampled frame sits in the source video and in the sampling plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameStamp {
    /// Index of the frame in the video stream.
    pub frame_index: u64,
    /// Position of the frame in the sampling plan.
    pub sequence_index: usize,
    #[serde(serialize_with = "rounding::two_decimals")]
    pub timestamp_seconds: f64,
    /// `MM:SS` rendering of `timestamp_seconds`.
    pub timestamp_formatted: String,
}

impl FrameStamp {
    /// Timestamps are zero when the frame rate is unknown.
    pub fn new(frame_index: u64, sequence_index: usize, fps: f64) -> Self {
        let timestamp_seconds = if fps > 0.0 {
            frame_index as f64 / fps
        } else {
            0.0
        };
        Self {
            frame_index,
            sequence_index,
            timestamp_seconds,
            timestamp_formatted: format_timestamp(timestamp_seconds),
        }
    }
}

/// Formats seconds as `MM:SS`, truncating fractional seconds.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{minutes:02}:{secs:02}")
}

/// One decoded RGB frame, owned by whichever pipeline stage holds it.
#[derive(Debug)]
pub struct SampledFrame {
    pub stamp: FrameStamp,
    pub image: RgbImage,
}
