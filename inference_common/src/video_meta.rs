use serde::{Deserialize, Serialize};

use crate::rounding;
use crate::sampling::SamplingPlan;

/// Properties of an opened video container.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VideoMeta {
    pub total_frames: u64,
    /// Frames per second, zero when the container does not report a usable rate.
    #[serde(serialize_with = "rounding::two_decimals")]
    pub fps: f64,
    #[serde(serialize_with = "rounding::two_decimals")]
    pub duration_seconds: f64,
    pub resolution: String,
    pub width: u32,
    pub height: u32,
}

impl VideoMeta {
    pub fn new(total_frames: u64, fps: f64, width: u32, height: u32) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 0.0 };
        let duration_seconds = if fps > 0.0 {
            total_frames as f64 / fps
        } else {
            0.0
        };
        Self {
            total_frames,
            fps,
            duration_seconds,
            resolution: format!("{width}x{height}"),
            width,
            height,
        }
    }

    pub fn sampling_plan(&self, max_frames: usize, sample_rate: u64) -> SamplingPlan {
        SamplingPlan::new(self.total_frames, max_frames, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_frame_count_and_rate() {
        let meta = VideoMeta::new(300, 30.0, 1280, 720);
        assert_eq!(meta.duration_seconds, 10.0);
        assert_eq!(meta.resolution, "1280x720");
    }

    #[test]
    fn zero_or_invalid_rate_means_zero_duration() {
        assert_eq!(VideoMeta::new(300, 0.0, 640, 480).duration_seconds, 0.0);
        let nan = VideoMeta::new(300, f64::NAN, 640, 480);
        assert_eq!(nan.fps, 0.0);
        assert_eq!(nan.duration_seconds, 0.0);
    }

    #[test]
    fn serializes_rounded_rate() {
        let meta = VideoMeta::new(1000, 29.97002997, 640, 480);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["fps"], 29.97);
        assert_eq!(json["duration_seconds"], 33.37);
    }
}
