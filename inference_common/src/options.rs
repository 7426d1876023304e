/// Caller-supplied knobs for one video analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub max_frames: usize,
    pub sample_rate: u64,
    /// Attach base64 JPEG snapshots to timeline and suspicious-frame entries.
    pub include_thumbnails: bool,
}

impl AnalysisOptions {
    pub const MIN_FRAMES: usize = 5;
    pub const MAX_FRAMES: usize = 60;

    /// Clamps `max_frames` into `[MIN_FRAMES, MAX_FRAMES]` and `sample_rate` to at least 1.
    pub fn new(max_frames: usize, sample_rate: u64, include_thumbnails: bool) -> Self {
        Self {
            max_frames: max_frames.clamp(Self::MIN_FRAMES, Self::MAX_FRAMES),
            sample_rate: sample_rate.max(1),
            include_thumbnails,
        }
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::new(30, 10, true)
    }
}
