//! Selection of the frame indices to decode from a video.

/// Ordered frame indices to decode, at most `max_frames` of them.
///
/// Short videos are sampled every `sample_rate` frames from the start. Once
/// the video is longer than `max_frames * sample_rate` frames the samples
/// are spread evenly across the whole video instead, so the tail is never
/// ignored. Indices stay inside `[0, total_frames)` and never decrease.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplingPlan {
    indices: Vec<u64>,
}

impl SamplingPlan {
    pub fn new(total_frames: u64, max_frames: usize, sample_rate: u64) -> Self {
        if total_frames == 0 || max_frames == 0 {
            return Self::default();
        }
        let sample_rate = sample_rate.max(1);
        let span = (max_frames as u64).saturating_mul(sample_rate);

        let mut indices: Vec<u64> = if total_frames <= span {
            (0..total_frames).step_by(sample_rate as usize).collect()
        } else {
            evenly_spaced(total_frames - 1, max_frames)
        };
        indices.truncate(max_frames);

        Self { indices }
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// `count` points from 0 to `last` inclusive, truncated to integers.
fn evenly_spaced(last: u64, count: usize) -> Vec<u64> {
    if count == 1 {
        return vec![0];
    }
    let step = last as f64 / (count - 1) as f64;
    (0..count)
        .map(|i| {
            if i == count - 1 {
                last
            } else {
                ((i as f64 * step).floor() as u64).min(last)
            }
        })
        .collect()
}
