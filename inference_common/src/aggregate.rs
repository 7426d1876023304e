//! Temporal aggregation of per-frame classifications into one video verdict.

use serde::Serialize;

use crate::error::AggregateError;
use crate::prediction::Label;
use crate::rounding;
use crate::timeline::{FramePrediction, SuspiciousFrame};

/// Frames must be fake with more than this confidence to be shortlisted.
pub const SUSPICIOUS_CONFIDENCE: f64 = 0.7;
/// Number of suspicious frames kept for the report.
pub const SUSPICIOUS_FRAME_LIMIT: usize = 5;
/// Shortest run of consecutive fake frames reported as a segment.
pub const MIN_SEGMENT_FRAMES: usize = 2;

/// A maximal run of consecutive face-bearing frames all classified fake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousSegment {
    /// `MM:SS` of the first frame.
    pub start: String,
    /// `MM:SS` of the last frame.
    pub end: String,
    #[serde(serialize_with = "rounding::two_decimals")]
    pub start_seconds: f64,
    #[serde(serialize_with = "rounding::two_decimals")]
    pub end_seconds: f64,
    pub start_frame: u64,
    pub end_frame: u64,
    pub frame_count: usize,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub avg_confidence: f64,
}

/// Verdict and temporal analytics over all face-bearing frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub label: Label,
    pub confidence: f64,
    pub fake_count: usize,
    pub real_count: usize,
    /// Zero when no frame was classified fake.
    pub average_fake_confidence: f64,
    /// Zero when no frame was classified real.
    pub average_real_confidence: f64,
    pub consistency_score: f64,
    pub segments: Vec<SuspiciousSegment>,
}

impl Aggregate {
    pub fn is_deepfake(&self) -> bool {
        self.label.is_fake()
    }

    pub fn total(&self) -> usize {
        self.fake_count + self.real_count
    }

    pub fn fake_fraction(&self) -> f64 {
        self.fake_count as f64 / self.total() as f64
    }
}

/// Combines frame predictions, given in timeline order, into a verdict.
///
/// With both labels present each side scores `mean confidence * share of
/// frames`; the higher score wins and becomes the overall confidence, and an
/// exact tie goes to REAL. When every frame agrees the verdict is that label
/// with the plain mean confidence.
pub fn aggregate(predictions: &[FramePrediction]) -> Result<Aggregate, AggregateError> {
    if predictions.is_empty() {
        return Err(AggregateError::EmptyPredictions);
    }

    let (fake, real): (Vec<&FramePrediction>, Vec<&FramePrediction>) =
        predictions.iter().partition(|p| p.is_fake());
    let total = predictions.len() as f64;
    let average_fake_confidence = mean_confidence(&fake);
    let average_real_confidence = mean_confidence(&real);

    let (label, confidence) = if !fake.is_empty() && !real.is_empty() {
        let fake_weighted = average_fake_confidence * (fake.len() as f64 / total);
        let real_weighted = average_real_confidence * (real.len() as f64 / total);
        if fake_weighted > real_weighted {
            (Label::Fake, fake_weighted)
        } else {
            (Label::Real, real_weighted)
        }
    } else if fake.is_empty() {
        (Label::Real, average_real_confidence)
    } else {
        (Label::Fake, average_fake_confidence)
    };

    Ok(Aggregate {
        label,
        confidence,
        fake_count: fake.len(),
        real_count: real.len(),
        average_fake_confidence,
        average_real_confidence,
        consistency_score: consistency_score(predictions),
        segments: suspicious_segments(predictions),
    })
}

fn mean_confidence(predictions: &[&FramePrediction]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions.iter().map(|p| p.confidence).sum::<f64>() / predictions.len() as f64
}

/// `1 - stdev` of the fake/real labels as 1/0 (population deviation).
/// 1.0 with fewer than two frames.
pub fn consistency_score(predictions: &[FramePrediction]) -> f64 {
    if predictions.len() < 2 {
        return 1.0;
    }
    let n = predictions.len() as f64;
    let values = predictions.iter().map(|p| if p.is_fake() { 1.0 } else { 0.0 });
    let mean = values.clone().sum::<f64>() / n;
    let variance = values.map(|v: f64| (v - mean).powi(2)).sum::<f64>() / n;
    1.0 - variance.sqrt()
}

/// Runs of at least [`MIN_SEGMENT_FRAMES`] consecutive fake predictions.
pub fn suspicious_segments(predictions: &[FramePrediction]) -> Vec<SuspiciousSegment> {
    predictions
        .split(|p| !p.is_fake())
        .filter(|run| run.len() >= MIN_SEGMENT_FRAMES)
        .filter_map(segment_from_run)
        .collect()
}

fn segment_from_run(run: &[FramePrediction]) -> Option<SuspiciousSegment> {
    let first = run.first()?;
    let last = run.last()?;
    Some(SuspiciousSegment {
        start: first.stamp.timestamp_formatted.clone(),
        end: last.stamp.timestamp_formatted.clone(),
        start_seconds: first.stamp.timestamp_seconds,
        end_seconds: last.stamp.timestamp_seconds,
        start_frame: first.stamp.frame_index,
        end_frame: last.stamp.frame_index,
        frame_count: run.len(),
        avg_confidence: run.iter().map(|p| p.confidence).sum::<f64>() / run.len() as f64,
    })
}

pub fn is_suspicious(prediction: &FramePrediction) -> bool {
    prediction.is_fake() && prediction.confidence > SUSPICIOUS_CONFIDENCE
}

/// The most confident fake frames, highest first, at most [`SUSPICIOUS_FRAME_LIMIT`].
pub fn shortlist(mut candidates: Vec<SuspiciousFrame>) -> Vec<SuspiciousFrame> {
    candidates.retain(|frame| is_suspicious(&frame.prediction));
    candidates.sort_by(|a, b| b.prediction.confidence.total_cmp(&a.prediction.confidence));
    candidates.truncate(SUSPICIOUS_FRAME_LIMIT);
    candidates
}
