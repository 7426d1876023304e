//! Human-readable reading of an [`Aggregate`], driven by fixed threshold tables.

use serde::Serialize;

use crate::aggregate::{Aggregate, SuspiciousSegment};
use crate::rounding;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalAnalysis {
    pub has_suspicious_segments: bool,
    pub suspicious_segments_count: usize,
    pub suspicious_segments: Vec<SuspiciousSegment>,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub consistency_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpretation {
    pub summary: String,
    pub key_points: Vec<String>,
    pub confidence_level: &'static str,
    pub confidence_color: &'static str,
    pub temporal_analysis: TemporalAnalysis,
    pub recommendation: &'static str,
}

/// Lower bound, label and display color, highest band first.
const CONFIDENCE_BANDS: [(f64, &str, &str); 3] = [
    (0.9, "Very high confidence", "#10B981"),
    (0.75, "High confidence", "#34D399"),
    (0.6, "Moderate confidence", "#F59E0B"),
];
const LOW_CONFIDENCE: (&str, &str) = ("Low confidence", "#EF4444");

pub fn confidence_band(confidence: f64) -> (&'static str, &'static str) {
    CONFIDENCE_BANDS
        .iter()
        .find(|(floor, _, _)| confidence >= *floor)
        .map(|&(_, level, color)| (level, color))
        .unwrap_or(LOW_CONFIDENCE)
}

pub fn summary(is_deepfake: bool, confidence: f64) -> String {
    let verdict = if is_deepfake {
        "Deepfake detected"
    } else {
        "Authentic video"
    };
    format!("{verdict} with {:.1}% confidence", confidence * 100.0)
}

pub fn key_points(aggregate: &Aggregate) -> Vec<String> {
    let fake_fraction = aggregate.fake_fraction();
    let mut points = Vec::new();
    if aggregate.is_deepfake() {
        let extent = if fake_fraction > 0.8 {
            "Consistent manipulation detected throughout the entire video."
        } else if fake_fraction > 0.5 {
            "Manipulation detected in the majority of analyzed frames."
        } else {
            "Signs of manipulation detected in certain portions of the video."
        };
        points.push(extent.to_string());
        if !aggregate.segments.is_empty() {
            points.push(format!(
                "Suspicious segments identified: {}",
                aggregate.segments.len()
            ));
        }
    } else if aggregate.real_count as f64 / aggregate.total() as f64 > 0.9 {
        points.push("No signs of manipulation detected.".to_string());
    } else {
        points.push("The video appears authentic despite a few ambiguous frames.".to_string());
    }
    points
}

pub fn recommendation(aggregate: &Aggregate) -> &'static str {
    let confidence = aggregate.confidence;
    if aggregate.is_deepfake() {
        if confidence >= 0.85 && aggregate.fake_fraction() > 0.7 {
            "This video shows strong indicators of manipulation. We strongly recommend not considering it authentic."
        } else if confidence >= 0.7 {
            "Significant signs of manipulation have been detected. A thorough manual review is recommended."
        } else {
            "Anomalies have been detected, but the result is uncertain. An expert review is recommended."
        }
    } else if confidence >= 0.85 {
        "This video appears authentic. No signs of manipulation detected."
    } else if confidence >= 0.7 {
        "The video appears likely authentic, but a few frames show minor ambiguities."
    } else {
        "The model leans toward authenticity but with limited confidence. Further analysis may be helpful."
    }
}

impl Interpretation {
    pub fn new(aggregate: &Aggregate) -> Self {
        let (confidence_level, confidence_color) = confidence_band(aggregate.confidence);
        Self {
            summary: summary(aggregate.is_deepfake(), aggregate.confidence),
            key_points: key_points(aggregate),
            confidence_level,
            confidence_color,
            temporal_analysis: TemporalAnalysis {
                has_suspicious_segments: !aggregate.segments.is_empty(),
                suspicious_segments_count: aggregate.segments.len(),
                suspicious_segments: aggregate.segments.clone(),
                consistency_score: aggregate.consistency_score,
            },
            recommendation: recommendation(aggregate),
        }
    }
}
