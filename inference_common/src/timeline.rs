//! Per-frame records produced by the pipeline, in sampling order.

use serde::Serialize;

use crate::frame_meta::FrameStamp;
use crate::prediction::{Label, Prediction, Probabilities};

/// Classification of one face-bearing frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePrediction {
    pub stamp: FrameStamp,
    pub label: Label,
    pub confidence: f64,
    pub probabilities: Probabilities,
}

impl FramePrediction {
    pub fn new(stamp: FrameStamp, prediction: &Prediction) -> Self {
        Self {
            stamp,
            label: prediction.prediction,
            confidence: prediction.confidence,
            probabilities: prediction.probabilities,
        }
    }

    pub fn is_fake(&self) -> bool {
        self.label.is_fake()
    }
}

/// One sampled frame in the report timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "TimelineRecord")]
pub enum TimelineEntry {
    Face {
        prediction: FramePrediction,
        thumbnail_base64: Option<String>,
    },
    NoFace(FrameStamp),
    /// Locating or classifying this frame failed; the error is kept for the report.
    Failed { stamp: FrameStamp, error: String },
}

impl TimelineEntry {
    pub fn stamp(&self) -> &FrameStamp {
        match self {
            TimelineEntry::Face { prediction, .. } => &prediction.stamp,
            TimelineEntry::NoFace(stamp) => stamp,
            TimelineEntry::Failed { stamp, .. } => stamp,
        }
    }

    pub fn prediction(&self) -> Option<&FramePrediction> {
        match self {
            TimelineEntry::Face { prediction, .. } => Some(prediction),
            TimelineEntry::NoFace(_) | TimelineEntry::Failed { .. } => None,
        }
    }

    pub fn face_detected(&self) -> bool {
        self.prediction().is_some()
    }
}

/// A frame confidently classified as fake, kept for the report shortlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "TimelineRecord")]
pub struct SuspiciousFrame {
    pub prediction: FramePrediction,
    pub thumbnail_base64: Option<String>,
}

/// Flat wire shape shared by timeline entries and suspicious frames.
#[derive(Serialize)]
struct TimelineRecord {
    #[serde(flatten)]
    stamp: FrameStamp,
    face_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_fake: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prob_real: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prob_fake: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail_base64: Option<String>,
}

impl TimelineRecord {
    fn bare(stamp: FrameStamp) -> Self {
        Self {
            stamp,
            face_detected: false,
            is_fake: None,
            prediction: None,
            confidence: None,
            prob_real: None,
            prob_fake: None,
            error: None,
            thumbnail_base64: None,
        }
    }

    fn classified(prediction: FramePrediction, thumbnail_base64: Option<String>) -> Self {
        Self {
            face_detected: true,
            is_fake: Some(prediction.is_fake()),
            prediction: Some(prediction.label),
            confidence: Some(prediction.confidence),
            prob_real: Some(prediction.probabilities.real),
            prob_fake: Some(prediction.probabilities.fake),
            thumbnail_base64,
            ..Self::bare(prediction.stamp)
        }
    }
}

impl From<TimelineEntry> for TimelineRecord {
    fn from(entry: TimelineEntry) -> Self {
        match entry {
            TimelineEntry::Face {
                prediction,
                thumbnail_base64,
            } => Self::classified(prediction, thumbnail_base64),
            TimelineEntry::NoFace(stamp) => Self::bare(stamp),
            TimelineEntry::Failed { stamp, error } => Self {
                error: Some(error),
                ..Self::bare(stamp)
            },
        }
    }
}

impl From<SuspiciousFrame> for TimelineRecord {
    fn from(frame: SuspiciousFrame) -> Self {
        Self::classified(frame.prediction, frame.thumbnail_base64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(index: u64) -> FrameStamp {
        FrameStamp::new(index, index as usize, 25.0)
    }

    #[test]
    fn face_entry_carries_classification_fields() {
        let prediction = FramePrediction::new(stamp(50), &Prediction::from_probabilities(0.1, 0.9));
        let entry = TimelineEntry::Face {
            prediction,
            thumbnail_base64: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["face_detected"], true);
        assert_eq!(json["is_fake"], true);
        assert_eq!(json["prediction"], "FAKE");
        assert_eq!(json["frame_index"], 50);
        assert_eq!(json["timestamp_formatted"], "00:02");
        assert!(json.get("thumbnail_base64").is_none());
    }

    #[test]
    fn no_face_entry_has_no_classification_fields() {
        let entry = TimelineEntry::NoFace(stamp(3));
        assert!(!entry.face_detected());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["face_detected"], false);
        for key in ["is_fake", "prediction", "confidence", "prob_real", "prob_fake", "error"] {
            assert!(json.get(key).is_none(), "unexpected key {key}");
        }
    }

    #[test]
    fn failed_entry_reports_error() {
        let entry = TimelineEntry::Failed {
            stamp: stamp(7),
            error: "inference failed: boom".to_string(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["face_detected"], false);
        assert_eq!(json["error"], "inference failed: boom");
    }
}
