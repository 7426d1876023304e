//! Result composition: turns a finished timeline into the report returned to
//! callers, either a verdict or a structured failure.

use std::path::Path;
use std::time::Instant;

use serde::{Serialize, Serializer};

use crate::aggregate::{self, Aggregate};
use crate::interpretation::Interpretation;
use crate::prediction::Label;
use crate::rounding;
use crate::timeline::{FramePrediction, SuspiciousFrame, TimelineEntry};
use crate::video_meta::VideoMeta;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisStats {
    pub frames_extracted: usize,
    pub frames_with_faces: usize,
    pub frames_predicted_fake: usize,
    pub frames_predicted_real: usize,
    #[serde(serialize_with = "rounding::one_decimal")]
    pub fake_percentage: f64,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub average_fake_confidence: f64,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub average_real_confidence: f64,
    #[serde(serialize_with = "rounding::two_decimals")]
    pub processing_time_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoVerdict {
    pub video_path: String,
    pub is_deepfake: bool,
    pub prediction: Label,
    pub confidence: f64,
    pub video_metadata: VideoMeta,
    pub analysis_stats: AnalysisStats,
    /// Every sampled frame, in sampling order.
    pub timeline: Vec<TimelineEntry>,
    pub suspicious_frames: Vec<SuspiciousFrame>,
    pub interpretation: Interpretation,
    pub model_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    OpenFailed,
    NoFrames,
    NoFaces,
    Aggregation,
}

/// A video-level failure with whatever was known when it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisFailure {
    pub error: String,
    pub reason: FailureReason,
    pub video_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_metadata: Option<VideoMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_analyzed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faces_detected: Option<usize>,
    #[serde(serialize_with = "rounding::two_decimals")]
    pub processing_time_seconds: f64,
    pub model_version: String,
}

impl AnalysisFailure {
    pub fn open_failed(
        video_path: &Path,
        error: impl ToString,
        model_version: impl Into<String>,
        started: Instant,
    ) -> Self {
        Self {
            error: error.to_string(),
            reason: FailureReason::OpenFailed,
            video_path: video_path.display().to_string(),
            video_metadata: None,
            frames_analyzed: None,
            faces_detected: None,
            processing_time_seconds: started.elapsed().as_secs_f64(),
            model_version: model_version.into(),
        }
    }
}

/// Outcome of analysing one video. Serialized with a `success` flag next to
/// the body fields.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoReport {
    Verdict(Box<VideoVerdict>),
    Failure(AnalysisFailure),
}

impl VideoReport {
    pub fn is_success(&self) -> bool {
        matches!(self, VideoReport::Verdict(_))
    }

    pub fn verdict(&self) -> Option<&VideoVerdict> {
        match self {
            VideoReport::Verdict(verdict) => Some(verdict.as_ref()),
            VideoReport::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AnalysisFailure> {
        match self {
            VideoReport::Verdict(_) => None,
            VideoReport::Failure(failure) => Some(failure),
        }
    }
}

#[derive(Serialize)]
struct Flagged<'a, T> {
    success: bool,
    #[serde(flatten)]
    body: &'a T,
}

impl Serialize for VideoReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            VideoReport::Verdict(body) => Flagged {
                success: true,
                body: body.as_ref(),
            }
            .serialize(serializer),
            VideoReport::Failure(body) => Flagged {
                success: false,
                body,
            }
            .serialize(serializer),
        }
    }
}

/// Everything the pipeline gathered for one video.
#[derive(Debug)]
pub struct AnalysisRun {
    pub video_path: String,
    pub meta: VideoMeta,
    pub timeline: Vec<TimelineEntry>,
    /// Fake frame candidates, in any order; [`compose_report`] shortlists them.
    pub suspicious: Vec<SuspiciousFrame>,
    pub model_version: String,
    pub started: Instant,
}

impl AnalysisRun {
    fn fail(self, reason: FailureReason, error: impl Into<String>, faces: Option<usize>) -> VideoReport {
        VideoReport::Failure(AnalysisFailure {
            error: error.into(),
            reason,
            video_path: self.video_path,
            video_metadata: Some(self.meta),
            frames_analyzed: Some(self.timeline.len()),
            faces_detected: faces,
            processing_time_seconds: self.started.elapsed().as_secs_f64(),
            model_version: self.model_version,
        })
    }
}

/// Aggregates the face-bearing frames of `run` and assembles the report.
pub fn compose_report(mut run: AnalysisRun) -> VideoReport {
    run.timeline.sort_by_key(|entry| entry.stamp().sequence_index);

    if run.timeline.is_empty() {
        log::warn!("No frames extracted from {}", run.video_path);
        return run.fail(FailureReason::NoFrames, "No frames extracted", None);
    }

    let predictions: Vec<FramePrediction> = run
        .timeline
        .iter()
        .filter_map(TimelineEntry::prediction)
        .cloned()
        .collect();
    if predictions.is_empty() {
        log::warn!(
            "No faces detected in {} ({} frames)",
            run.video_path,
            run.timeline.len()
        );
        return run.fail(FailureReason::NoFaces, "No faces detected in video", Some(0));
    }

    let aggregate = match aggregate::aggregate(&predictions) {
        Ok(aggregate) => aggregate,
        Err(err) => {
            log::error!("Aggregation failed for {}: {err}", run.video_path);
            let faces = predictions.len();
            return run.fail(FailureReason::Aggregation, err.to_string(), Some(faces));
        }
    };

    let processing_time_seconds = run.started.elapsed().as_secs_f64();
    let analysis_stats = stats(&aggregate, run.timeline.len(), processing_time_seconds);
    log::info!(
        "Analysis complete: {} ({:.1}%)",
        aggregate.label,
        aggregate.confidence * 100.0
    );

    VideoReport::Verdict(Box::new(VideoVerdict {
        video_path: run.video_path,
        is_deepfake: aggregate.is_deepfake(),
        prediction: aggregate.label,
        confidence: aggregate.confidence,
        video_metadata: run.meta,
        analysis_stats,
        timeline: run.timeline,
        suspicious_frames: aggregate::shortlist(run.suspicious),
        interpretation: Interpretation::new(&aggregate),
        model_version: run.model_version,
    }))
}

fn stats(aggregate: &Aggregate, frames_extracted: usize, processing_time_seconds: f64) -> AnalysisStats {
    AnalysisStats {
        frames_extracted,
        frames_with_faces: aggregate.total(),
        frames_predicted_fake: aggregate.fake_count,
        frames_predicted_real: aggregate.real_count,
        fake_percentage: aggregate.fake_fraction() * 100.0,
        average_fake_confidence: aggregate.average_fake_confidence,
        average_real_confidence: aggregate.average_real_confidence,
        processing_time_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_meta::FrameStamp;
    use crate::prediction::Prediction;

    fn run(timeline: Vec<TimelineEntry>) -> AnalysisRun {
        AnalysisRun {
            video_path: "clip.mp4".to_string(),
            meta: VideoMeta::new(300, 30.0, 640, 480),
            timeline,
            suspicious: Vec::new(),
            model_version: "test".to_string(),
            started: Instant::now(),
        }
    }

    fn face(sequence: usize, real: f64, fake: f64) -> TimelineEntry {
        let stamp = FrameStamp::new(sequence as u64 * 10, sequence, 30.0);
        TimelineEntry::Face {
            prediction: FramePrediction::new(stamp, &Prediction::from_probabilities(real, fake)),
            thumbnail_base64: None,
        }
    }

    fn no_face(sequence: usize) -> TimelineEntry {
        TimelineEntry::NoFace(FrameStamp::new(sequence as u64 * 10, sequence, 30.0))
    }

    #[test]
    fn empty_timeline_is_a_no_frames_failure() {
        let report = compose_report(run(Vec::new()));
        let failure = report.failure().unwrap();
        assert_eq!(failure.reason, FailureReason::NoFrames);
        assert_eq!(failure.frames_analyzed, Some(0));
    }

    #[test]
    fn faceless_video_reports_zero_faces() {
        let report = compose_report(run(vec![no_face(0), no_face(1), no_face(2)]));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "No faces detected in video");
        assert_eq!(json["reason"], "no_faces");
        assert_eq!(json["faces_detected"], 0);
        assert_eq!(json["frames_analyzed"], 3);
        assert_eq!(json["video_metadata"]["resolution"], "640x480");
        assert_eq!(json["model_version"], "test");
    }

    #[test]
    fn open_failure_carries_model_version() {
        let failure = AnalysisFailure::open_failed(
            Path::new("missing.mp4"),
            "Unable to open video",
            "ConvNeXt-Base v3",
            Instant::now(),
        );
        let json = serde_json::to_value(VideoReport::Failure(failure)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "open_failed");
        assert_eq!(json["model_version"], "ConvNeXt-Base v3");
        assert!(json.get("video_metadata").is_none());
    }

    #[test]
    fn timeline_is_restored_to_sampling_order() {
        let report = compose_report(run(vec![face(2, 0.1, 0.9), no_face(0), face(1, 0.2, 0.8)]));
        let verdict = report.verdict().unwrap();
        let order: Vec<usize> = verdict
            .timeline
            .iter()
            .map(|entry| entry.stamp().sequence_index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(verdict.interpretation.temporal_analysis.suspicious_segments_count, 1);
    }

    #[test]
    fn verdict_serializes_with_stats() {
        let report = compose_report(run(vec![
            face(0, 0.9, 0.1),
            no_face(1),
            face(2, 0.2, 0.8),
            face(3, 0.7, 0.3),
        ]));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["prediction"], "REAL");
        assert_eq!(json["model_version"], "test");
        let stats = &json["analysis_stats"];
        assert_eq!(stats["frames_extracted"], 4);
        assert_eq!(stats["frames_with_faces"], 3);
        assert_eq!(stats["frames_predicted_fake"], 1);
        assert_eq!(stats["fake_percentage"], 33.3);
        assert_eq!(stats["average_real_confidence"], 0.8);
        assert_eq!(json["timeline"].as_array().unwrap().len(), 4);
        assert_eq!(json["interpretation"]["confidence_level"], "Low confidence");
    }
}
