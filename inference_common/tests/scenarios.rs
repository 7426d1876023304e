use std::time::Instant;

use inference_common::frame_meta::FrameStamp;
use inference_common::prediction::Prediction;
use inference_common::report::{compose_report, AnalysisRun, FailureReason};
use inference_common::timeline::{FramePrediction, SuspiciousFrame, TimelineEntry};
use inference_common::video_meta::VideoMeta;

const FPS: f64 = 30.0;

fn stamp(sequence: usize) -> FrameStamp {
    FrameStamp::new(sequence as u64 * 30, sequence, FPS)
}

fn real(sequence: usize, confidence: f64) -> FramePrediction {
    FramePrediction::new(
        stamp(sequence),
        &Prediction::from_probabilities(confidence, 1.0 - confidence),
    )
}

fn fake(sequence: usize, confidence: f64) -> FramePrediction {
    FramePrediction::new(
        stamp(sequence),
        &Prediction::from_probabilities(1.0 - confidence, confidence),
    )
}

fn run_of(predictions: Vec<FramePrediction>) -> AnalysisRun {
    let suspicious = predictions
        .iter()
        .filter(|p| p.is_fake())
        .map(|p| SuspiciousFrame {
            prediction: p.clone(),
            thumbnail_base64: None,
        })
        .collect();
    let timeline = predictions
        .into_iter()
        .map(|prediction| TimelineEntry::Face {
            prediction,
            thumbnail_base64: None,
        })
        .collect();
    AnalysisRun {
        video_path: "synthetic.mp4".to_string(),
        meta: VideoMeta::new(300, FPS, 1280, 720),
        timeline,
        suspicious,
        model_version: "ConvNeXt-Base v3".to_string(),
        started: Instant::now(),
    }
}

#[test]
fn brief_fake_burst_stays_real() {
    let mut predictions: Vec<_> = (0..10).map(|i| real(i, 0.9)).collect();
    predictions[2] = fake(2, 0.9);
    predictions[3] = fake(3, 0.8);

    let report = compose_report(run_of(predictions));
    let verdict = report.verdict().expect("verdict");
    assert!(!verdict.is_deepfake);

    let temporal = &verdict.interpretation.temporal_analysis;
    assert_eq!(temporal.suspicious_segments_count, 1);
    let segment = &temporal.suspicious_segments[0];
    assert_eq!(segment.frame_count, 2);
    assert!((segment.avg_confidence - 0.85).abs() < 1e-9);
    assert_eq!(segment.start, "00:02");
    assert_eq!(segment.end, "00:03");
    assert!((temporal.consistency_score - 0.6).abs() < 1e-9);

    // 0.9 and 0.8 both clear the shortlist threshold.
    assert_eq!(verdict.suspicious_frames.len(), 2);
    assert_eq!(verdict.suspicious_frames[0].prediction.confidence, 0.9);
}

#[test]
fn all_fake_video_is_flagged() {
    let predictions: Vec<_> = (0..8).map(|i| fake(i, 0.95)).collect();
    let report = compose_report(run_of(predictions));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["is_deepfake"], true);
    assert_eq!(json["prediction"], "FAKE");
    assert!((json["confidence"].as_f64().unwrap() - 0.95).abs() < 1e-9);
    assert_eq!(json["analysis_stats"]["fake_percentage"], 100.0);
    assert_eq!(json["analysis_stats"]["average_real_confidence"], 0.0);
    assert_eq!(json["suspicious_frames"].as_array().unwrap().len(), 5);

    let interpretation = &json["interpretation"];
    assert_eq!(interpretation["summary"], "Deepfake detected with 95.0% confidence");
    assert_eq!(interpretation["confidence_color"], "#10B981");
    assert_eq!(interpretation["temporal_analysis"]["consistency_score"], 1.0);
    let segments = interpretation["temporal_analysis"]["suspicious_segments"]
        .as_array()
        .unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0]["frame_count"], 8);
}

#[test]
fn no_face_frames_do_not_break_a_segment() {
    let mut run = run_of(vec![fake(0, 0.9), fake(2, 0.9), real(3, 0.95), real(4, 0.95)]);
    run.timeline.push(TimelineEntry::NoFace(stamp(1)));
    run.timeline.push(TimelineEntry::Failed {
        stamp: stamp(5),
        error: "classification failed".to_string(),
    });

    let report = compose_report(run);
    let verdict = report.verdict().expect("verdict");
    assert_eq!(verdict.timeline.len(), 6);
    assert_eq!(verdict.analysis_stats.frames_with_faces, 4);
    let segments = &verdict.interpretation.temporal_analysis.suspicious_segments;
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].start_frame, 0);
    assert_eq!(segments[0].end_frame, 60);
}

#[test]
fn only_failed_frames_is_no_faces() {
    let mut run = run_of(Vec::new());
    run.timeline = (0..4)
        .map(|i| TimelineEntry::Failed {
            stamp: stamp(i),
            error: "boom".to_string(),
        })
        .collect();
    let report = compose_report(run);
    let failure = report.failure().expect("failure");
    assert_eq!(failure.reason, FailureReason::NoFaces);
    assert_eq!(failure.faces_detected, Some(0));
    assert_eq!(failure.frames_analyzed, Some(4));
    assert!(!failure.error.is_empty());
}
