//! Extractor -> face locator -> classifier -> aggregation, for one video.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use inference_common::aggregate;
use inference_common::error::FrameError;
use inference_common::face::{FaceBox, FaceDetection, FaceLocator};
use inference_common::frame_meta::SampledFrame;
use inference_common::options::AnalysisOptions;
use inference_common::prediction::Classifier;
use inference_common::report::{compose_report, AnalysisFailure, AnalysisRun, VideoReport};
use inference_common::timeline::{FramePrediction, SuspiciousFrame, TimelineEntry};
use inference_common::video_meta::VideoMeta;
use ort_common::classifier::MODEL_VERSION;

use crate::extractor;
use crate::thumbnail::{self, TIMELINE_THUMBNAIL_SIZE};

/// Runs deepfake analysis over sampled frames with shared, read-only models.
/// Cheap to clone; one analyzer can serve concurrent requests.
#[derive(Clone)]
pub struct VideoAnalyzer {
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<dyn Classifier>,
    model_version: String,
}

/// What one frame contributed to the report.
struct FrameOutcome {
    entry: TimelineEntry,
    suspicious: Option<SuspiciousFrame>,
}

impl VideoAnalyzer {
    pub fn new(locator: Arc<dyn FaceLocator>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            locator,
            classifier,
            model_version: MODEL_VERSION.to_string(),
        }
    }

    pub fn with_model_version(mut self, model_version: impl Into<String>) -> Self {
        self.model_version = model_version.into();
        self
    }

    /// Analyzes the video at `path`. Never fails: a video that cannot be
    /// opened or has nothing to analyze yields a failure report.
    pub fn analyze(&self, path: &Path, options: &AnalysisOptions) -> VideoReport {
        let started = Instant::now();
        log::info!("Video analysis: {}", path.display());

        match extractor::extract(path, options.max_frames, options.sample_rate) {
            Ok((frames, meta)) => {
                self.analyze_frames(path.display().to_string(), meta, frames, options, started)
            }
            Err(err) => {
                log::error!("Video analysis failed for {}: {err}", path.display());
                VideoReport::Failure(AnalysisFailure::open_failed(
                    path,
                    err,
                    &self.model_version,
                    started,
                ))
            }
        }
    }

    /// Analyzes already extracted frames. A frame whose face location or
    /// classification fails is recorded in the timeline and skipped.
    pub fn analyze_frames(
        &self,
        video_path: String,
        meta: VideoMeta,
        frames: Vec<SampledFrame>,
        options: &AnalysisOptions,
        started: Instant,
    ) -> VideoReport {
        let mut timeline = Vec::with_capacity(frames.len());
        let mut suspicious = Vec::new();

        for frame in frames {
            match self.analyze_frame(&frame, options) {
                Ok(outcome) => {
                    timeline.push(outcome.entry);
                    suspicious.extend(outcome.suspicious);
                }
                Err(err) => {
                    log::warn!("{err}");
                    timeline.push(TimelineEntry::Failed {
                        stamp: frame.stamp,
                        error: err.to_string(),
                    });
                }
            }
        }

        compose_report(AnalysisRun {
            video_path,
            meta,
            timeline,
            suspicious,
            model_version: self.model_version.clone(),
            started,
        })
    }

    fn analyze_frame(
        &self,
        frame: &SampledFrame,
        options: &AnalysisOptions,
    ) -> Result<FrameOutcome, FrameError> {
        let frame_index = frame.stamp.frame_index;
        let detection = self
            .locator
            .locate(&frame.image)
            .map_err(|source| FrameError::Locate {
                frame_index,
                source,
            })?;

        let (crop, bbox) = match detection {
            FaceDetection::Face { crop, bbox } => (crop, bbox),
            FaceDetection::NoFace => {
                log::debug!("No face on frame {frame_index}");
                return Ok(FrameOutcome {
                    entry: TimelineEntry::NoFace(frame.stamp.clone()),
                    suspicious: None,
                });
            }
        };

        let prediction = self
            .classifier
            .predict(&crop)
            .map_err(|source| FrameError::Classify {
                frame_index,
                source,
            })?;
        let prediction = FramePrediction::new(frame.stamp.clone(), &prediction);
        log::debug!(
            "Frame {frame_index}: {} ({:.3})",
            prediction.label,
            prediction.confidence
        );

        let suspicious = aggregate::is_suspicious(&prediction).then(|| SuspiciousFrame {
            prediction: prediction.clone(),
            thumbnail_base64: options
                .include_thumbnails
                .then(|| snapshot(&frame.image, &bbox, frame_index))
                .flatten(),
        });
        let thumbnail_base64 = options
            .include_thumbnails
            .then(|| thumbnail(&frame.image, frame_index))
            .flatten();

        Ok(FrameOutcome {
            entry: TimelineEntry::Face {
                prediction,
                thumbnail_base64,
            },
            suspicious,
        })
    }
}

// Thumbnails are decoration; failing to encode one never fails the frame.

fn thumbnail(image: &RgbImage, frame_index: u64) -> Option<String> {
    thumbnail::encode_thumbnail(image, TIMELINE_THUMBNAIL_SIZE)
        .map_err(|err| log::warn!("Thumbnail failed for frame {frame_index}: {err}"))
        .ok()
}

fn snapshot(image: &RgbImage, bbox: &FaceBox, frame_index: u64) -> Option<String> {
    thumbnail::face_snapshot(image, bbox)
        .map_err(|err| log::warn!("Snapshot failed for frame {frame_index}: {err}"))
        .ok()
}
