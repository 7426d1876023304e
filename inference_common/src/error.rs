//! Error taxonomy shared by the analysis stages.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the face locator and classifier backends.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to load model {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("invalid input image: {0}")]
    InvalidImage(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unexpected model output: {0}")]
    Output(String),
}

impl ModelError {
    pub fn inference(err: impl std::fmt::Display) -> Self {
        Self::Inference(err.to_string())
    }

    pub fn output(message: impl Into<String>) -> Self {
        Self::Output(message.into())
    }
}

/// A failure confined to one sampled frame. The frame is recorded in the
/// timeline and analysis carries on with the next one.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("face location failed on frame {frame_index}: {source}")]
    Locate { frame_index: u64, source: ModelError },

    #[error("classification failed on frame {frame_index}: {source}")]
    Classify { frame_index: u64, source: ModelError },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    /// Zero predictions reached the aggregator. Callers must filter the
    /// no-face case before aggregating.
    #[error("no face-bearing predictions to aggregate")]
    EmptyPredictions,
}
