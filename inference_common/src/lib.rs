//! Shared data model and analysis logic for deepfake video inference.
//!
//! Everything here is independent of the decoding and inference backends:
//! frames come in as [`image::RgbImage`] values, faces and classifications come
//! back through the [`face::FaceLocator`] and [`prediction::Classifier`] traits.

pub mod aggregate;
pub mod error;
pub mod face;
pub mod frame_meta;
pub mod interpretation;
pub mod options;
pub mod prediction;
pub mod report;
pub mod rounding;
pub mod sampling;
pub mod timeline;
pub mod video_meta;
