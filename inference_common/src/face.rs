use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detector confidence for this box.
    pub score: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

/// Outcome of looking for a face in one frame. Finding nothing is a normal
/// result, not an error.
#[derive(Debug, Clone)]
pub enum FaceDetection {
    /// The most confident face, cropped with margin and resized to a square.
    Face { crop: RgbImage, bbox: FaceBox },
    NoFace,
}

/// Finds at most one face per frame.
pub trait FaceLocator: Send + Sync {
    /// Errors only when `frame` is not a usable image.
    fn locate(&self, frame: &RgbImage) -> Result<FaceDetection, ModelError>;
}

impl<T: FaceLocator + ?Sized> FaceLocator for std::sync::Arc<T> {
    fn locate(&self, frame: &RgbImage) -> Result<FaceDetection, ModelError> {
        (**self).locate(frame)
    }
}
