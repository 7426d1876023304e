use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Binary verdict of the deepfake classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    pub fn is_fake(self) -> bool {
        self == Label::Fake
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Real => "REAL",
            Label::Fake => "FAKE",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-class softmax output; `real + fake` is 1 up to float error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub real: f64,
    pub fake: f64,
}

/// Result of classifying a single image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub is_deepfake: bool,
    pub prediction: Label,
    /// Probability mass on the predicted class.
    pub confidence: f64,
    pub probabilities: Probabilities,
}

impl Prediction {
    /// Picks the larger class, REAL on an exact tie.
    pub fn from_probabilities(real: f64, fake: f64) -> Self {
        let label = if fake > real { Label::Fake } else { Label::Real };
        let confidence = match label {
            Label::Fake => fake,
            Label::Real => real,
        };
        Self {
            is_deepfake: label.is_fake(),
            prediction: label,
            confidence,
            probabilities: Probabilities { real, fake },
        }
    }
}

/// The pretrained deepfake classifier, an opaque function of its weights.
pub trait Classifier: Send + Sync {
    fn predict(&self, image: &RgbImage) -> Result<Prediction, ModelError>;
}

impl<T: Classifier + ?Sized> Classifier for std::sync::Arc<T> {
    fn predict(&self, image: &RgbImage) -> Result<Prediction, ModelError> {
        (**self).predict(image)
    }
}
