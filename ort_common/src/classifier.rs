//! ConvNeXt deepfake classifier exported to ONNX.

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use image::imageops::{self, FilterType};
use inference_common::error::ModelError;
use inference_common::prediction::{Classifier, Prediction};
use ndarray::Array4;
use ort::session::Session;

use crate::session;
use crate::tensor::nchw_batch;

pub const MODEL_VERSION: &str = "ConvNeXt-Base v3";
pub const INPUT_SIZE: u32 = 224;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Two-logit classifier; index 0 is `real`, index 1 is `fake`.
pub struct DeepfakeClassifier {
    session: Mutex<Session>,
}

impl DeepfakeClassifier {
    pub fn new(model_path: &Path) -> Result<Self, ModelError> {
        let session = session::load_session(model_path)?;
        log::info!("Deepfake classifier ready ({MODEL_VERSION})");
        Ok(Self { session })
    }
}

impl Classifier for DeepfakeClassifier {
    fn predict(&self, image: &RgbImage) -> Result<Prediction, ModelError> {
        let input = preprocess(image)?;
        let outputs = session::run(&self.session, input)?;
        let logits = outputs
            .first()
            .map(|output| output.data.as_slice())
            .filter(|data| data.len() == 2)
            .ok_or_else(|| ModelError::output("expected 2 logits"))?;

        let probs = softmax(logits);
        Ok(Prediction::from_probabilities(probs[0] as f64, probs[1] as f64))
    }
}

/// Resizes to the model input and applies ImageNet normalization.
pub fn preprocess(image: &RgbImage) -> Result<Array4<f32>, ModelError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ModelError::InvalidImage(format!(
            "empty image {}x{}",
            image.width(),
            image.height()
        )));
    }
    let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    Ok(nchw_batch(&[resized], |c, v| {
        (v as f32 / 255.0 - MEAN[c]) / STD[c]
    }))
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
