//! MTCNN face locator: a three-stage cascade of ONNX networks (PNet, RNet,
//! ONet) that proposes, refines and scores face boxes, then crops the most
//! confident face with a margin.

pub mod boxes;

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use image::imageops::{self, FilterType};
use inference_common::error::ModelError;
use inference_common::face::{FaceBox, FaceDetection, FaceLocator};
use ort::session::Session;

use crate::session::{self, Output};
use crate::tensor::nchw_batch;
use boxes::{Candidate, Overlap};

const RNET_INPUT: u32 = 24;
const ONET_INPUT: u32 = 48;

/// Fixed detector parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MtcnnConfig {
    /// Side of the square face crop handed to the classifier.
    pub image_size: u32,
    /// Margin around the detection, in output pixels.
    pub margin: f32,
    pub min_face_size: f32,
    /// Score thresholds for PNet, RNet and ONet.
    pub thresholds: [f32; 3],
    /// Ratio between successive pyramid scales.
    pub factor: f32,
}

impl Default for MtcnnConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            margin: 20.0,
            min_face_size: 40.0,
            thresholds: [0.6, 0.7, 0.7],
            factor: 0.709,
        }
    }
}

pub struct MtcnnFaceLocator {
    pnet: Mutex<Session>,
    rnet: Mutex<Session>,
    onet: Mutex<Session>,
    config: MtcnnConfig,
}

impl MtcnnFaceLocator {
    /// Loads `pnet.onnx`, `rnet.onnx` and `onet.onnx` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, ModelError> {
        Self::with_config(dir, MtcnnConfig::default())
    }

    pub fn with_config(dir: &Path, config: MtcnnConfig) -> Result<Self, ModelError> {
        let locator = Self {
            pnet: session::load_session(&dir.join("pnet.onnx"))?,
            rnet: session::load_session(&dir.join("rnet.onnx"))?,
            onet: session::load_session(&dir.join("onet.onnx"))?,
            config,
        };
        log::info!("MTCNN face locator ready ({:?})", locator.config);
        Ok(locator)
    }

    /// All faces that pass the cascade, most confident first.
    pub fn detect(&self, frame: &RgbImage) -> Result<Vec<Candidate>, ModelError> {
        let proposals = self.propose(frame)?;
        if proposals.is_empty() {
            return Ok(proposals);
        }
        let refined = self.refine(frame, proposals)?;
        if refined.is_empty() {
            return Ok(refined);
        }
        self.output(frame, refined)
    }

    /// Stage 1: PNet over the image pyramid.
    fn propose(&self, frame: &RgbImage) -> Result<Vec<Candidate>, ModelError> {
        let (width, height) = frame.dimensions();
        let mut candidates = Vec::new();

        for scale in boxes::scale_pyramid(width, height, self.config.min_face_size, self.config.factor) {
            let (sw, sh) = boxes::scaled_size(width, height, scale);
            let scaled = imageops::resize(frame, sw, sh, FilterType::Triangle);
            let outputs = session::run(&self.pnet, nchw_batch(&[scaled], normalize))?;
            let (reg, prob) = pnet_outputs(&outputs)?;

            let (map_h, map_w) = (prob.shape[2], prob.shape[3]);
            let plane = map_h * map_w;
            let found = boxes::generate_candidates(
                &prob.data[plane..2 * plane],
                &reg.data,
                map_w,
                map_h,
                scale,
                self.config.thresholds[0],
            );
            candidates.extend(boxes::nms(found, 0.5, Overlap::Union));
        }

        Ok(boxes::nms(candidates, 0.7, Overlap::Union)
            .iter()
            .map(|c| boxes::square(&boxes::regress_window(c)))
            .collect())
    }

    /// Stage 2: RNet rescoring of 24x24 crops.
    fn refine(&self, frame: &RgbImage, proposals: Vec<Candidate>) -> Result<Vec<Candidate>, ModelError> {
        let scored = self.score_crops(&self.rnet, frame, proposals, RNET_INPUT, self.config.thresholds[1])?;
        Ok(boxes::nms(scored, 0.7, Overlap::Union)
            .iter()
            .map(|c| boxes::square(&boxes::regress(c, c.reg)))
            .collect())
    }

    /// Stage 3: ONet rescoring of 48x48 crops and final suppression.
    fn output(&self, frame: &RgbImage, refined: Vec<Candidate>) -> Result<Vec<Candidate>, ModelError> {
        let scored = self.score_crops(&self.onet, frame, refined, ONET_INPUT, self.config.thresholds[2])?;
        let regressed = scored.iter().map(|c| boxes::regress(c, c.reg)).collect();
        Ok(boxes::nms(regressed, 0.7, Overlap::Min))
    }

    /// Runs `net` on square crops of the candidates and keeps those whose face
    /// score clears `threshold`, carrying the network's box offsets along.
    fn score_crops(
        &self,
        net: &Mutex<Session>,
        frame: &RgbImage,
        candidates: Vec<Candidate>,
        size: u32,
        threshold: f32,
    ) -> Result<Vec<Candidate>, ModelError> {
        let (width, height) = frame.dimensions();
        let (kept, crops): (Vec<Candidate>, Vec<RgbImage>) = candidates
            .into_iter()
            .filter_map(|c| {
                let (x, y, w, h) = boxes::crop_window(&c, width, height)?;
                let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
                Some((c, imageops::resize(&crop, size, size, FilterType::Triangle)))
            })
            .unzip();
        if kept.is_empty() {
            return Ok(kept);
        }

        let outputs = session::run(net, nchw_batch(&crops, normalize))?;
        let reg = outputs
            .first()
            .filter(|o| o.row_len() == 4)
            .ok_or_else(|| ModelError::output("missing box regression output"))?;
        let prob = outputs
            .last()
            .filter(|o| o.row_len() == 2)
            .ok_or_else(|| ModelError::output("missing face probability output"))?;
        if reg.data.len() < kept.len() * 4 || prob.data.len() < kept.len() * 2 {
            return Err(ModelError::output("batch size mismatch"));
        }

        Ok(kept
            .into_iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let score = prob.data[i * 2 + 1];
                (score > threshold).then(|| Candidate {
                    score,
                    reg: [
                        reg.data[i * 4],
                        reg.data[i * 4 + 1],
                        reg.data[i * 4 + 2],
                        reg.data[i * 4 + 3],
                    ],
                    ..c
                })
            })
            .collect())
    }
}

impl FaceLocator for MtcnnFaceLocator {
    fn locate(&self, frame: &RgbImage) -> Result<FaceDetection, ModelError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(ModelError::InvalidImage(format!("empty frame {width}x{height}")));
        }

        let faces = self.detect(frame)?;
        let Some(best) = faces.iter().max_by(|a, b| a.score.total_cmp(&b.score)) else {
            return Ok(FaceDetection::NoFace);
        };
        let size = self.config.image_size;
        let Some((x, y, w, h)) = boxes::face_window(best, self.config.margin, size, width, height) else {
            return Ok(FaceDetection::NoFace);
        };
        log::debug!("Face at ({x}, {y}) {w}x{h}, score {:.3}", best.score);

        let region = imageops::crop_imm(frame, x, y, w, h).to_image();
        Ok(FaceDetection::Face {
            crop: imageops::resize(&region, size, size, FilterType::Triangle),
            bbox: FaceBox {
                x1: best.x1,
                y1: best.y1,
                x2: best.x2,
                y2: best.y2,
                score: best.score,
            },
        })
    }
}

fn normalize(_channel: usize, value: u8) -> f32 {
    (value as f32 - 127.5) * 0.0078125
}

/// PNet emits `(reg [1,4,H,W], prob [1,2,H,W])`.
fn pnet_outputs(outputs: &[Output]) -> Result<(&Output, &Output), ModelError> {
    match outputs {
        [reg, prob, ..]
            if reg.shape.len() == 4
                && prob.shape.len() == 4
                && reg.shape[1] == 4
                && prob.shape[1] == 2
                && reg.shape[2..] == prob.shape[2..] =>
        {
            Ok((reg, prob))
        }
        _ => Err(ModelError::output("unexpected PNet output shapes")),
    }
}
