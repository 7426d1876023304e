use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use inference_common::error::ModelError;
use ndarray::{Array4, CowArray};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

/// Registers the execution provider for every session created afterwards.
/// Returns the provider name for logging.
pub fn init_runtime(cuda: bool) -> Result<&'static str> {
    let (ep, name) = if cuda {
        (CUDAExecutionProvider::default().build(), "cuda")
    } else {
        (CPUExecutionProvider::default().build(), "cpu")
    };
    ort::init().with_execution_providers([ep]).commit()?;
    log::info!("ONNX Runtime initialized with {name} execution provider");
    Ok(name)
}

/// Loads an ONNX model, wrapping the session for shared use across threads.
pub fn load_session(path: &Path) -> Result<Mutex<Session>, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }
    log::info!("Loading ONNX model from {:?}", path);
    build_session(path)
        .map(Mutex::new)
        .map_err(|err| ModelError::Load {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        })
}

fn build_session(path: &Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(path)
        .context("Failed to commit session")?;
    Ok(session)
}

/// An `f32` model output copied out of the runtime.
#[derive(Debug, Clone)]
pub struct Output {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Output {
    /// Size of the trailing dimension, the per-item width of a batched output.
    pub fn row_len(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }
}

/// Runs a single-input model and returns all of its outputs in graph order.
pub fn run(session: &Mutex<Session>, input: Array4<f32>) -> Result<Vec<Output>, ModelError> {
    let input = CowArray::from(input).into_dyn();
    let tensor = TensorRef::from_array_view(&input).map_err(ModelError::inference)?;

    let mut session = session
        .lock()
        .map_err(|_| ModelError::inference("session mutex poisoned"))?;
    let outputs = session
        .run(ort::inputs![tensor])
        .map_err(ModelError::inference)?;

    (0..outputs.len())
        .map(|i| {
            let (shape, data) = outputs[i]
                .try_extract_tensor::<f32>()
                .map_err(|err| ModelError::output(err.to_string()))?;
            Ok(Output {
                shape: shape.iter().map(|&d| d.max(0) as usize).collect(),
                data: data.to_vec(),
            })
        })
        .collect()
}
