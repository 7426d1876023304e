//! ONNX Runtime backends for the deepfake pipeline: the frame classifier, the
//! MTCNN face locator and the process-wide model registry.

pub mod classifier;
pub mod mtcnn;
pub mod registry;
pub mod session;
pub mod tensor;
