use ndarray::Array4;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Run(String),
    #[error("model returned an empty score vector")]
    EmptyOutput,
    #[error("inference session lock poisoned")]
    Poisoned,
}

/// A loaded classifier that maps one `(1, H, W, 3)` tensor to one score per class.
pub trait InferenceEngine: Send + Sync {
    fn infer(&self, input: Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn infer(&self, input: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        (**self).infer(input)
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxEngine;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;
    use std::sync::Mutex;

    use ndarray::Array4;
    use ort::session::{Session, builder::GraphOptimizationLevel};
    use ort::value::Tensor;

    use super::{InferenceEngine, InferenceError};

    /// ONNX Runtime session behind a mutex, since running it needs exclusive access.
    pub struct OnnxEngine {
        session: Mutex<Session>,
    }

    impl OnnxEngine {
        pub fn load(path: &Path) -> Result<Self, InferenceError> {
            let session = Session::builder()
                .map_err(load_error)?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(load_error)?
                .commit_from_file(path)
                .map_err(load_error)?;

            Ok(Self {
                session: Mutex::new(session),
            })
        }
    }

    impl InferenceEngine for OnnxEngine {
        fn infer(&self, input: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let (batch, height, width, channels) = input.dim();
            let (data, _) = input.into_raw_vec_and_offset();
            let tensor =
                Tensor::from_array(([batch, height, width, channels], data)).map_err(run_error)?;

            let mut session = self.session.lock().map_err(|_| InferenceError::Poisoned)?;
            let outputs = session.run(ort::inputs![tensor]).map_err(run_error)?;
            let (_, scores) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(run_error)?;

            Ok(scores.to_vec())
        }
    }

    fn load_error(e: impl std::fmt::Display) -> InferenceError {
        InferenceError::Load(e.to_string())
    }

    fn run_error(e: impl std::fmt::Display) -> InferenceError {
        InferenceError::Run(e.to_string())
    }
}
