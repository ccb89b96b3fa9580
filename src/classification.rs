use std::time::Instant;

use image::{GenericImageView, ImageError};
use serde::Serialize;
use thiserror::Error;

use crate::engine::{InferenceEngine, InferenceError};
use crate::labels::LabelStore;
use crate::preprocess::{DecodedImage, Preprocessor};

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] ImageError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Version and accuracy strings reported alongside every prediction.
#[derive(Clone, Debug)]
pub struct ModelInfo {
    pub version: String,
    pub accuracy: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedLabel {
    pub index: usize,
    pub label: String,
    pub score: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Timing {
    pub inference_seconds: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub model_version: String,
    pub prediction: String,
    pub confidence_score: String,
    pub model_accuracy: String,
    pub top_k: Vec<RankedLabel>,
    pub raw_scores: Vec<f32>,
    pub timing: Timing,
}

pub struct Classifier {
    engine: Box<dyn InferenceEngine>,
    labels: LabelStore,
    preprocessor: Preprocessor,
    info: ModelInfo,
}

impl Classifier {
    pub fn new(
        engine: impl InferenceEngine + 'static,
        labels: LabelStore,
        preprocessor: Preprocessor,
        info: ModelInfo,
    ) -> Self {
        Self {
            engine: Box::new(engine),
            labels,
            preprocessor,
            info,
        }
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn classify(&self, bytes: &[u8], top_k: usize) -> Result<Prediction, PredictError> {
        let start = Instant::now();

        let decoded = DecodedImage::from_bytes(bytes)?;
        let (width, height) = decoded.image.dimensions();
        tracing::debug!(
            width,
            height,
            color = ?decoded.image.color(),
            rotation = ?decoded.rotation,
            "decoded upload"
        );

        let input = self.preprocessor.tensor(decoded);
        let scores = self.engine.infer(input)?;

        let order = rank(&scores);
        let best = *order.first().ok_or(InferenceError::EmptyOutput)?;

        let top_k = order
            .iter()
            .take(top_k.min(scores.len()))
            .map(|&index| RankedLabel {
                index,
                label: self.labels.label_for(index).into_owned(),
                score: scores[index],
            })
            .collect();

        let prediction = self.labels.label_for(best).into_owned();
        let confidence = f64::from(scores[best]) * 100.0;
        let elapsed = start.elapsed().as_secs_f64();
        tracing::info!(
            "Predicted {} ({:.2}%) in {:.3}s",
            prediction,
            confidence,
            elapsed
        );

        Ok(Prediction {
            model_version: self.info.version.clone(),
            prediction,
            confidence_score: format!("{confidence:.2}%"),
            model_accuracy: self.info.accuracy.clone(),
            top_k,
            raw_scores: scores,
            timing: Timing {
                inference_seconds: (elapsed * 10_000.0).round() / 10_000.0,
            },
        })
    }
}

/// Indices of `scores` from highest to lowest; equal scores keep their original order.
pub fn rank(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}
