//! HTTP service that classifies fruit freshness from uploaded photos and collects relabeling feedback.

pub mod classification;
pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod labels;
pub mod preprocess;
pub mod routes;

pub use classification::{Classifier, ModelInfo, Prediction, RankedLabel};
pub use config::Settings;
pub use engine::{InferenceEngine, InferenceError};
pub use feedback::FeedbackRecorder;
pub use labels::LabelStore;
pub use preprocess::{Normalization, Preprocessor, TargetSize};
pub use routes::AppState;
