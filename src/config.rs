use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::preprocess::{Normalization, TargetSize};

#[derive(Clone, Debug)]
pub struct Settings {
    pub model_path: PathBuf,
    /// JSON array of class names, or a `.txt` file with one label per line.
    pub labels_path: PathBuf,
    pub model_version: String,
    /// Display string only, echoed back in every prediction.
    pub model_accuracy: String,
    pub target_size: TargetSize,
    pub normalization: Normalization,
    pub host: String,
    pub port: u16,
    pub feedback_dir: PathBuf,
    pub static_dir: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl Settings {
    /// Reads settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Settings {
            model_path: text("MODEL_PATH", "models/fruit_cnn.onnx").into(),
            labels_path: text("LABELS_PATH", "models/labels.json").into(),
            model_version: text("MODEL_VERSION", "v1.0"),
            model_accuracy: text("MODEL_ACCURACY", "99.81%"),
            target_size: parse(&lookup, "TARGET_SIZE", "224,224")?,
            normalization: parse(&lookup, "NORMALIZATION", "0_1")?,
            host: text("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", "7860")?,
            feedback_dir: text("FEEDBACK_DIR", "uploads/feedback").into(),
            static_dir: text("STATIC_DIR", "static").into(),
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
