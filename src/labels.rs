use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const DEFAULT_LABELS: [&str; 6] = [
    "freshapples",
    "freshbanana",
    "freshoranges",
    "rottenapples",
    "rottenbanana",
    "rottenoranges",
];

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read labels from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("labels file {path} is not a JSON array of strings: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Class names in model output order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelStore {
    labels: Vec<String>,
}

impl LabelStore {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Loads labels from `path`, or falls back to [`DEFAULT_LABELS`] when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "labels file not found, using built-in labels");
            return Ok(Self::default());
        }

        let read_error = |source| LabelError::Read {
            path: path.to_path_buf(),
            source,
        };

        let labels = if path.extension().is_some_and(|ext| ext == "txt") {
            fs::read_to_string(path)
                .map_err(read_error)?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()
        } else {
            let data = fs::read(path).map_err(read_error)?;
            serde_json::from_slice(&data).map_err(|source| LabelError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };

        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    /// Name for a model output index; indices past the end render as the number itself.
    pub fn label_for(&self, index: usize) -> Cow<'_, str> {
        match self.labels.get(index) {
            Some(label) => Cow::Borrowed(label),
            None => Cow::Owned(index.to_string()),
        }
    }
}

impl Default for LabelStore {
    fn default() -> Self {
        Self::new(DEFAULT_LABELS.iter().map(|l| l.to_string()).collect())
    }
}
