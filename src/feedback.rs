use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("failed to write feedback: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode feedback metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Free-text fields submitted with a mislabeled sample. Nothing here is validated.
#[derive(Clone, Debug, Default)]
pub struct FeedbackFields {
    pub predicted: String,
    pub correct: String,
    pub tag: String,
}

/// Sidecar stored next to each feedback upload as `<upload>.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub filename: String,
    pub predicted: String,
    pub correct: String,
    pub tag: String,
}

pub struct FeedbackRecorder {
    dir: PathBuf,
}

impl FeedbackRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stores the upload as `<unix_timestamp>_<name>` and returns its path.
    ///
    /// Two submissions of the same name within one second land on the same path and the later wins.
    pub fn record(
        &self,
        original_name: Option<&str>,
        bytes: &[u8],
        fields: FeedbackFields,
    ) -> Result<PathBuf, FeedbackError> {
        self.record_at(chrono::Utc::now().timestamp(), original_name, bytes, fields)
    }

    fn record_at(
        &self,
        timestamp: i64,
        original_name: Option<&str>,
        bytes: &[u8],
        fields: FeedbackFields,
    ) -> Result<PathBuf, FeedbackError> {
        fs::create_dir_all(&self.dir)?;

        let filename = format!("{timestamp}_{}", base_name(original_name));
        let path = self.dir.join(&filename);
        fs::write(&path, bytes)?;

        let record = FeedbackRecord {
            filename,
            predicted: fields.predicted,
            correct: fields.correct,
            tag: fields.tag,
        };
        let mut writer = BufWriter::new(File::create(sidecar_path(&path))?);
        serde_json::to_writer(&mut writer, &record)?;
        writer.flush()?;

        tracing::info!(path = %path.display(), correct = %record.correct, "saved feedback");
        Ok(path)
    }
}

pub fn sidecar_path(upload: &Path) -> PathBuf {
    let mut path = upload.as_os_str().to_owned();
    path.push(".json");
    path.into()
}

/// Last path component of a client-supplied name, so uploads stay inside the feedback directory.
fn base_name(original_name: Option<&str>) -> &str {
    original_name
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("upload")
}
