use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::classification::PredictError;
use crate::feedback::FeedbackError;

pub const PREDICT_FILE_REQUIRED: &str = "file field required (multipart/form-data)";
pub const FEEDBACK_FILE_REQUIRED: &str = "file required";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    MissingFile(&'static str),
    #[error("invalid top_k: {0}")]
    InvalidTopK(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("model inference error: {0}")]
    Inference(String),
    #[error("feedback storage error: {0}")]
    Storage(String),
    #[error("blocking task failed")]
    Blocking,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingFile(_) | ApiError::InvalidTopK(_) | ApiError::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Inference(_) | ApiError::Storage(_) | ApiError::Blocking => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::MissingFile(message) => json!({ "error": message }),
            ApiError::InvalidTopK(detail) => json!({ "error": "invalid top_k", "detail": detail }),
            ApiError::InvalidImage(detail) => json!({ "error": "invalid image", "detail": detail }),
            ApiError::Inference(detail) => {
                json!({ "error": "model inference error", "detail": detail })
            }
            ApiError::Storage(detail) => {
                json!({ "error": "feedback storage error", "detail": detail })
            }
            ApiError::Blocking => json!({ "error": "internal error" }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::InvalidImage(e) => ApiError::InvalidImage(e.to_string()),
            PredictError::Inference(e) => ApiError::Inference(e.to_string()),
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(err: FeedbackError) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl From<BlockingError> for ApiError {
    fn from(_: BlockingError) -> Self {
        ApiError::Blocking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InferenceError;

    #[test]
    fn statuses_split_client_and_server_faults() {
        assert_eq!(
            ApiError::MissingFile(PREDICT_FILE_REQUIRED).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidImage("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Inference("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Storage("disk full".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn predict_errors_map_to_their_kind() {
        let inference = ApiError::from(PredictError::Inference(InferenceError::EmptyOutput));
        assert!(matches!(inference, ApiError::Inference(ref d) if d.contains("empty score vector")));

        let decode = image::load_from_memory(b"nope").unwrap_err();
        let invalid = ApiError::from(PredictError::InvalidImage(decode));
        assert!(matches!(invalid, ApiError::InvalidImage(_)));
    }
}
