use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_multipart::{Multipart, MultipartError};
use actix_web::http::header::ContentType;
use actix_web::{HttpResponse, Responder, get, post, web};
use futures_util::TryStreamExt;
use serde_json::json;

use crate::classification::{Classifier, DEFAULT_TOP_K, PredictError};
use crate::error::{ApiError, FEEDBACK_FILE_REQUIRED, PREDICT_FILE_REQUIRED};
use crate::feedback::{FeedbackFields, FeedbackRecorder};

pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub feedback: Arc<FeedbackRecorder>,
    pub static_dir: PathBuf,
}

/// Any origin, method and header, matching the demo front end's needs.
pub fn cors() -> Cors {
    Cors::permissive()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(health)
        .service(predict)
        .service(feedback);
}

struct UploadedFile {
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn read(mut payload: Multipart) -> Result<Self, MultipartError> {
        let mut form = UploadForm::default();
        while let Some(mut field) = payload.try_next().await? {
            let name = field.name().unwrap_or_default().to_owned();
            let filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_owned);
            let content_type = field.content_type().map(|mime| mime.to_string());

            let mut bytes = Vec::new();
            while let Some(chunk) = field.try_next().await? {
                bytes.extend_from_slice(&chunk);
            }

            // A part only counts as the upload when the client sent it as a file.
            if name == "file" && filename.is_some() {
                form.file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes,
                });
            } else {
                form.fields
                    .insert(name, String::from_utf8_lossy(&bytes).into_owned());
            }
        }
        Ok(form)
    }

    fn text(&mut self, name: &str) -> String {
        self.fields.remove(name).unwrap_or_default()
    }

    /// Negative counts ask for no ranked entries rather than failing.
    fn top_k(&self) -> Result<usize, ApiError> {
        match self.fields.get("top_k").map(|v| v.trim()) {
            None | Some("") => Ok(DEFAULT_TOP_K),
            Some(value) => value
                .parse::<i64>()
                .map(|k| usize::try_from(k).unwrap_or(0))
                .map_err(|_| ApiError::InvalidTopK(format!("{value:?} is not an integer"))),
        }
    }
}

async fn read_upload(payload: Multipart, missing: &'static str) -> Result<UploadForm, ApiError> {
    UploadForm::read(payload).await.map_err(|e| {
        tracing::warn!(error = %e, "unreadable multipart body");
        ApiError::MissingFile(missing)
    })
}

#[get("/")]
async fn index(data: web::Data<AppState>) -> impl Responder {
    let page = data.static_dir.join("index.html");
    match web::block(move || fs::read(page)).await {
        Ok(Ok(page)) => HttpResponse::Ok()
            .content_type(ContentType::html())
            .body(page),
        _ => HttpResponse::Ok()
            .content_type(ContentType::plaintext())
            .body("Fruit classifier API. Use POST /api/predict"),
    }
}

#[get("/health")]
async fn health(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "model_version": data.classifier.info().version,
    }))
}

#[post("/api/predict")]
async fn predict(data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let mut form = read_upload(payload, PREDICT_FILE_REQUIRED).await?;
    let file = form.file.take().ok_or(ApiError::MissingFile(PREDICT_FILE_REQUIRED))?;
    let top_k = form.top_k()?;

    tracing::info!(
        file = file.filename.as_deref().unwrap_or_default(),
        content_type = file.content_type.as_deref().unwrap_or_default(),
        size = file.bytes.len(),
        top_k,
        "received upload"
    );

    let classifier = Arc::clone(&data.classifier);
    let prediction = web::block(move || classifier.classify(&file.bytes, top_k))
        .await?
        .map_err(|e| {
            match &e {
                PredictError::InvalidImage(err) => tracing::warn!(error = %err, "invalid image"),
                PredictError::Inference(err) => {
                    tracing::error!(error = %err, "model inference error")
                }
            }
            ApiError::from(e)
        })?;

    Ok(HttpResponse::Ok().json(prediction))
}

#[post("/api/feedback")]
async fn feedback(data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let mut form = read_upload(payload, FEEDBACK_FILE_REQUIRED).await?;
    let fields = FeedbackFields {
        predicted: form.text("predicted"),
        correct: form.text("correct"),
        tag: form.text("tag"),
    };
    let file = form.file.ok_or(ApiError::MissingFile(FEEDBACK_FILE_REQUIRED))?;

    let recorder = Arc::clone(&data.feedback);
    let path = web::block(move || recorder.record(file.filename.as_deref(), &file.bytes, fields))
        .await??;

    Ok(HttpResponse::Ok().json(json!({
        "status": "saved",
        "path": path.display().to_string(),
    })))
}
