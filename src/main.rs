use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fruit_freshness::routes::{self, AppState};
use fruit_freshness::{Classifier, FeedbackRecorder, LabelStore, ModelInfo, Preprocessor, Settings};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    let labels = LabelStore::load(&settings.labels_path)?;
    if labels.is_empty() {
        tracing::warn!("label list is empty, predictions will report numeric class ids");
    }

    tracing::info!("Loading model from {}", settings.model_path.display());
    let engine = load_engine(&settings)?;
    tracing::info!(
        "Model loaded. version={} labels={:?}",
        settings.model_version,
        labels.as_slice()
    );

    let classifier = Classifier::new(
        engine,
        labels,
        Preprocessor::new(settings.target_size, settings.normalization),
        ModelInfo {
            version: settings.model_version.clone(),
            accuracy: settings.model_accuracy.clone(),
        },
    );

    let app_state = web::Data::new(AppState {
        classifier: Arc::new(classifier),
        feedback: Arc::new(FeedbackRecorder::new(&settings.feedback_dir)),
        static_dir: settings.static_dir.clone(),
    });

    tracing::info!("Listening on http://{}:{}", settings.host, settings.port);
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(routes::cors())
            .wrap(Logger::default())
            .configure(routes::configure)
    })
    .bind((settings.host.as_str(), settings.port))
    .with_context(|| format!("failed to bind {}:{}", settings.host, settings.port))?
    .run()
    .await?;

    Ok(())
}

#[cfg(feature = "onnx")]
fn load_engine(settings: &Settings) -> anyhow::Result<fruit_freshness::engine::OnnxEngine> {
    fruit_freshness::engine::OnnxEngine::load(&settings.model_path)
        .with_context(|| format!("loading {}", settings.model_path.display()))
}

#[cfg(not(feature = "onnx"))]
fn load_engine(_settings: &Settings) -> anyhow::Result<Box<dyn fruit_freshness::InferenceEngine>> {
    anyhow::bail!("built without the `onnx` feature; no inference engine available")
}
