//! HTTP surface of the prediction service.

use crate::error::{ArtifactLoadError, ModelUnavailable, PredictError};
use crate::metrics::{MetricsSnapshot, ServingMetrics};
use crate::models::inference::InferenceEngine;
use crate::models::loader::{ArtifactMetadata, PipelineArtifact};
use crate::types::prediction::PredictionResult;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    pub metrics: Arc<ServingMetrics>,
}

impl AppState {
    pub fn new(engine: Arc<InferenceEngine>, metrics: Arc<ServingMetrics>) -> Self {
        Self { engine, metrics }
    }
}

/// Build the service router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/predict", post(predict))
        .route("/model", get(model_info))
        .route("/model/reload", post(reload))
        .route("/metrics", get(metrics))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// An error ready to be turned into a response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: code.to_string(),
                message: message.into(),
                field: None,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl From<ModelUnavailable> for ApiError {
    fn from(e: ModelUnavailable) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "model_unavailable", e.to_string())
    }
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        match e {
            PredictError::Unavailable(e) => e.into(),
            PredictError::InvalidJson(e) => Self::new(
                StatusCode::BAD_REQUEST,
                "invalid_json",
                format!("request body is not valid JSON: {e}"),
            ),
            PredictError::Invalid(e) => {
                let mut err = Self::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "schema_validation",
                    e.to_string(),
                );
                err.body.field = e.field().map(str::to_string);
                err
            }
        }
    }
}

impl From<ArtifactLoadError> for ApiError {
    fn from(e: ArtifactLoadError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "reload_failed", e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub model_ready: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub model_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub artifact_path: PathBuf,
    pub feature_count: usize,
    pub trees: usize,
    pub metadata: ArtifactMetadata,
}

impl ModelInfo {
    fn describe(engine: &InferenceEngine, artifact: &PipelineArtifact) -> Self {
        Self {
            artifact_path: engine.artifact_path().to_path_buf(),
            feature_count: artifact.pipeline.transform.feature_count(),
            trees: artifact.pipeline.classifier.n_trees(),
            metadata: artifact.metadata.clone(),
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Job success prediction service".to_string(),
        model_ready: state.engine.is_ready(),
    })
}

async fn ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, ApiError> {
    let artifact = state.engine.snapshot().ok_or(ModelUnavailable)?;
    Ok(Json(ReadyResponse {
        ready: true,
        model_id: artifact.metadata.model_id,
    }))
}

async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PredictionResult>, ApiError> {
    let started = Instant::now();

    match state.engine.predict_json(&body) {
        Ok(result) => {
            state
                .metrics
                .record_prediction(started.elapsed(), result.probability_success);
            Ok(Json(result))
        }
        Err(e) => {
            match &e {
                PredictError::Unavailable(_) => {
                    state.metrics.record_unavailable();
                    warn!("Prediction requested while no model is loaded");
                }
                _ => {
                    state.metrics.record_rejected();
                    debug!(error = %e, "Prediction request rejected");
                }
            }
            Err(e.into())
        }
    }
}

async fn model_info(State(state): State<AppState>) -> Result<Json<ModelInfo>, ApiError> {
    let artifact = state.engine.snapshot().ok_or(ModelUnavailable)?;
    Ok(Json(ModelInfo::describe(&state.engine, &artifact)))
}

async fn reload(State(state): State<AppState>) -> Result<Json<ModelInfo>, ApiError> {
    let engine = Arc::clone(&state.engine);
    let outcome = tokio::task::spawn_blocking(move || engine.reload())
        .await
        .map_err(|e| {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "reload_failed", e.to_string())
        })?;

    match outcome {
        Ok(artifact) => {
            state.metrics.record_reload();
            info!(model_id = %artifact.metadata.model_id, "Model reloaded on request");
            Ok(Json(ModelInfo::describe(&state.engine, &artifact)))
        }
        Err(e) => {
            error!(error = %e, "Model reload failed; keeping current model");
            Err(e.into())
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
