//! HTTP API for image upload, the pest directory, health checks and metrics

use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::presentation::{Category, ThreatLevel};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pest_core::{ClassificationResult, InferenceService, KnowledgeBase, PestError, PestRecord};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Multipart field carrying the uploaded photo
const UPLOAD_FIELD: &str = "file";

/// Shared application state
pub struct AppState {
    pub service: Arc<InferenceService>,
    pub knowledge: Arc<KnowledgeBase>,
    pub health_registry: HealthRegistry,
    pub inference_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        service: Arc<InferenceService>,
        knowledge: Arc<KnowledgeBase>,
        health_registry: HealthRegistry,
    ) -> Self {
        Self {
            service,
            knowledge,
            health_registry,
            inference_timeout: Duration::from_secs(5),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }

    pub fn with_limits(mut self, inference_timeout: Duration, max_upload_bytes: usize) -> Self {
        self.inference_timeout = inference_timeout;
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Request failures and the status codes they map to
#[derive(Debug)]
pub enum ApiError {
    Pest(PestError),
    MissingFile,
    Upload(MultipartError),
    Timeout(Duration),
    Internal(String),
}

impl From<PestError> for ApiError {
    fn from(e: PestError) -> Self {
        ApiError::Pest(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Upload(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str) {
        match self {
            ApiError::MissingFile => (
                StatusCode::BAD_REQUEST,
                "No image provided".to_string(),
                "no_input",
            ),
            ApiError::Upload(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Image too large".to_string(),
                "payload_too_large",
            ),
            ApiError::Upload(e) => (e.status(), e.body_text(), "upload_error"),
            ApiError::Timeout(after) => (
                StatusCode::GATEWAY_TIMEOUT,
                format!("Classification timed out after {}ms", after.as_millis()),
                "timeout",
            ),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
                "internal_error",
            ),
            ApiError::Pest(e) => {
                let (status, message) = match e {
                    PestError::NoInput => (StatusCode::BAD_REQUEST, "No image provided".to_string()),
                    PestError::Decode(_) => (StatusCode::BAD_REQUEST, "Invalid image".to_string()),
                    PestError::UnknownLabel(label) => {
                        (StatusCode::NOT_FOUND, format!("Pest '{}' not found", label))
                    }
                    PestError::ModelLoad(_) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Model unavailable".to_string(),
                    ),
                    PestError::Inference(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Classification failed".to_string(),
                    ),
                    PestError::KnowledgeBase(_) | PestError::Config(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal error".to_string(),
                    ),
                };
                (status, message, e.kind())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = self.parts();
        match &self {
            ApiError::Internal(detail) => error!(code = code, detail = %detail, "Request failed"),
            ApiError::Pest(e) if e.is_client_error() => {
                debug!(code = code, error = %e, "Request rejected")
            }
            ApiError::Pest(e) => error!(code = code, error = %e, "Request failed"),
            ApiError::Upload(e) => warn!(code = code, error = %e, "Upload rejected"),
            _ => {}
        }
        (
            status,
            Json(ErrorBody {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}

/// Verdict returned for an uploaded photo
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub class_name: String,
    /// Confidence as a percentage string, e.g. "92.00%"
    pub confidence: String,
    pub confidence_value: f32,
    pub is_pest: bool,
    pub message: &'static str,
    pub info_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    pub category: Category,
    pub threat_level: ThreatLevel,
}

impl PredictResponse {
    fn new(result: &ClassificationResult, knowledge: &KnowledgeBase) -> Self {
        let label = result.prediction.label.as_str();
        Self {
            class_name: label.to_string(),
            confidence: format!("{:.2}%", result.prediction.confidence * 100.0),
            confidence_value: result.prediction.confidence,
            is_pest: result.is_pest,
            message: if result.is_pest {
                "PEST DETECTED!"
            } else {
                "NOT A PEST"
            },
            info_url: format!("/pest/{}", result.advisory_ref),
            scientific_name: match knowledge.lookup(result.advisory_ref.as_str()) {
                Ok(record) => Some(record.scientific_name.clone()),
                Err(e) => {
                    warn!(label = %label, error = %e, "No advisory for predicted label");
                    None
                }
            },
            category: Category::for_label(label),
            threat_level: ThreatLevel::for_label(label),
        }
    }
}

/// Advisory record decorated with directory presentation fields
#[derive(Debug, Serialize)]
pub struct PestView<'a> {
    #[serde(flatten)]
    pub record: &'a PestRecord,
    pub category: Category,
    pub category_display: &'static str,
    pub threat_level: ThreatLevel,
    pub threat_text: &'static str,
}

impl<'a> PestView<'a> {
    fn new(record: &'a PestRecord) -> Self {
        let category = Category::for_label(record.label.as_str());
        let threat_level = ThreatLevel::for_label(record.label.as_str());
        Self {
            record,
            category,
            category_display: category.display(),
            threat_level,
            threat_text: threat_level.display(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PestDirectory<'a> {
    version: &'a str,
    pests: Vec<PestView<'a>>,
}

/// Read the photo out of the upload
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            if field.file_name().map(str::is_empty).unwrap_or(false) {
                return Err(ApiError::MissingFile);
            }
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(ApiError::MissingFile)
}

/// Classify an uploaded photo
async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        debug!(error = %rejection, "Request is not a multipart upload");
        ApiError::MissingFile
    })?;
    let bytes = read_upload(multipart).await?;
    info!(bytes = bytes.len(), "Classification requested");

    let service = Arc::clone(&state.service);
    let task = tokio::task::spawn_blocking(move || service.classify(&bytes));

    let outcome = match tokio::time::timeout(state.inference_timeout, task).await {
        Ok(joined) => joined.map_err(|e| ApiError::Internal(e.to_string()))?,
        Err(_) => {
            warn!(
                timeout_ms = state.inference_timeout.as_millis() as u64,
                "Classification deadline exceeded"
            );
            // The abandoned task still records its own outcome when it finishes
            state
                .health_registry
                .set_degraded(components::CLASSIFIER, "classification timed out")
                .await;
            return Err(ApiError::Timeout(state.inference_timeout));
        }
    };

    match outcome {
        Ok(result) => {
            state
                .health_registry
                .record_success(components::CLASSIFIER)
                .await;
            Ok(Json(PredictResponse::new(&result, &state.knowledge)))
        }
        Err(e) => {
            if matches!(e, PestError::Inference(_)) {
                state
                    .health_registry
                    .set_degraded(components::CLASSIFIER, e.to_string())
                    .await;
            }
            Err(e.into())
        }
    }
}

/// List every pest in label order
async fn list_pests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let directory = PestDirectory {
        version: state.knowledge.version(),
        pests: state.knowledge.records().map(PestView::new).collect(),
    };
    serde_json::to_value(&directory)
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Full advisory for one pest
async fn pest_detail(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state.knowledge.lookup(&name)?;
    serde_json::to_value(PestView::new(record))
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Health check response - returns 200 if healthy, 503 if any component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once model and knowledge base are loaded
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.max_upload_bytes;
    Router::new()
        .route(
            "/predict",
            post(predict).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/pests", get(list_pests))
        .route("/pest/:name", get(pest_detail))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
