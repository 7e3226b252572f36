pub mod diagnose;
pub mod health;
pub mod metrics;
pub mod taxonomy;
pub mod upload;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// API routes with their middleware. `/metrics` is added by the server binary
/// because it needs the installed recorder.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health::health_check))
        .route("/api/v1/upload", post(upload::upload_image))
        .route("/api/v1/diagnose", post(diagnose::submit_diagnosis))
        .route("/api/v1/diagnose/{job_id}", get(diagnose::get_job_status))
        .route("/api/v1/taxonomy", get(taxonomy::list_taxonomy))
        .route("/api/v1/taxonomy/search", get(taxonomy::search_taxonomy))
        .route("/api/v1/taxonomy/{id}", get(taxonomy::get_taxonomy_entry))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
}

#[derive(Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

/// GET /: service information.
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        description: "Plant disease and pest diagnosis service",
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

/// Error body returned by every API route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("uploaded file is empty")]
    EmptyPayload,

    #[error("file exceeds the {}MB limit", .0 / (1024 * 1024))]
    PayloadTooLarge(usize),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("job queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::EmptyPayload => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::StorageUnavailable(_) | ApiError::QueueUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::UnsupportedMediaType(_) => "unsupported_media_type",
            ApiError::EmptyPayload => "empty_payload",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::StorageUnavailable(_) => "storage_unavailable",
            ApiError::QueueUnavailable(_) => "queue_unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorBody {
            error: self.code(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
