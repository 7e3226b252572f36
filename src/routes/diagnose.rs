use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::diagnosis::{DiagnoseRequest, DiagnoseResponse, JobStatusResponse};
use crate::models::job::QueuedJob;
use crate::routes::ApiError;

/// POST /api/v1/diagnose: queue an uploaded image for diagnosis.
///
/// Returns as soon as the job is recorded; the work happens in the worker.
pub async fn submit_diagnosis(
    State(state): State<AppState>,
    payload: Result<Json<DiagnoseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DiagnoseResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let job = QueuedJob::new(request.image_url, request.crop_type, request.location);
    let record = state
        .queue
        .submit(&job)
        .await
        .map_err(|e| ApiError::QueueUnavailable(e.to_string()))?;

    metrics::counter!("diagnosis_jobs_submitted").increment(1);
    if let Ok(depth) = state.queue.queue_depth().await {
        metrics::gauge!("diagnosis_queue_depth").set(depth as f64);
    }
    tracing::info!(job_id = %record.id, "Diagnosis job submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(DiagnoseResponse {
            job_id: record.id,
            status: record.status,
            message: "Diagnosis job submitted".to_string(),
        }),
    ))
}

/// GET /api/v1/diagnose/{job_id}: current state of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    job_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let Path(job_id) = job_id.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let job = state
        .queue
        .get(job_id)
        .await
        .map_err(|e| ApiError::QueueUnavailable(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))?;

    Ok(Json(job.into()))
}
