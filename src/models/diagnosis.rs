use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{DiagnosisJob, JobStatus};
use crate::models::taxonomy::{ActionPolicy, Category};

/// Request to diagnose an already uploaded image.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DiagnoseRequest {
    #[garde(length(min = 1, max = 2048), custom(http_url))]
    pub image_url: String,

    #[garde(length(min = 1, max = 100), custom(not_blank))]
    pub crop_type: Option<String>,

    #[garde(length(min = 1, max = 100), custom(not_blank))]
    pub location: Option<String>,
}

fn not_blank(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value {
        Some(v) if v.trim().is_empty() => Err(garde::Error::new("must not be blank")),
        _ => Ok(()),
    }
}

fn http_url(value: &String, _ctx: &()) -> garde::Result {
    let url = reqwest::Url::parse(value).map_err(|e| garde::Error::new(e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(()),
        "http" | "https" => Err(garde::Error::new("URL has no host")),
        other => Err(garde::Error::new(format!("unsupported scheme '{other}'"))),
    }
}

/// Response after submitting an image for diagnosis.
#[derive(Debug, Serialize, Deserialize)]
pub struct DiagnoseResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Response for polling a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub result: Option<DiagnosisResult>,
    pub error: Option<String>,
}

impl From<DiagnosisJob> for JobStatusResponse {
    fn from(job: DiagnosisJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            result: job.result,
            error: job.error,
        }
    }
}

/// Outcome of one diagnosis, attached to a job when it succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosisResult {
    pub label: String,
    pub confidence: f64,
    pub canonical_name: String,
    pub latin_name: Option<String>,
    /// `None` when the label is missing from the taxonomy.
    pub category: Option<Category>,
    pub action_policy: ActionPolicy,
    pub taxonomy_id: Option<u32>,
    pub description: Option<String>,
    pub risk_tier: Option<String>,
    pub inference_time_ms: u64,
    pub crop_type: Option<String>,
    pub location: Option<String>,
    /// Markdown advisory, only for `Retrieve` entries.
    pub report: Option<String>,
    pub report_error: Option<String>,
}

/// Response after a successful upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub original_filename: String,
    pub content_type: String,
}
