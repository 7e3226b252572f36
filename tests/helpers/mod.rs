//! Test helper utilities: in-process router harness, service stubs, and
//! HTTP helpers for the end-to-end suite.
#![allow(dead_code)]

use agri_diagnose::{
    app_state::AppState,
    models::diagnosis::{DiagnoseResponse, JobStatusResponse, UploadResponse},
    models::job::JobStatus,
    services::{
        fetch::{FetchError, ImageFetcher},
        llm::{ChatModel, LlmError},
        queue::MemoryJobQueue,
        report::REPORT_SECTIONS,
        retrieval::{RetrievalError, Retriever, Snippet},
        storage::MemoryStorage,
        taxonomy::Taxonomy,
    },
};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const BOUNDARY: &str = "agri-diagnose-test-boundary";

pub fn taxonomy_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/data/taxonomy_standard_v1.json")
}

pub fn load_taxonomy() -> Taxonomy {
    Taxonomy::load(taxonomy_path()).expect("bundled taxonomy loads")
}

/// App state over in-memory storage and queue, with handles kept for asserts.
pub struct TestApp {
    pub router: Router,
    pub storage: Arc<MemoryStorage>,
    pub queue: Arc<MemoryJobQueue>,
}

pub fn test_app() -> TestApp {
    test_app_with_limit(10 * 1024 * 1024)
}

pub fn test_app_with_limit(max_upload_bytes: usize) -> TestApp {
    let storage = Arc::new(MemoryStorage::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let state = AppState {
        taxonomy: Arc::new(load_taxonomy()),
        storage: storage.clone(),
        queue: queue.clone(),
        max_upload_bytes,
    };
    TestApp {
        router: agri_diagnose::routes::build_router(state),
        storage,
        queue,
    }
}

/// Hand-built `multipart/form-data` body with one file part.
pub fn multipart_request(
    field: &str,
    filename: &str,
    content_type: &str,
    data: &[u8],
) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v1/upload")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Send one request through the router and decode the JSON body.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, json)
}

/// Serves fixed bytes for every URL.
pub struct StaticFetcher(pub Vec<u8>);

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.0.clone())
    }
}

/// Always times out.
pub struct TimeoutFetcher;

#[async_trait]
impl ImageFetcher for TimeoutFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Timeout(Duration::from_secs(10)))
    }
}

/// Returns one canned snippet, or fails when `down` is set.
#[derive(Default)]
pub struct StubRetriever {
    pub down: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Retriever for StubRetriever {
    async fn retrieve(&self, _query: &str, top_k: usize) -> Result<Vec<Snippet>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down {
            return Err(RetrievalError::Unavailable("connection refused".into()));
        }
        Ok(vec![
            Snippet {
                content: "Rotate crops and remove infected debris.".into(),
                source: Some("general/sanitation.md".into()),
                distance: Some(0.15),
            };
            top_k.min(1)
        ])
    }
}

/// Replies with the four advisory sections.
pub struct SectionsModel;

#[async_trait]
impl ChatModel for SectionsModel {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
        Ok(REPORT_SECTIONS
            .iter()
            .map(|h| format!("{h}\nDetails."))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

// End-to-end helpers against a running server and worker.

pub fn base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Upload an image through POST /api/v1/upload.
pub async fn upload_image(
    client: &reqwest::Client,
    base_url: &str,
    filename: &str,
    content_type: &str,
    data: Vec<u8>,
) -> Result<UploadResponse, Box<dyn std::error::Error>> {
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(content_type)?,
    );

    let response = client
        .post(format!("{base_url}/api/v1/upload"))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Upload failed with status {status}: {error_text}").into());
    }
    Ok(response.json::<UploadResponse>().await?)
}

pub async fn submit_diagnosis(
    client: &reqwest::Client,
    base_url: &str,
    image_url: &str,
    crop_type: Option<&str>,
) -> Result<DiagnoseResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{base_url}/api/v1/diagnose"))
        .json(&serde_json::json!({ "image_url": image_url, "crop_type": crop_type }))
        .send()
        .await?;

    let status = response.status();
    if status != reqwest::StatusCode::ACCEPTED {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {status}: {error_text}").into());
    }
    Ok(response.json::<DiagnoseResponse>().await?)
}

/// Poll a job every 500ms until it reaches a terminal state.
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &str,
    timeout_secs: u64,
) -> Result<JobStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2;

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{base_url}/api/v1/diagnose/{job_id}"))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {error_text}").into());
        }

        let job = response.json::<JobStatusResponse>().await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        if attempt % 10 == 0 && attempt > 0 {
            println!("  ... still {} (attempt {attempt}/{max_attempts})", job.status);
        }
        debug_assert!(matches!(job.status, JobStatus::Pending | JobStatus::Running));
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    Err(format!("Job did not finish within {timeout_secs} seconds").into())
}
