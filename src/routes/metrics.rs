use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus scrape endpoint (text exposition format).
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> String {
    handle.render()
}

/// Register descriptions for the metrics the server and worker emit.
pub fn describe_metrics() {
    metrics::describe_counter!("diagnosis_jobs_submitted", "Diagnosis jobs accepted by the API");
    metrics::describe_counter!("diagnosis_jobs_completed", "Diagnosis jobs that succeeded");
    metrics::describe_counter!("diagnosis_jobs_failed", "Diagnosis jobs that failed");
    metrics::describe_counter!(
        "diagnosis_reports_failed",
        "Succeeded jobs whose report could not be generated"
    );
    metrics::describe_histogram!(
        "diagnosis_processing_seconds",
        metrics::Unit::Seconds,
        "Time to process one diagnosis job"
    );
    metrics::describe_gauge!("diagnosis_queue_depth", "Jobs waiting for a worker");
    metrics::describe_counter!("image_uploads_total", "Images stored through the upload endpoint");
}
