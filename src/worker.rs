use std::time::{Duration, Instant};

use crate::services::diagnosis::DiagnosisPipeline;
use crate::services::queue::{JobQueue, QueueError};

/// Take one job off the queue, run it and store the outcome.
///
/// Returns `Ok(true)` if a job was processed, `Ok(false)` if the queue was
/// empty. Pipeline failures are recorded on the job, not returned.
pub async fn process_next_job(
    queue: &dyn JobQueue,
    pipeline: &DiagnosisPipeline,
) -> Result<bool, QueueError> {
    let job = match queue.dequeue().await? {
        Some(job) => job,
        None => return Ok(false),
    };

    tracing::info!(job_id = %job.job_id, image_url = %job.image_url, "Processing diagnosis job");
    queue.mark_running(&job).await?;

    let start = Instant::now();
    let outcome = pipeline.run(&job).await.map_err(|e| e.to_string());
    let elapsed = start.elapsed();
    metrics::histogram!("diagnosis_processing_seconds").record(elapsed.as_secs_f64());

    match &outcome {
        Ok(result) => {
            metrics::counter!("diagnosis_jobs_completed").increment(1);
            tracing::info!(
                job_id = %job.job_id,
                label = %result.label,
                confidence = result.confidence,
                policy = %result.action_policy,
                has_report = result.report.is_some(),
                duration_ms = elapsed.as_millis() as u64,
                "Job succeeded"
            );
        }
        Err(error) => {
            metrics::counter!("diagnosis_jobs_failed").increment(1);
            tracing::error!(
                job_id = %job.job_id,
                error = %error,
                duration_ms = elapsed.as_millis() as u64,
                "Job failed"
            );
        }
    }

    queue.finish(&job, outcome).await?;
    Ok(true)
}

/// Warn about jobs a dead worker left in the processing list. They are not
/// re-queued; their records stay `Running` until the TTL expires.
pub async fn report_stranded_jobs(queue: &dyn JobQueue) -> Result<u64, QueueError> {
    let stranded = queue.processing_depth().await?;
    if stranded > 0 {
        tracing::warn!(stranded, "Jobs left in the processing list by an earlier worker");
    }
    Ok(stranded)
}

/// Poll forever. Sleeps `idle` when the queue is empty or unreachable.
pub async fn run_loop(
    worker_id: usize,
    queue: &dyn JobQueue,
    pipeline: &DiagnosisPipeline,
    idle: Duration,
) {
    tracing::info!(worker_id, "Worker loop started");
    loop {
        match process_next_job(queue, pipeline).await {
            Ok(true) => {
                tracing::debug!(worker_id, "Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!(worker_id, "No jobs available, sleeping");
                tokio::time::sleep(idle).await;
            }
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Queue error, will retry");
                tokio::time::sleep(idle).await;
            }
        }
    }
}
