//! Worker loop tests: jobs flow from the in-memory queue through the
//! pipeline (mock classifier, stubbed download, retrieval and model) to a
//! terminal record.

mod fixtures;
mod helpers;

use agri_diagnose::models::job::{JobStatus, QueuedJob};
use agri_diagnose::models::taxonomy::ActionPolicy;
use agri_diagnose::services::classifier::MockClassifier;
use agri_diagnose::services::diagnosis::DiagnosisPipeline;
use agri_diagnose::services::fetch::ImageFetcher;
use agri_diagnose::services::queue::{JobQueue, MemoryJobQueue};
use agri_diagnose::services::report::ReportWriter;
use agri_diagnose::worker::{process_next_job, report_stranded_jobs};
use fixtures::*;
use helpers::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn pipeline(fetcher: Arc<dyn ImageFetcher>, retriever: Arc<StubRetriever>) -> DiagnosisPipeline {
    DiagnosisPipeline::new(
        fetcher,
        Arc::new(MockClassifier::new()),
        Arc::new(load_taxonomy()),
        retriever,
        ReportWriter::new(Arc::new(SectionsModel), Duration::from_secs(1)),
        3,
    )
}

fn job() -> QueuedJob {
    QueuedJob::new(
        "https://images.example.com/leaf.png".to_string(),
        Some("tomato".to_string()),
        None,
    )
}

#[tokio::test]
async fn test_empty_queue_reports_no_work() {
    let queue = MemoryJobQueue::new();
    let pipeline = pipeline(
        Arc::new(StaticFetcher(PNG_BYTES.to_vec())),
        Arc::new(StubRetriever::default()),
    );
    let processed = assert_ok!(process_next_job(&queue, &pipeline).await);
    assert!(!processed);
}

#[tokio::test]
async fn test_every_mock_outcome_maps_to_its_policy() {
    let queue = MemoryJobQueue::new();
    let retriever = Arc::new(StubRetriever::default());
    let pipeline = pipeline(Arc::new(StaticFetcher(PNG_BYTES.to_vec())), retriever.clone());

    let mut retrieve_jobs = 0;
    for _ in 0..25 {
        let job = job();
        queue.submit(&job).await.unwrap();
        assert!(process_next_job(&queue, &pipeline).await.unwrap());

        let record = queue.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert!(record.error.is_none());

        let result = record.result.unwrap();
        let fixture = fixture_for(&result.label).expect("label comes from the mock outcomes");
        assert_eq!(result.canonical_name, fixture.canonical_name);
        assert_eq!(result.category, Some(fixture.category));
        assert_eq!(result.action_policy, fixture.policy);
        assert_eq!(result.confidence, fixture.confidence);
        assert_eq!(result.crop_type.as_deref(), Some("tomato"));

        if fixture.expects_report() {
            retrieve_jobs += 1;
            let report = result.report.expect("Retrieve entries get a report");
            assert!(report.contains("## Description"));
            assert!(result.report_error.is_none());
        } else {
            assert_eq!(result.action_policy, ActionPolicy::Skip);
            assert!(result.report.is_none());
            assert!(result.report_error.is_none());
        }
    }

    assert_eq!(retriever.calls.load(Ordering::SeqCst), retrieve_jobs);
    assert_eq!(queue.processing_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_retrieval_outage_still_succeeds() {
    let queue = MemoryJobQueue::new();
    let retriever = Arc::new(StubRetriever {
        down: true,
        ..Default::default()
    });
    let pipeline = pipeline(Arc::new(StaticFetcher(PNG_BYTES.to_vec())), retriever);

    for _ in 0..15 {
        let job = job();
        queue.submit(&job).await.unwrap();
        process_next_job(&queue, &pipeline).await.unwrap();

        let record = queue.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        let result = record.result.unwrap();
        assert!(result.report.is_none());
        if result.action_policy == ActionPolicy::Retrieve {
            assert!(result.report_error.is_some());
        } else {
            assert!(result.report_error.is_none());
        }
    }
}

#[tokio::test]
async fn test_download_timeout_fails_job() {
    let queue = MemoryJobQueue::new();
    let pipeline = pipeline(Arc::new(TimeoutFetcher), Arc::new(StubRetriever::default()));

    let job = job();
    queue.submit(&job).await.unwrap();
    assert!(process_next_job(&queue, &pipeline).await.unwrap());

    let record = queue.get(job.job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.result.is_none());
    assert!(record.error.unwrap().contains("download"));

    // Single attempt: the job is not requeued.
    assert_eq!(queue.queue_depth().await.unwrap(), 0);
    let err = assert_err!(pipeline.run(&job).await);
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_non_image_bytes_fail_classification() {
    let queue = MemoryJobQueue::new();
    let pipeline = pipeline(
        Arc::new(StaticFetcher(PDF_BYTES.to_vec())),
        Arc::new(StubRetriever::default()),
    );

    let job = job();
    queue.submit(&job).await.unwrap();
    process_next_job(&queue, &pipeline).await.unwrap();

    let record = queue.get(job.job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error.unwrap().contains("classification"));
}

#[tokio::test]
async fn test_concurrent_workers_process_each_job_once() {
    let queue = Arc::new(MemoryJobQueue::new());
    let pipeline = Arc::new(pipeline(
        Arc::new(StaticFetcher(JPEG_BYTES.to_vec())),
        Arc::new(StubRetriever::default()),
    ));

    let mut ids = Vec::new();
    for _ in 0..12 {
        let job = job();
        ids.push(job.job_id);
        queue.submit(&job).await.unwrap();
    }

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let mut handled = 0;
                while process_next_job(queue.as_ref(), &pipeline).await.unwrap() {
                    handled += 1;
                }
                handled
            })
        })
        .collect();

    let mut total = 0;
    for worker in workers {
        total += worker.await.unwrap();
    }

    assert_eq!(total, 12);
    assert_eq!(queue.queue_depth().await.unwrap(), 0);
    assert_eq!(queue.processing_depth().await.unwrap(), 0);
    for id in ids {
        let record = queue.get(id).await.unwrap().unwrap();
        assert!(record.status.is_terminal());
    }
}

#[tokio::test]
async fn test_abandoned_job_is_reported_as_stranded() {
    let queue = MemoryJobQueue::new();
    assert_eq!(assert_ok!(report_stranded_jobs(&queue).await), 0);

    queue.submit(&job()).await.unwrap();
    let taken = queue.dequeue().await.unwrap().unwrap();
    queue.mark_running(&taken).await.unwrap();

    // Worker dies here: no finish call.
    assert_eq!(assert_ok!(report_stranded_jobs(&queue).await), 1);
    let record = queue.get(taken.job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Running);
}
