use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::diagnosis::DiagnosisResult;

/// Status of a diagnosis job in the async queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// A diagnosis job as held in the result store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub image_url: String,
    pub crop_type: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<DiagnosisResult>,
    pub error: Option<String>,
}

impl DiagnosisJob {
    /// A fresh `Pending` record for a job that is about to be enqueued.
    pub fn pending(queued: &QueuedJob) -> Self {
        let now = Utc::now();
        Self {
            id: queued.job_id,
            status: JobStatus::Pending,
            image_url: queued.image_url.clone(),
            crop_type: queued.crop_type.clone(),
            location: queued.location.clone(),
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
    }

    /// Write the terminal state. Called once per job.
    pub fn finish(&mut self, outcome: Result<DiagnosisResult, String>) {
        match outcome {
            Ok(result) => {
                self.status = JobStatus::Succeeded;
                self.result = Some(result);
                self.error = None;
            }
            Err(error) => {
                self.status = JobStatus::Failed;
                self.result = None;
                self.error = Some(error);
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Job payload carried through the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub image_url: String,
    pub crop_type: Option<String>,
    pub location: Option<String>,
}

impl QueuedJob {
    pub fn new(image_url: String, crop_type: Option<String>, location: Option<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            image_url,
            crop_type,
            location,
        }
    }
}
