use std::sync::Arc;
use std::time::Instant;

use crate::models::diagnosis::DiagnosisResult;
use crate::models::job::QueuedJob;
use crate::models::taxonomy::{ActionPolicy, TaxonomyEntry};
use crate::services::classifier::{Classification, Classifier, ClassifierError};
use crate::services::fetch::{FetchError, ImageFetcher};
use crate::services::report::{ReportError, ReportRequest, ReportWriter};
use crate::services::retrieval::Retriever;
use crate::services::taxonomy::Taxonomy;

pub const UNKNOWN_NAME: &str = "Unknown";

/// Download, classify, map to the taxonomy and, for `Retrieve` entries, write
/// an advisory.
pub struct DiagnosisPipeline {
    fetcher: Arc<dyn ImageFetcher>,
    classifier: Arc<dyn Classifier>,
    taxonomy: Arc<Taxonomy>,
    retriever: Arc<dyn Retriever>,
    writer: ReportWriter,
    top_k: usize,
}

impl DiagnosisPipeline {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        classifier: Arc<dyn Classifier>,
        taxonomy: Arc<Taxonomy>,
        retriever: Arc<dyn Retriever>,
        writer: ReportWriter,
        top_k: usize,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            taxonomy,
            retriever,
            writer,
            top_k,
        }
    }

    /// Run one job. Errors here fail the job; enrichment failures do not.
    pub async fn run(&self, job: &QueuedJob) -> Result<DiagnosisResult, DiagnosisError> {
        let start = Instant::now();
        let image = self.fetcher.fetch(&job.image_url).await?;
        tracing::debug!(
            job_id = %job.job_id,
            bytes = image.len(),
            download_ms = start.elapsed().as_millis() as u64,
            "Image fetched"
        );

        let classification = self.classifier.classify(&image).await?;
        tracing::info!(
            job_id = %job.job_id,
            label = %classification.label,
            confidence = classification.confidence,
            inference_ms = classification.inference_time_ms,
            "Image classified"
        );

        let entry = match self.taxonomy.lookup_by_label(&classification.label) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "Label missing from taxonomy");
                None
            }
        };
        let mut result = base_result(job, &classification, entry);

        if let Some(entry) = entry.filter(|e| e.action_policy == ActionPolicy::Retrieve) {
            match self.enrich(job, entry, classification.confidence).await {
                Ok(report) => result.report = Some(report),
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, error = %e, "Report generation failed");
                    metrics::counter!("diagnosis_reports_failed").increment(1);
                    result.report_error = Some(e.to_string());
                }
            }
        }

        Ok(result)
    }

    async fn enrich(
        &self,
        job: &QueuedJob,
        entry: &TaxonomyEntry,
        confidence: f64,
    ) -> Result<String, ReportError> {
        let crop_type = job
            .crop_type
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let query = retrieval_query(crop_type, entry);
        let snippets = self.retriever.retrieve(&query, self.top_k).await?;
        tracing::debug!(job_id = %job.job_id, snippets = snippets.len(), "References retrieved");

        let request = ReportRequest {
            canonical_name: entry.canonical_name.clone(),
            latin_name: non_empty(&entry.latin_name),
            category: entry.category,
            crop_type: crop_type.map(str::to_string),
            confidence,
            snippets,
        };
        self.writer.write(&request).await
    }
}

fn base_result(
    job: &QueuedJob,
    classification: &Classification,
    entry: Option<&TaxonomyEntry>,
) -> DiagnosisResult {
    let common = DiagnosisResult {
        label: classification.label.clone(),
        confidence: classification.confidence,
        canonical_name: UNKNOWN_NAME.to_string(),
        latin_name: None,
        category: None,
        action_policy: ActionPolicy::HumanReview,
        taxonomy_id: None,
        description: None,
        risk_tier: None,
        inference_time_ms: classification.inference_time_ms,
        crop_type: job.crop_type.clone(),
        location: job.location.clone(),
        report: None,
        report_error: None,
    };

    match entry {
        Some(entry) => DiagnosisResult {
            canonical_name: entry.canonical_name.clone(),
            latin_name: non_empty(&entry.latin_name),
            category: Some(entry.category),
            action_policy: entry.action_policy,
            taxonomy_id: Some(entry.id),
            description: entry.description.clone(),
            risk_tier: entry.risk_tier.clone(),
            ..common
        },
        None => common,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Knowledge base query for an entry: crop, name, then keywords.
pub fn retrieval_query(crop_type: Option<&str>, entry: &TaxonomyEntry) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(crop) = crop_type.map(str::trim).filter(|c| !c.is_empty()) {
        parts.push(crop);
    }
    parts.push(&entry.canonical_name);
    parts.extend(entry.keywords.iter().map(String::as_str));
    parts.join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error(transparent)]
    Download(#[from] FetchError),

    #[error("classification failed: {0}")]
    Classification(#[from] ClassifierError),
}
