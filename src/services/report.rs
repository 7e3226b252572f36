//! Markdown advisory synthesis.
//!
//! The model writes four fixed sections from retrieved reference snippets.
//! Confidence notices and the no-reference annotation are added here, not
//! left to the model, so they always appear.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::models::taxonomy::Category;
use crate::services::llm::{ChatModel, LlmError};
use crate::services::retrieval::{RetrievalError, Snippet};

pub const DEFAULT_CROP: &str = "unspecified crop";

pub const REPORT_SECTIONS: [&str; 4] = [
    "## Description",
    "## Countermeasures",
    "## Recommended Treatments",
    "## Prevention",
];

const NO_REFERENCE: &str = "no supporting reference found, generated from general knowledge";

const STRONG_WARNING: &str = "> **Warning:** model confidence is below 50%. This diagnosis may be \
wrong; consult an agricultural expert before acting on it.";

const CAUTION: &str = "> **Caution:** model confidence is below 70%. Consider retaking the photo \
in good light with the affected area in focus.";

const SYSTEM_PROMPT: &str = "You are an agronomist writing field advisories for growers. \
Answer in Markdown. Be concrete: name active ingredients with dilution rates and \
pre-harvest intervals where the references give them. When the references do not cover \
something, say the information is insufficient instead of guessing.";

/// Inputs for one report.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub canonical_name: String,
    pub latin_name: Option<String>,
    pub category: Category,
    pub crop_type: Option<String>,
    pub confidence: f64,
    pub snippets: Vec<Snippet>,
}

impl ReportRequest {
    fn crop(&self) -> &str {
        self.crop_type
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CROP)
    }

    fn validate(&self) -> Result<(), ReportError> {
        if self.canonical_name.trim().is_empty() {
            return Err(ReportError::InvalidInput("diagnosis name is empty".into()));
        }
        if matches!(&self.crop_type, Some(c) if c.trim().is_empty()) {
            return Err(ReportError::InvalidInput("crop type is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ReportError::InvalidInput(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Writes advisories with a chat model, bounded by a timeout.
pub struct ReportWriter {
    model: Arc<dyn ChatModel>,
    timeout: Duration,
}

impl ReportWriter {
    pub fn new(model: Arc<dyn ChatModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn write(&self, request: &ReportRequest) -> Result<String, ReportError> {
        request.validate()?;
        let prompt = build_prompt(request);

        let body = tokio::time::timeout(self.timeout, self.model.complete(SYSTEM_PROMPT, &prompt))
            .await
            .map_err(|_| ReportError::ModelTimeout(self.timeout))??;

        let mut report = String::new();
        if let Some(notice) = confidence_notice(request.confidence) {
            report.push_str(notice);
            report.push_str("\n\n");
        }
        report.push_str(body.trim());
        if request.snippets.is_empty() {
            let _ = write!(report, "\n\n_Note: {NO_REFERENCE}._");
        }
        Ok(report)
    }
}

/// Notice for low-confidence diagnoses.
pub fn confidence_notice(confidence: f64) -> Option<&'static str> {
    if confidence < 0.5 {
        Some(STRONG_WARNING)
    } else if confidence < 0.7 {
        Some(CAUTION)
    } else {
        None
    }
}

/// Numbered reference block for the prompt.
pub fn format_snippets(snippets: &[Snippet]) -> String {
    if snippets.is_empty() {
        return format!("({NO_REFERENCE})");
    }
    let mut out = String::new();
    for (i, snippet) in snippets.iter().enumerate() {
        let source = snippet.source.as_deref().unwrap_or("unknown source");
        let _ = writeln!(out, "[{}] ({source})\n{}\n", i + 1, snippet.content.trim());
    }
    out.trim_end().to_string()
}

fn build_prompt(request: &ReportRequest) -> String {
    let name = match &request.latin_name {
        Some(latin) => format!("{} ({latin})", request.canonical_name),
        None => request.canonical_name.clone(),
    };
    let guidance = match request.category {
        Category::Disease => {
            "Under Description, identify the pathogen, the visible symptoms, and the conditions \
             that favour its spread."
        }
        Category::Pest => {
            "Under Description, list the main species involved, their life cycle, and the damage \
             they cause. Under Countermeasures, cover biological control before chemical control."
        }
        Category::Status | Category::Anomaly => {
            "Under Description, explain what the condition looks like and its likely causes."
        }
    };

    let mut prompt = String::new();
    let _ = writeln!(prompt, "Diagnosis: {name}");
    let _ = writeln!(prompt, "Category: {}", request.category);
    let _ = writeln!(prompt, "Crop: {}", request.crop());
    let _ = writeln!(prompt, "Model confidence: {:.0}%\n", request.confidence * 100.0);
    let _ = writeln!(prompt, "References:\n{}\n", format_snippets(&request.snippets));
    let _ = writeln!(
        prompt,
        "Write the advisory using exactly these section headers, in this order:\n{}\n",
        REPORT_SECTIONS.join("\n")
    );
    prompt.push_str(guidance);
    prompt
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("invalid report input: {0}")]
    InvalidInput(String),

    #[error("knowledge base unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("report model timed out after {0:?}")]
    ModelTimeout(Duration),

    #[error("report model rejected credentials")]
    ModelAuth,

    #[error("report model rate limited")]
    ModelRateLimited,

    #[error("report model failed: {0}")]
    Model(String),
}

impl From<LlmError> for ReportError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Unauthorized { .. } => ReportError::ModelAuth,
            LlmError::RateLimited(_) => ReportError::ModelRateLimited,
            other => ReportError::Model(other.to_string()),
        }
    }
}

impl From<RetrievalError> for ReportError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::EmptyQuery => ReportError::InvalidInput(err.to_string()),
            other => ReportError::RetrievalUnavailable(other.to_string()),
        }
    }
}
