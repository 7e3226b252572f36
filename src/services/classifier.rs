use async_trait::async_trait;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Raw classifier output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub inference_time_ms: u64,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<Classification, ClassifierError>;
}

/// Outcomes the stand-in model picks from.
pub const MOCK_OUTCOMES: &[(&str, f64)] = &[
    ("healthy", 0.95),
    ("powdery_mildew", 0.87),
    ("aphid_complex", 0.92),
    ("spider_mite", 0.78),
    ("late_blight", 0.85),
];

/// Stand-in for the vision model: checks that the bytes look like an image and
/// returns a uniformly random outcome from [`MOCK_OUTCOMES`].
#[derive(Debug, Default)]
pub struct MockClassifier;

impl MockClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Classification, ClassifierError> {
        let start = Instant::now();

        let format = image::guess_format(image).map_err(|_| ClassifierError::UnrecognizedImage)?;

        let (label, confidence) = MOCK_OUTCOMES
            .choose(&mut rand::rng())
            .copied()
            .ok_or(ClassifierError::NoOutcome)?;

        tracing::debug!(?format, label, confidence, "Mock inference complete");

        Ok(Classification {
            label: label.to_string(),
            confidence,
            inference_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("payload is not a recognizable image")]
    UnrecognizedImage,

    #[error("classifier produced no outcome")]
    NoOutcome,
}
