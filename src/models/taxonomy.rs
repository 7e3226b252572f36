use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level grouping of a taxonomy entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
pub enum Category {
    Pest,
    Disease,
    Status,
    Anomaly,
}

/// What the worker does once a label has been mapped to an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPolicy {
    /// No enrichment. Older tables spell this `PASS`.
    #[serde(alias = "PASS")]
    #[strum(to_string = "SKIP", serialize = "PASS")]
    Skip,
    /// Retrieve supporting references and write a report.
    Retrieve,
    /// Needs manual follow-up by an agronomist.
    HumanReview,
}

/// Canonical record mapping a classifier label to a name and handling policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxonomyEntry {
    pub id: u32,
    pub model_label: String,
    pub canonical_name: String,
    pub latin_name: String,
    pub category: Category,
    pub action_policy: ActionPolicy,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub risk_tier: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxonomyMetadata {
    pub version: String,
    pub last_updated: String,
    pub description: String,
    pub maintainer: String,
}

/// On-disk layout of the taxonomy table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyStandard {
    pub metadata: TaxonomyMetadata,
    pub taxonomy: Vec<TaxonomyEntry>,
}
