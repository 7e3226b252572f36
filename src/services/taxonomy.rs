//! Read-only taxonomy table.
//!
//! Loaded once at startup from a JSON file and indexed three ways (id, model
//! label, canonical name). The table is never mutated after construction and
//! is shared behind an `Arc` by the server and the worker.

use std::collections::HashMap;
use std::path::Path;

use crate::models::taxonomy::{TaxonomyEntry, TaxonomyMetadata, TaxonomyStandard};

/// In-memory taxonomy with precomputed lookup indexes.
#[derive(Debug)]
pub struct Taxonomy {
    metadata: TaxonomyMetadata,
    entries: Vec<TaxonomyEntry>,
    by_id: HashMap<u32, usize>,
    by_label: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Taxonomy {
    /// Load and index the table at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TaxonomyError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let standard: TaxonomyStandard = serde_json::from_str(&raw)?;
        let taxonomy = Self::from_standard(standard)?;

        tracing::info!(
            path = %path.display(),
            version = %taxonomy.metadata.version,
            entries = taxonomy.entries.len(),
            "Taxonomy loaded"
        );

        Ok(taxonomy)
    }

    pub fn from_standard(standard: TaxonomyStandard) -> Result<Self, TaxonomyError> {
        let TaxonomyStandard { metadata, taxonomy: entries } = standard;

        let mut by_id = HashMap::with_capacity(entries.len());
        let mut by_label = HashMap::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());

        for (idx, entry) in entries.iter().enumerate() {
            if by_id.insert(entry.id, idx).is_some() {
                return Err(TaxonomyError::Duplicate(format!("id {}", entry.id)));
            }
            if by_label.insert(entry.model_label.clone(), idx).is_some() {
                return Err(TaxonomyError::Duplicate(format!("label '{}'", entry.model_label)));
            }
            if by_name.insert(entry.canonical_name.clone(), idx).is_some() {
                return Err(TaxonomyError::Duplicate(format!("name '{}'", entry.canonical_name)));
            }
        }

        Ok(Self {
            metadata,
            entries,
            by_id,
            by_label,
            by_name,
        })
    }

    pub fn metadata(&self) -> &TaxonomyMetadata {
        &self.metadata
    }

    pub fn all(&self) -> &[TaxonomyEntry] {
        &self.entries
    }

    pub fn lookup_by_id(&self, id: u32) -> Result<&TaxonomyEntry, TaxonomyError> {
        self.by_id
            .get(&id)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| TaxonomyError::NotFound(format!("Taxonomy ID {id} not found")))
    }

    /// Look up by classifier output label (e.g. `spider_mite`).
    pub fn lookup_by_label(&self, label: &str) -> Result<&TaxonomyEntry, TaxonomyError> {
        self.by_label
            .get(label)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| TaxonomyError::NotFound(format!("Model label '{label}' not found")))
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<&TaxonomyEntry, TaxonomyError> {
        self.by_name
            .get(name)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| TaxonomyError::NotFound(format!("Name '{name}' not found")))
    }

    /// Free-text search: exact canonical name match, then exact label match.
    pub fn search(&self, query: &str) -> Result<Vec<&TaxonomyEntry>, TaxonomyError> {
        let query = query.trim();
        let mut results: Vec<&TaxonomyEntry> = Vec::new();

        if let Ok(entry) = self.lookup_by_name(query) {
            results.push(entry);
        }
        if let Ok(entry) = self.lookup_by_label(query) {
            if !results.iter().any(|e| e.id == entry.id) {
                results.push(entry);
            }
        }

        if results.is_empty() {
            return Err(TaxonomyError::NotFound(format!(
                "Taxonomy entry not found for query: '{query}'"
            )));
        }
        Ok(results)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaxonomyError {
    #[error("{0}")]
    NotFound(String),

    #[error("Duplicate taxonomy {0}")]
    Duplicate(String),

    #[error("Failed to read taxonomy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid taxonomy file: {0}")]
    Parse(#[from] serde_json::Error),
}
