use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::chroma::{ChromaClient, ChromaError};
use crate::services::llm::{Embedder, LlmError};

/// A reference passage returned by the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snippet {
    pub content: String,
    pub source: Option<String>,
    pub distance: Option<f32>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `top_k` snippets relevant to `query`. An empty result is not an error.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>, RetrievalError>;
}

/// Embedding search over a Chroma collection, memoized per `(query, top_k)`.
pub struct ChromaRetriever {
    chroma: ChromaClient,
    embedder: Arc<dyn Embedder>,
    cache: Cache<(String, usize), Arc<Vec<Snippet>>>,
}

impl ChromaRetriever {
    pub fn new(chroma: ChromaClient, embedder: Arc<dyn Embedder>, cache_capacity: u64) -> Self {
        Self {
            chroma,
            embedder,
            cache: Cache::new(cache_capacity),
        }
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>, RetrievalError> {
        let embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(RetrievalError::Embedding)?
            .into_iter()
            .next()
            .ok_or(RetrievalError::Embedding(LlmError::EmptyResponse))?;

        Ok(self.chroma.query(&embedding, top_k).await?)
    }
}

#[async_trait]
impl Retriever for ChromaRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let key = (query.to_string(), top_k);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(query, top_k, "Retrieval cache hit");
            return Ok(hit.as_ref().clone());
        }

        // Failures are not cached.
        let snippets = self.search(query, top_k).await?;
        tracing::debug!(query, top_k, found = snippets.len(), "Knowledge base searched");
        self.cache.insert(key, Arc::new(snippets.clone())).await;
        Ok(snippets)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval query is empty")]
    EmptyQuery,

    #[error("knowledge base unavailable: {0}")]
    Unavailable(String),

    #[error("query embedding failed: {0}")]
    Embedding(LlmError),
}

impl From<ChromaError> for RetrievalError {
    fn from(err: ChromaError) -> Self {
        RetrievalError::Unavailable(err.to_string())
    }
}
