//! Minimal client for the Chroma HTTP API (v1 routes).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::services::retrieval::Snippet;

pub struct ChromaClient {
    http: Client,
    base_url: String,
    collection: String,
    collection_id: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct Collection {
    id: String,
}

#[derive(Serialize)]
struct CreateCollection<'a> {
    name: &'a str,
    get_or_create: bool,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: Vec<&'a [f32]>,
    n_results: usize,
    include: [&'static str; 3],
}

/// Column-oriented query result; one inner vector per query embedding.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<Option<f32>>>>,
}

/// One record to upsert.
#[derive(Debug, Clone)]
pub struct ChromaRecord {
    pub id: String,
    pub document: String,
    pub source: String,
    pub embedding: Vec<f32>,
}

#[derive(Serialize)]
struct UpsertRequest {
    ids: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    documents: Vec<String>,
    metadatas: Vec<Value>,
}

impl ChromaClient {
    pub fn new(base_url: &str, collection: &str) -> Result<Self, ChromaError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ChromaError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            collection_id: RwLock::new(None),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn heartbeat(&self) -> Result<(), ChromaError> {
        let url = format!("{}/api/v1/heartbeat", self.base_url);
        let response = self.http.get(&url).send().await?;
        check(response).await?;
        Ok(())
    }

    /// Id of the existing collection. Cached until a query finds it stale.
    async fn collection_id(&self) -> Result<String, ChromaError> {
        if let Some(id) = self.collection_id.read().await.as_ref() {
            return Ok(id.clone());
        }

        let mut cached = self.collection_id.write().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }
        let url = format!("{}/api/v1/collections/{}", self.base_url, self.collection);
        let response = self.http.get(&url).send().await?;
        if response.status().is_client_error() {
            return Err(ChromaError::MissingCollection(self.collection.clone()));
        }
        let collection: Collection = check(response).await?.json().await?;
        *cached = Some(collection.id.clone());
        Ok(collection.id)
    }

    /// Drop the cached id if it is still `stale`.
    async fn forget_collection_id(&self, stale: &str) {
        let mut cached = self.collection_id.write().await;
        if cached.as_deref() == Some(stale) {
            *cached = None;
        }
    }

    /// Create the collection if needed and return its id.
    pub async fn get_or_create_collection(&self) -> Result<String, ChromaError> {
        let url = format!("{}/api/v1/collections", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&CreateCollection {
                name: &self.collection,
                get_or_create: true,
            })
            .send()
            .await?;
        let collection: Collection = check(response).await?.json().await?;
        Ok(collection.id)
    }

    pub async fn delete_collection(&self) -> Result<(), ChromaError> {
        let url = format!("{}/api/v1/collections/{}", self.base_url, self.collection);
        let response = self.http.delete(&url).send().await?;
        *self.collection_id.write().await = None;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    pub async fn upsert(
        &self,
        collection_id: &str,
        records: Vec<ChromaRecord>,
    ) -> Result<(), ChromaError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut request = UpsertRequest {
            ids: Vec::with_capacity(records.len()),
            embeddings: Vec::with_capacity(records.len()),
            documents: Vec::with_capacity(records.len()),
            metadatas: Vec::with_capacity(records.len()),
        };
        for record in records {
            request.ids.push(record.id);
            request.embeddings.push(record.embedding);
            request.documents.push(record.document);
            request.metadatas.push(serde_json::json!({ "source": record.source }));
        }

        let url = format!("{}/api/v1/collections/{}/upsert", self.base_url, collection_id);
        let response = self.http.post(&url).json(&request).send().await?;
        check(response).await?;
        Ok(())
    }

    /// Nearest documents to `embedding`.
    ///
    /// A recreated collection gets a new id, so a 404 on the cached id
    /// triggers one fresh lookup before giving up.
    pub async fn query(
        &self,
        embedding: &[f32],
        n_results: usize,
    ) -> Result<Vec<Snippet>, ChromaError> {
        let collection_id = self.collection_id().await?;
        match self.query_collection(&collection_id, embedding, n_results).await {
            Err(ChromaError::Status { status: 404, .. }) => {
                tracing::info!(
                    collection = %self.collection,
                    stale_id = %collection_id,
                    "Collection id is stale, looking it up again"
                );
                self.forget_collection_id(&collection_id).await;
                let collection_id = self.collection_id().await?;
                self.query_collection(&collection_id, embedding, n_results).await
            }
            other => other,
        }
    }

    async fn query_collection(
        &self,
        collection_id: &str,
        embedding: &[f32],
        n_results: usize,
    ) -> Result<Vec<Snippet>, ChromaError> {
        let url = format!("{}/api/v1/collections/{}/query", self.base_url, collection_id);
        let request = QueryRequest {
            query_embeddings: vec![embedding],
            n_results,
            include: ["documents", "metadatas", "distances"],
        };
        let response = self.http.post(&url).json(&request).send().await?;
        let parsed: QueryResponse = check(response).await?.json().await?;
        Ok(snippets_from_query(parsed))
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ChromaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect();
    Err(ChromaError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Flatten the first query's columns into snippets, skipping empty documents.
pub fn snippets_from_query(response: QueryResponse) -> Vec<Snippet> {
    let documents = response
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();
    let metadatas = response
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default();
    let distances = response
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    documents
        .into_iter()
        .enumerate()
        .filter_map(|(i, doc)| {
            let content = doc.filter(|d| !d.trim().is_empty())?;
            let source = metadatas
                .get(i)
                .and_then(|m| m.as_ref())
                .and_then(|m| m.get("source"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let distance = distances.get(i).copied().flatten();
            Some(Snippet {
                content,
                source,
                distance,
            })
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ChromaError {
    #[error("vector store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("collection '{0}' does not exist; run the ingest tool first")]
    MissingCollection(String),
}
