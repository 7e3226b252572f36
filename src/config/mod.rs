use serde::Deserialize;
use std::time::Duration;

/// Process configuration, read from the environment (and `.env`).
///
/// Every field has a default so a bare `cargo run` talks to the usual local
/// docker-compose services.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Ignored by the worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string for the job queue and result store
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// How long finished job records stay pollable
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    /// Path to the taxonomy JSON table
    #[serde(default = "default_taxonomy_path")]
    pub taxonomy_path: String,

    /// S3-compatible endpoint (MinIO)
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,

    #[serde(default = "default_storage_region")]
    pub storage_region: String,

    #[serde(default)]
    pub storage_access_key: String,

    #[serde(default)]
    pub storage_secret_key: String,

    #[serde(default = "default_storage_bucket")]
    pub storage_bucket: String,

    /// Base used for public object URLs. Defaults to `storage_endpoint`.
    #[serde(default)]
    pub storage_public_url: Option<String>,

    /// Upload size cap in bytes
    #[serde(default = "default_max_bytes")]
    pub max_upload_bytes: usize,

    /// API key for the OpenAI-compatible chat and embeddings endpoints
    #[serde(default)]
    pub openai_api_key: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,

    /// Upper bound on one report generation call
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Chroma vector store base URL
    #[serde(default = "default_chroma_url")]
    pub chroma_url: String,

    #[serde(default = "default_chroma_collection")]
    pub chroma_collection: String,

    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    /// Number of cached retrieval results
    #[serde(default = "default_retrieval_cache_capacity")]
    pub retrieval_cache_capacity: u64,

    #[serde(default = "default_image_fetch_timeout_secs")]
    pub image_fetch_timeout_secs: u64,

    /// Download size cap in bytes
    #[serde(default = "default_max_bytes")]
    pub max_image_bytes: usize,

    /// Allow the worker to fetch images from loopback/private hosts.
    /// Needed when MinIO is addressed as `localhost` during development.
    #[serde(default)]
    pub allow_private_image_hosts: bool,

    /// Number of concurrent job loops in one worker process
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Idle sleep between empty queue polls
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Address for the worker's own Prometheus listener (e.g. "0.0.0.0:9100").
    /// Unset means the worker does not export metrics.
    #[serde(default)]
    pub worker_metrics_addr: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_job_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_taxonomy_path() -> String {
    "data/taxonomy_standard_v1.json".to_string()
}

fn default_storage_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_storage_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_bucket() -> String {
    "smart-agriculture".to_string()
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_llm_temperature() -> f32 {
    0.3
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_chroma_collection() -> String {
    "agri_knowledge".to_string()
}

fn default_retrieval_top_k() -> usize {
    3
}

fn default_retrieval_cache_capacity() -> u64 {
    100
}

fn default_image_fetch_timeout_secs() -> u64 {
    10
}

fn default_worker_concurrency() -> usize {
    2
}

fn default_worker_poll_interval_ms() -> u64 {
    1000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn public_storage_url(&self) -> &str {
        self.storage_public_url
            .as_deref()
            .unwrap_or(&self.storage_endpoint)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn image_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.image_fetch_timeout_secs)
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }
}
