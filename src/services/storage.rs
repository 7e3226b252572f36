use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Object store holding uploaded images behind public URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    /// Public URL for an object key.
    fn public_url(&self, key: &str) -> String;

    /// Check connectivity (for health checks).
    async fn health_check(&self) -> Result<(), StorageError>;
}

/// Client for an S3-compatible bucket (MinIO in development).
pub struct S3Storage {
    bucket: Box<Bucket>,
    bucket_name: String,
    region: Region,
    credentials: Credentials,
    public_base: String,
}

impl S3Storage {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        public_base: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region.clone(), credentials.clone())
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self {
            bucket,
            bucket_name: bucket_name.to_string(),
            region,
            credentials,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    /// Create the bucket with public-read access if it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        if self.bucket.exists().await.map_err(StorageError::S3)? {
            return Ok(());
        }

        tracing::info!(bucket = %self.bucket_name, "Creating storage bucket");
        let response = Bucket::create_with_path_style(
            &self.bucket_name,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::public(),
        )
        .await
        .map_err(StorageError::S3)?;

        if !response.success() {
            return Err(StorageError::Status {
                code: response.response_code,
                context: format!("create bucket '{}'", self.bucket_name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(StorageError::Status {
                code,
                context: format!("upload '{key}'"),
            });
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base, self.bucket_name, key)
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        self.bucket
            .list_page(String::new(), None, None, None, Some(1))
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }
}

/// In-process store used by tests and local experiments.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored bytes and content type.
    pub async fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://uploads/{key}")
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Unique object key `{uuid}_{name}` for an uploaded file.
///
/// Path components and characters outside `[A-Za-z0-9._-]` are dropped from
/// the client-supplied name.
pub fn object_key(original_filename: &str) -> String {
    let base = original_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let name = if cleaned.is_empty() { "upload" } else { cleaned };
    format!("{}_{}", Uuid::new_v4(), name)
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage returned status {code} for {context}")]
    Status { code: u16, context: String },

    #[error("Storage configuration error: {0}")]
    Config(String),
}
