//! Remote object storage for test artifacts.
//!
//! The cache only needs a blob-by-key fetcher, so the S3/MinIO client
//! hides behind `ArtifactStore`; tests swap in the in-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client;
use tracing::info;

use crate::error::{Error, Result};

/// Fetches a test artifact identified by `(bucket, key)`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// S3-compatible store (MinIO in deployments), configured from the
/// environment.
#[derive(Clone)]
pub struct S3ArtifactStore {
    client: Client,
}

impl S3ArtifactStore {
    pub async fn from_env() -> Result<Self> {
        let endpoint = std::env::var("MINIO_ENDPOINT").unwrap_or_else(|_| "localhost".into());
        let port = std::env::var("MINIO_PORT").unwrap_or_else(|_| "9000".into());
        let access_key = std::env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".into());
        let secret_key = std::env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| "minioadmin".into());
        let use_ssl = std::env::var("MINIO_USE_SSL")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let protocol = if use_ssl { "https" } else { "http" };
        let endpoint_url = format!("{}://{}:{}", protocol, endpoint, port);

        info!("Connecting to object store at {}", endpoint_url);

        let credentials = Credentials::new(access_key, secret_key, None, None, "minio");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(&endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(config),
        })
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::BackingStore(format!("get {}/{}: {}", bucket, key, e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::BackingStore(format!("read {}/{}: {}", bucket, key, e)))?;
        Ok(data.into_bytes().to_vec())
    }
}

/// In-memory store used by tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    objects: std::sync::Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((bucket.to_string(), key.to_string()), data);
    }

    /// Insert `data` under its own MD5 hash, returning the key.
    pub fn put_hashed(&self, bucket: &str, data: &[u8]) -> String {
        let key = content_hash(data);
        self.put(bucket, &key, data.to_vec());
        key
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| Error::BackingStore(format!("object not found: {}/{}", bucket, key)))
    }
}

/// Hex MD5 of `data`; the content-address used throughout the cache.
pub fn content_hash(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    hex::encode(Md5::digest(data))
}
