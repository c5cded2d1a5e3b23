mod local;

pub use local::LocalStore;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Internal(String),
}

/// A store for opaque blobs keyed by string paths.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write (create or overwrite) a blob.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError>;

    /// Read a blob. Returns `StoreError::NotFound` if absent.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Delete a blob. No-op if absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Check if a blob exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// -- Key helpers --

/// Content-addressed blob key: digest plus the original extension, so the
/// same bytes uploaded twice land on the same path.
pub fn blob_key(digest: &str, ext: &str) -> String {
    if ext.is_empty() {
        format!("blobs/{digest}")
    } else {
        format!("blobs/{digest}.{ext}")
    }
}

// -- Configuration --

pub struct StoreConfig {
    /// Filesystem base directory. Falls back to the shared data dir.
    pub data_dir: Option<String>,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("CREDITFLOW_DATA_DIR").ok(),
        }
    }
}

// -- Factory --

pub fn create_store(config: &StoreConfig) -> Arc<dyn BlobStore> {
    Arc::new(LocalStore::new(config))
}
