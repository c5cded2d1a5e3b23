use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{BlobStore, StoreConfig, StoreError};

pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    pub fn new(config: &StoreConfig) -> Self {
        let base_dir = config
            .data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }
}

/// Reproduce the same default data directory logic as `creditflow_db::data_dir()`
/// without taking a dependency on the db crate.
fn default_data_dir() -> PathBuf {
    let base = if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".local/share")
    } else {
        PathBuf::from(".")
    };
    base.join("creditflow")
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Internal(format!("mkdir: {e}")))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| StoreError::Internal(format!("write {}: {e}", path.display())))
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.resolve(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::Internal(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(key, "blob already absent on delete");
                Ok(())
            }
            Err(e) => Err(StoreError::Internal(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.resolve(key);
        match tokio::fs::try_exists(&path).await {
            Ok(exists) => Ok(exists),
            Err(e) => Err(StoreError::Internal(format!(
                "exists {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_key;

    fn test_store(dir: &std::path::Path) -> LocalStore {
        let config = StoreConfig {
            data_dir: Some(dir.to_string_lossy().to_string()),
        };
        LocalStore::new(&config)
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());

        let key = blob_key("abc123", "pdf");
        store.put(&key, Bytes::from("hello world")).await.unwrap();
        let data = store.get(&key).await.unwrap();
        assert_eq!(data.as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn get_missing_returns_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());

        let err = store.get("blobs/nonexistent").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn put_overwrites_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());

        store.put("key", Bytes::from("first")).await.unwrap();
        store.put("key", Bytes::from("second")).await.unwrap();

        let data = store.get("key").await.unwrap();
        assert_eq!(data.as_ref(), b"second");
    }

    #[tokio::test]
    async fn delete_removes_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());

        store.put("key", Bytes::from("data")).await.unwrap();
        assert!(store.exists("key").await.unwrap());

        store.delete("key").await.unwrap();
        assert!(!store.exists("key").await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());

        store.delete("nonexistent").await.unwrap();
    }

    #[tokio::test]
    async fn exists_returns_correct_values() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());

        assert!(!store.exists("key").await.unwrap());
        store.put("key", Bytes::from("data")).await.unwrap();
        assert!(store.exists("key").await.unwrap());
    }

    #[tokio::test]
    async fn binary_content_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());

        let content: Vec<u8> = (0..=255).collect();
        store
            .put("blobs/bin", Bytes::from(content.clone()))
            .await
            .unwrap();
        let data = store.get("blobs/bin").await.unwrap();
        assert_eq!(data.as_ref(), content.as_slice());
    }
}
