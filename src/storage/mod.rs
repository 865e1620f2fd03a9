//! Content-addressable blob storage
//!
//! The store is append-once and keyed by content hash: a key's bytes never
//! change, so existence is the only interesting question for writers and
//! dedup falls out of the keying scheme. Deletion only happens through the
//! garbage collector.

pub mod fs;
pub mod memory;

pub use fs::FsContentStorage;
pub use memory::InMemoryContentStorage;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::collections::HashMap;

use crate::types::Result;

/// Content-addressable storage contract.
///
/// Implementations must be safe for concurrent use; `store` for a key that
/// already exists is a no-op (same key, same bytes).
#[async_trait]
pub trait ContentStorage: Send + Sync {
    /// Whether a blob exists under this key.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Batch existence check; every requested key appears in the result.
    async fn exist_multiple(&self, keys: &[String]) -> Result<HashMap<String, bool>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            out.insert(key.clone(), self.exists(key).await?);
        }
        Ok(out)
    }

    /// Fetch a blob's bytes, or None when absent.
    async fn retrieve(&self, key: &str) -> Result<Option<Bytes>>;

    /// Size in bytes of a stored blob without reading it, or None when absent.
    async fn size_of(&self, key: &str) -> Result<Option<u64>>;

    /// Write a blob under its key. Append-once: existing keys are left as-is.
    async fn store(&self, key: &str, data: Bytes) -> Result<()>;

    /// Delete a batch of keys. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<()>;

    /// Lazily enumerate every stored key, optionally prefix-scoped.
    /// Restartable: each call begins a fresh enumeration.
    async fn all_file_ids(&self, prefix: Option<String>) -> Result<BoxStream<'static, Result<String>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::Arc;

    // Contract tests run against both implementations.
    async fn exercise_contract(storage: Arc<dyn ContentStorage>) {
        assert!(!storage.exists("bafkreione").await.unwrap());

        storage
            .store("bafkreione", Bytes::from_static(b"first"))
            .await
            .unwrap();
        storage
            .store("bafkreitwo", Bytes::from_static(b"second"))
            .await
            .unwrap();

        assert!(storage.exists("bafkreione").await.unwrap());
        assert_eq!(
            storage.retrieve("bafkreione").await.unwrap().unwrap(),
            Bytes::from_static(b"first")
        );
        assert_eq!(storage.size_of("bafkreitwo").await.unwrap(), Some(6));
        assert_eq!(storage.size_of("bafkreimissing").await.unwrap(), None);

        let existence = storage
            .exist_multiple(&["bafkreione".into(), "bafkreimissing".into()])
            .await
            .unwrap();
        assert_eq!(existence["bafkreione"], true);
        assert_eq!(existence["bafkreimissing"], false);

        // Append-once: re-store does not fail
        storage
            .store("bafkreione", Bytes::from_static(b"first"))
            .await
            .unwrap();

        let mut keys: Vec<String> = storage
            .all_file_ids(None)
            .await
            .unwrap()
            .map(|k| k.unwrap())
            .collect()
            .await;
        keys.sort();
        assert_eq!(keys, vec!["bafkreione".to_string(), "bafkreitwo".to_string()]);

        let prefixed: Vec<String> = storage
            .all_file_ids(Some("bafkreit".into()))
            .await
            .unwrap()
            .map(|k| k.unwrap())
            .collect()
            .await;
        assert_eq!(prefixed, vec!["bafkreitwo".to_string()]);

        storage.delete(&["bafkreione".into()]).await.unwrap();
        assert!(!storage.exists("bafkreione").await.unwrap());
        // Deleting a missing key is fine
        storage.delete(&["bafkreione".into()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_contract() {
        exercise_contract(Arc::new(InMemoryContentStorage::new())).await;
    }

    #[tokio::test]
    async fn test_fs_contract() {
        let dir = std::env::temp_dir().join(format!("firmament-store-{}", uuid::Uuid::new_v4()));
        exercise_contract(Arc::new(FsContentStorage::new(dir.clone()))).await;
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
