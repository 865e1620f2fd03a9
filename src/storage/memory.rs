//! In-memory content storage
//!
//! DashMap-backed store for dev mode and tests. Holds every blob in process
//! memory, so only suitable for small content sets.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream};
use std::collections::HashMap;

use super::ContentStorage;
use crate::types::Result;

/// In-memory append-once blob store
#[derive(Default)]
pub struct InMemoryContentStorage {
    blobs: DashMap<String, Bytes>,
}

impl InMemoryContentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl ContentStorage for InMemoryContentStorage {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.contains_key(key))
    }

    async fn exist_multiple(&self, keys: &[String]) -> Result<HashMap<String, bool>> {
        Ok(keys
            .iter()
            .map(|key| (key.clone(), self.blobs.contains_key(key)))
            .collect())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
    }

    async fn size_of(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.blobs.get(key).map(|entry| entry.value().len() as u64))
    }

    async fn store(&self, key: &str, data: Bytes) -> Result<()> {
        // Append-once: first write wins
        self.blobs.entry(key.to_string()).or_insert(data);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.blobs.remove(key);
        }
        Ok(())
    }

    async fn all_file_ids(&self, prefix: Option<String>) -> Result<BoxStream<'static, Result<String>>> {
        let keys: Vec<String> = self
            .blobs
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| match &prefix {
                Some(p) => key.starts_with(p.as_str()),
                None => true,
            })
            .collect();

        Ok(Box::pin(stream::iter(keys.into_iter().map(Ok))))
    }
}
