//! Filesystem content storage
//!
//! Blobs live under `<root>/<shard>/<key>` where the shard is the last two
//! characters of the key, keeping directory fan-out bounded. Writes go
//! through a temp file and an atomic rename so a crashed write never leaves
//! a half-written blob under its final key.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::ContentStorage;
use crate::types::{FirmamentError, Result};

/// Filesystem-backed append-once blob store
pub struct FsContentStorage {
    root: PathBuf,
}

impl FsContentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn shard_of(key: &str) -> String {
        let chars: Vec<char> = key.chars().collect();
        if chars.len() < 2 {
            return "00".to_string();
        }
        chars[chars.len() - 2..].iter().collect()
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(Self::shard_of(key)).join(key)
    }

    fn io_err(context: &str, e: std::io::Error) -> FirmamentError {
        FirmamentError::Storage(format!("{}: {}", context, e))
    }
}

async fn file_size(path: &Path) -> Result<Option<u64>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FsContentStorage::io_err("stat failed", e)),
    }
}

#[async_trait]
impl ContentStorage for FsContentStorage {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(file_size(&self.path_of(key)).await?.is_some())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Bytes>> {
        match tokio::fs::read(self.path_of(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_err("read failed", e)),
        }
    }

    async fn size_of(&self, key: &str) -> Result<Option<u64>> {
        file_size(&self.path_of(key)).await
    }

    async fn store(&self, key: &str, data: Bytes) -> Result<()> {
        let target = self.path_of(key);

        // Append-once: the bytes behind a key never change
        if file_size(&target).await?.is_some() {
            debug!(key = %key, "Blob already stored, skipping write");
            return Ok(());
        }

        let shard_dir = target.parent().expect("blob path always has a parent");
        tokio::fs::create_dir_all(shard_dir)
            .await
            .map_err(|e| Self::io_err("mkdir failed", e))?;

        // Temp file + rename keeps the final key atomic
        let tmp = shard_dir.join(format!(".{}.tmp-{}", key, Uuid::new_v4()));
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| Self::io_err("write failed", e))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| Self::io_err("rename failed", e))?;

        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            match tokio::fs::remove_file(self.path_of(key)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(Self::io_err("delete failed", e)),
            }
        }
        Ok(())
    }

    async fn all_file_ids(&self, prefix: Option<String>) -> Result<BoxStream<'static, Result<String>>> {
        let root = self.root.clone();

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<String>>(64);
        tokio::spawn(async move {
            let mut shards = match tokio::fs::read_dir(&root).await {
                Ok(rd) => rd,
                // No root yet means an empty store, not an error
                Err(e) if e.kind() == ErrorKind::NotFound => return,
                Err(e) => {
                    let _ = tx.send(Err(FsContentStorage::io_err("list failed", e))).await;
                    return;
                }
            };

            loop {
                let shard = match shards.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(FsContentStorage::io_err("list failed", e))).await;
                        return;
                    }
                };

                let Ok(file_type) = shard.file_type().await else {
                    continue;
                };
                if !file_type.is_dir() {
                    continue;
                }

                let mut files = match tokio::fs::read_dir(shard.path()).await {
                    Ok(rd) => rd,
                    Err(e) => {
                        let _ = tx.send(Err(FsContentStorage::io_err("list failed", e))).await;
                        return;
                    }
                };

                loop {
                    match files.next_entry().await {
                        Ok(Some(entry)) => {
                            let name = entry.file_name().to_string_lossy().to_string();
                            // Skip in-flight temp files
                            if name.starts_with('.') {
                                continue;
                            }
                            if let Some(ref p) = prefix {
                                if !name.starts_with(p.as_str()) {
                                    continue;
                                }
                            }
                            if tx.send(Ok(name)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ =
                                tx.send(Err(FsContentStorage::io_err("list failed", e))).await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}
