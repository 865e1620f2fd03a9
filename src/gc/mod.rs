//! Mark-and-sweep garbage collection over the content store
//!
//! Mark: scan every world row with a deployed entity and union
//! {entity id, entity id + ".auth", every referenced content hash} into a
//! live set. Sweep: enumerate all store keys and delete, in bounded
//! batches, every key outside the live set.
//!
//! There is no lock against concurrently-finalizing deployments. Safety
//! rests on the orchestrator's write ordering: content blobs are durable
//! before the referencing world row commits, so any blob reachable from a
//! committed row is present, and a row observed by the mark phase fully
//! protects its blobs. The window between a content write and its metadata
//! commit remains exposed to a concurrently-running sweep (see DESIGN.md).

use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::worlds::WorldsRepository;
use crate::entity::hashing;
use crate::storage::ContentStorage;
use crate::types::Result;

/// Outcome of one collection pass
#[derive(Debug, Clone, Default)]
pub struct GcSummary {
    /// Keys reachable from world metadata
    pub live: usize,
    /// Keys enumerated in the content store
    pub scanned: usize,
    /// Keys outside the live set
    pub candidates: usize,
    /// Keys actually deleted (0 on dry runs)
    pub deleted: usize,
}

/// Reconciles the content store against the world metadata
pub struct GarbageCollector {
    storage: Arc<dyn ContentStorage>,
    worlds: Arc<dyn WorldsRepository>,
    /// Deletes are issued in batches of this size
    batch_size: usize,
    /// Optional key prefix limiting the sweep
    prefix: Option<String>,
}

impl GarbageCollector {
    pub fn new(
        storage: Arc<dyn ContentStorage>,
        worlds: Arc<dyn WorldsRepository>,
        batch_size: usize,
    ) -> Self {
        Self {
            storage,
            worlds,
            batch_size,
            prefix: None,
        }
    }

    /// Restrict the sweep to keys with the given prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Run one mark-and-sweep pass. With `dry_run` the candidates are
    /// counted but nothing is deleted.
    pub async fn run(&self, dry_run: bool) -> Result<GcSummary> {
        let live = self.mark().await?;
        let mut summary = GcSummary {
            live: live.len(),
            ..Default::default()
        };

        let mut stream = self.storage.all_file_ids(self.prefix.clone()).await?;
        let mut batch: Vec<String> = Vec::with_capacity(self.batch_size);

        while let Some(key) = stream.next().await {
            let key = key?;
            summary.scanned += 1;

            if live.contains(&key) {
                continue;
            }
            summary.candidates += 1;

            if dry_run {
                continue;
            }

            batch.push(key);
            if batch.len() >= self.batch_size {
                self.storage.delete(&batch).await?;
                summary.deleted += batch.len();
                debug!(deleted = summary.deleted, "GC batch deleted");
                batch.clear();
            }
        }

        if !batch.is_empty() {
            self.storage.delete(&batch).await?;
            summary.deleted += batch.len();
        }

        info!(
            live = summary.live,
            scanned = summary.scanned,
            candidates = summary.candidates,
            deleted = summary.deleted,
            dry_run,
            "Garbage collection finished"
        );

        Ok(summary)
    }

    /// Build the live set from every deployed world row.
    async fn mark(&self) -> Result<HashSet<String>> {
        let mut live = HashSet::new();

        for world in self.worlds.deployed_worlds().await? {
            let Some(entity_id) = world.entity_id.clone() else {
                continue;
            };

            live.insert(hashing::auth_chain_key(&entity_id));
            live.insert(entity_id);
            for hash in world.content_hashes() {
                live.insert(hash);
            }
        }

        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::db::worlds::InMemoryWorldsRepository;
    use crate::storage::InMemoryContentStorage;

    struct Fixture {
        gc: GarbageCollector,
        storage: Arc<InMemoryContentStorage>,
        worlds: Arc<InMemoryWorldsRepository>,
    }

    fn fixture_with_batch(batch_size: usize) -> Fixture {
        let storage = Arc::new(InMemoryContentStorage::new());
        let worlds = Arc::new(InMemoryWorldsRepository::new());
        let gc = GarbageCollector::new(storage.clone(), worlds.clone(), batch_size);
        Fixture { gc, storage, worlds }
    }

    fn fixture() -> Fixture {
        fixture_with_batch(500)
    }

    /// Store content blobs then commit the referencing world row, in the
    /// orchestrator's ordering.
    async fn deploy_world(f: &Fixture, name: &str, entity_id: &str, hashes: &[&str]) {
        for hash in hashes {
            f.storage.store(hash, Bytes::from_static(b"blob")).await.unwrap();
        }
        f.storage
            .store(entity_id, Bytes::from_static(b"entity"))
            .await
            .unwrap();
        f.storage
            .store(&hashing::auth_chain_key(entity_id), Bytes::from_static(b"chain"))
            .await
            .unwrap();

        let content: Vec<serde_json::Value> = hashes
            .iter()
            .map(|h| serde_json::json!({ "file": format!("{h}.bin"), "hash": h }))
            .collect();
        f.worlds
            .record_deployment(
                name,
                None,
                entity_id.to_string(),
                serde_json::json!({ "type": "scene", "content": content }),
                0,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_deletes_exactly_the_unreferenced_keys() {
        let f = fixture();

        deploy_world(&f, "alpha", "bafkreientity", &["bafkreiaaa", "bafkreibbb"]).await;

        // Orphans from an undeployed upload
        f.storage.store("bafkreiorphan", Bytes::from_static(b"x")).await.unwrap();
        f.storage
            .store("bafkreiold.auth", Bytes::from_static(b"y"))
            .await
            .unwrap();

        let summary = f.gc.run(false).await.unwrap();

        assert_eq!(summary.live, 4);
        assert_eq!(summary.scanned, 6);
        assert_eq!(summary.candidates, 2);
        assert_eq!(summary.deleted, 2);

        // Referenced keys survive, orphans are gone
        assert!(f.storage.exists("bafkreientity").await.unwrap());
        assert!(f.storage.exists("bafkreientity.auth").await.unwrap());
        assert!(f.storage.exists("bafkreiaaa").await.unwrap());
        assert!(f.storage.exists("bafkreibbb").await.unwrap());
        assert!(!f.storage.exists("bafkreiorphan").await.unwrap());
        assert!(!f.storage.exists("bafkreiold.auth").await.unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let f = fixture();

        deploy_world(&f, "alpha", "bafkreientity", &["bafkreiaaa"]).await;
        f.storage.store("bafkreiorphan", Bytes::from_static(b"x")).await.unwrap();

        let summary = f.gc.run(true).await.unwrap();

        assert_eq!(summary.candidates, 1);
        assert_eq!(summary.deleted, 0);
        assert!(f.storage.exists("bafkreiorphan").await.unwrap());
    }

    #[tokio::test]
    async fn test_bounded_batches_delete_everything() {
        let f = fixture_with_batch(2);

        for i in 0..5 {
            f.storage
                .store(&format!("bafkreiorphan{i}"), Bytes::from_static(b"x"))
                .await
                .unwrap();
        }

        let summary = f.gc.run(false).await.unwrap();
        assert_eq!(summary.deleted, 5);
        assert_eq!(f.storage.len(), 0);
    }

    #[tokio::test]
    async fn test_shared_content_survives_while_any_referent_lives() {
        let f = fixture();

        // Two worlds share one asset
        deploy_world(&f, "alpha", "bafkreialpha", &["bafkreishared"]).await;
        deploy_world(&f, "beta", "bafkreibeta", &["bafkreishared", "bafkreibonly"]).await;

        f.gc.run(false).await.unwrap();
        assert!(f.storage.exists("bafkreishared").await.unwrap());

        // Alpha redeploys without the shared asset; beta still references it
        f.worlds
            .record_deployment(
                "alpha",
                None,
                "bafkreialpha2".to_string(),
                serde_json::json!({ "type": "scene", "content": [] }),
                0,
            )
            .await
            .unwrap();
        f.storage
            .store("bafkreialpha2", Bytes::from_static(b"entity"))
            .await
            .unwrap();
        f.storage
            .store("bafkreialpha2.auth", Bytes::from_static(b"chain"))
            .await
            .unwrap();

        let summary = f.gc.run(false).await.unwrap();
        assert!(f.storage.exists("bafkreishared").await.unwrap());
        assert!(!f.storage.exists("bafkreialpha").await.unwrap());
        // Old alpha entity + auth chain collected
        assert_eq!(summary.deleted, 2);
    }

    #[tokio::test]
    async fn test_completed_deployment_always_survives_a_later_pass() {
        // The orchestrator writes content before committing metadata, so a
        // mark snapshot taken after the commit fully protects the blobs.
        let f = fixture();

        deploy_world(&f, "alpha", "bafkreientity", &["bafkreiaaa"]).await;

        for _ in 0..3 {
            let summary = f.gc.run(false).await.unwrap();
            assert_eq!(summary.deleted, 0);
        }
        assert!(f.storage.exists("bafkreientity").await.unwrap());
        assert!(f.storage.exists("bafkreiaaa").await.unwrap());
    }

    #[tokio::test]
    async fn test_prefix_scoped_sweep() {
        let f = fixture();

        f.storage.store("bafkreiorphan", Bytes::from_static(b"x")).await.unwrap();
        f.storage.store("qmorphan", Bytes::from_static(b"y")).await.unwrap();

        let gc = GarbageCollector::new(f.storage.clone(), f.worlds.clone(), 500)
            .with_prefix("bafkrei");
        let summary = gc.run(false).await.unwrap();

        assert_eq!(summary.scanned, 1);
        assert!(!f.storage.exists("bafkreiorphan").await.unwrap());
        // Outside the prefix, untouched
        assert!(f.storage.exists("qmorphan").await.unwrap());
    }
}
