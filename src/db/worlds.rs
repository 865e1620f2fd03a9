//! Worlds repository
//!
//! Seam over the authoritative world metadata rows. The Mongo-backed
//! implementation serves production; the in-memory one backs dev mode and
//! tests.

use async_trait::async_trait;
use bson::doc;
use dashmap::DashMap;
use serde_json::Value as JsonValue;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{WorldDoc, WORLD_COLLECTION};
use crate::permissions::{PermissionSetting, PermissionType};
use crate::types::Result;

/// Authoritative world metadata store
#[async_trait]
pub trait WorldsRepository: Send + Sync {
    /// Fetch a world row by name.
    async fn get_world(&self, name: &str) -> Result<Option<WorldDoc>>;

    /// Commit a deployment into the world row, creating the row if needed.
    /// Existing permission settings are preserved.
    ///
    /// This is the metadata commit of a deployment; callers must have made
    /// the referenced content durable in the content store first.
    async fn record_deployment(
        &self,
        name: &str,
        owner: Option<String>,
        entity_id: String,
        entity: JsonValue,
        size_bytes: u64,
    ) -> Result<()>;

    /// Replace the access setting for one permission type, creating the
    /// world row if needed.
    async fn set_permission_setting(
        &self,
        name: &str,
        permission_type: PermissionType,
        setting: PermissionSetting,
    ) -> Result<()>;

    /// Every world row with a deployed entity. This is the garbage
    /// collector's mark input.
    async fn deployed_worlds(&self) -> Result<Vec<WorldDoc>>;
}

fn apply_setting(world: &mut WorldDoc, permission_type: PermissionType, setting: PermissionSetting) {
    match permission_type {
        PermissionType::Deployment => world.permissions.deployment = setting,
        PermissionType::Streaming => world.permissions.streaming = setting,
    }
}

// ============================================================================
// MongoDB implementation
// ============================================================================

/// Worlds repository backed by MongoDB
pub struct MongoWorldsRepository {
    collection: MongoCollection<WorldDoc>,
}

impl MongoWorldsRepository {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            collection: client.collection(WORLD_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl WorldsRepository for MongoWorldsRepository {
    async fn get_world(&self, name: &str) -> Result<Option<WorldDoc>> {
        self.collection
            .find_one(doc! { "name": name.to_lowercase() })
            .await
    }

    async fn record_deployment(
        &self,
        name: &str,
        owner: Option<String>,
        entity_id: String,
        entity: JsonValue,
        size_bytes: u64,
    ) -> Result<()> {
        let name = name.to_lowercase();
        let mut world = self
            .get_world(&name)
            .await?
            .unwrap_or_else(|| WorldDoc::named(&name));

        world.owner = owner.map(|o| o.to_lowercase());
        world.entity_id = Some(entity_id);
        world.entity = Some(entity);
        world.size_bytes = size_bytes;

        self.collection
            .upsert_one(doc! { "name": &name }, world)
            .await
    }

    async fn set_permission_setting(
        &self,
        name: &str,
        permission_type: PermissionType,
        setting: PermissionSetting,
    ) -> Result<()> {
        let name = name.to_lowercase();
        let mut world = self
            .get_world(&name)
            .await?
            .unwrap_or_else(|| WorldDoc::named(&name));

        apply_setting(&mut world, permission_type, setting);

        self.collection
            .upsert_one(doc! { "name": &name }, world)
            .await
    }

    async fn deployed_worlds(&self) -> Result<Vec<WorldDoc>> {
        self.collection
            .find_many(doc! { "entity_id": { "$ne": null } })
            .await
    }
}

// ============================================================================
// In-memory implementation (dev mode, tests)
// ============================================================================

/// Worlds repository held in process memory
#[derive(Default)]
pub struct InMemoryWorldsRepository {
    worlds: DashMap<String, WorldDoc>,
}

impl InMemoryWorldsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorldsRepository for InMemoryWorldsRepository {
    async fn get_world(&self, name: &str) -> Result<Option<WorldDoc>> {
        Ok(self.worlds.get(&name.to_lowercase()).map(|w| w.clone()))
    }

    async fn record_deployment(
        &self,
        name: &str,
        owner: Option<String>,
        entity_id: String,
        entity: JsonValue,
        size_bytes: u64,
    ) -> Result<()> {
        let name = name.to_lowercase();
        let mut world = self
            .worlds
            .entry(name.clone())
            .or_insert_with(|| WorldDoc::named(&name));

        world.owner = owner.map(|o| o.to_lowercase());
        world.entity_id = Some(entity_id);
        world.entity = Some(entity);
        world.size_bytes = size_bytes;

        Ok(())
    }

    async fn set_permission_setting(
        &self,
        name: &str,
        permission_type: PermissionType,
        setting: PermissionSetting,
    ) -> Result<()> {
        let name = name.to_lowercase();
        let mut world = self
            .worlds
            .entry(name.clone())
            .or_insert_with(|| WorldDoc::named(&name));

        apply_setting(&mut world, permission_type, setting);

        Ok(())
    }

    async fn deployed_worlds(&self) -> Result<Vec<WorldDoc>> {
        Ok(self
            .worlds
            .iter()
            .filter(|entry| entry.value().entity_id.is_some())
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_deployment_preserves_settings() {
        let repo = InMemoryWorldsRepository::new();

        repo.set_permission_setting("Foo", PermissionType::Streaming, PermissionSetting::AllowList)
            .await
            .unwrap();

        repo.record_deployment(
            "foo",
            Some("0xABC".into()),
            "bafkreientity".into(),
            serde_json::json!({ "type": "scene" }),
            1024,
        )
        .await
        .unwrap();

        let world = repo.get_world("FOO").await.unwrap().unwrap();
        assert_eq!(world.owner.as_deref(), Some("0xabc"));
        assert_eq!(world.entity_id.as_deref(), Some("bafkreientity"));
        assert_eq!(world.size_bytes, 1024);
        assert_eq!(world.permissions.streaming, PermissionSetting::AllowList);
    }

    #[tokio::test]
    async fn test_deployed_worlds_skips_undeployed() {
        let repo = InMemoryWorldsRepository::new();

        repo.set_permission_setting("empty", PermissionType::Deployment, PermissionSetting::AllowList)
            .await
            .unwrap();
        repo.record_deployment("live", None, "bafkreix".into(), serde_json::json!({}), 0)
            .await
            .unwrap();

        let deployed = repo.deployed_worlds().await.unwrap();
        assert_eq!(deployed.len(), 1);
        assert_eq!(deployed[0].name, "live");
    }
}
