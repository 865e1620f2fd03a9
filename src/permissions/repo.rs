//! Permission grant repository
//!
//! Stores one record per (world, permission type, address). Revocation is a
//! hard delete; there is no soft-deleted permission state to reason about.

use async_trait::async_trait;
use bson::doc;
use dashmap::DashMap;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{WorldPermissionDoc, WORLD_PERMISSION_COLLECTION};
use crate::permissions::PermissionType;
use crate::types::Result;

fn triple_key(world: &str, permission_type: PermissionType, address: &str) -> String {
    format!("{}:{}:{}", world, permission_type, address)
}

/// Grant record store
#[async_trait]
pub trait PermissionsRepository: Send + Sync {
    /// The record for a triple, if any. Keys must already be lowercased.
    async fn get_record(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<Option<WorldPermissionDoc>>;

    /// Every record for (world, permission type).
    async fn records_for(
        &self,
        world: &str,
        permission_type: PermissionType,
    ) -> Result<Vec<WorldPermissionDoc>>;

    /// Insert or replace the record for the record's triple.
    async fn upsert_record(&self, record: WorldPermissionDoc) -> Result<()>;

    /// Hard-delete the record for a triple; returns whether one existed.
    async fn delete_record(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<bool>;
}

// ============================================================================
// MongoDB implementation
// ============================================================================

/// Grant records backed by MongoDB (unique compound index on the triple)
pub struct MongoPermissionsRepository {
    collection: MongoCollection<WorldPermissionDoc>,
}

impl MongoPermissionsRepository {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            collection: client.collection(WORLD_PERMISSION_COLLECTION).await?,
        })
    }

    fn triple_filter(
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> bson::Document {
        doc! {
            "world_name": world,
            "permission_type": permission_type.to_string(),
            "address": address,
        }
    }
}

#[async_trait]
impl PermissionsRepository for MongoPermissionsRepository {
    async fn get_record(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<Option<WorldPermissionDoc>> {
        self.collection
            .find_one(Self::triple_filter(world, permission_type, address))
            .await
    }

    async fn records_for(
        &self,
        world: &str,
        permission_type: PermissionType,
    ) -> Result<Vec<WorldPermissionDoc>> {
        self.collection
            .find_many(doc! {
                "world_name": world,
                "permission_type": permission_type.to_string(),
            })
            .await
    }

    async fn upsert_record(&self, record: WorldPermissionDoc) -> Result<()> {
        let filter =
            Self::triple_filter(&record.world_name, record.permission_type, &record.address);
        self.collection.upsert_one(filter, record).await
    }

    async fn delete_record(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<bool> {
        self.collection
            .delete_one(Self::triple_filter(world, permission_type, address))
            .await
    }
}

// ============================================================================
// In-memory implementation (dev mode, tests)
// ============================================================================

/// Grant records held in process memory
#[derive(Default)]
pub struct InMemoryPermissionsRepository {
    records: DashMap<String, WorldPermissionDoc>,
}

impl InMemoryPermissionsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl PermissionsRepository for InMemoryPermissionsRepository {
    async fn get_record(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<Option<WorldPermissionDoc>> {
        Ok(self
            .records
            .get(&triple_key(world, permission_type, address))
            .map(|r| r.clone()))
    }

    async fn records_for(
        &self,
        world: &str,
        permission_type: PermissionType,
    ) -> Result<Vec<WorldPermissionDoc>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| {
                entry.value().world_name == world && entry.value().permission_type == permission_type
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn upsert_record(&self, record: WorldPermissionDoc) -> Result<()> {
        let key = triple_key(&record.world_name, record.permission_type, &record.address);
        self.records.insert(key, record);
        Ok(())
    }

    async fn delete_record(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<bool> {
        Ok(self
            .records
            .remove(&triple_key(world, permission_type, address))
            .is_some())
    }
}
