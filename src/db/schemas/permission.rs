//! Permission grant document schema
//!
//! One grant record per (world, permission type, address) triple; the
//! uniqueness the relational design enforced with a UNIQUE constraint is a
//! unique compound index here. Parcel scoping is inlined as an optional
//! array: `None` denotes a world-wide grant.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::permissions::PermissionType;

/// Collection name for permission grants
pub const WORLD_PERMISSION_COLLECTION: &str = "world_permissions";

/// Permission grant stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct WorldPermissionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// World name (lowercase)
    pub world_name: String,

    /// Which access this grant covers
    pub permission_type: PermissionType,

    /// Granted address (lowercase)
    pub address: String,

    /// Granted parcels; None is a world-wide grant (superset of any list)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parcels: Option<Vec<String>>,
}

impl WorldPermissionDoc {
    pub fn world_wide(world_name: &str, permission_type: PermissionType, address: &str) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            world_name: world_name.to_lowercase(),
            permission_type,
            address: address.to_lowercase(),
            parcels: None,
        }
    }

    pub fn for_parcels(
        world_name: &str,
        permission_type: PermissionType,
        address: &str,
        parcels: Vec<String>,
    ) -> Self {
        Self {
            parcels: Some(parcels),
            ..Self::world_wide(world_name, permission_type, address)
        }
    }

    /// Whether this grant covers every parcel in `requested`.
    pub fn covers(&self, requested: &[String]) -> bool {
        match &self.parcels {
            None => true,
            Some(granted) => requested.iter().all(|p| granted.contains(p)),
        }
    }
}

impl IntoIndexes for WorldPermissionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // At most one record per (world, permission type, address)
            (
                doc! { "world_name": 1, "permission_type": 1, "address": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            // Listing grants for a world/type
            (doc! { "world_name": 1, "permission_type": 1 }, None),
            (doc! { "address": 1 }, None),
        ]
    }
}

impl MutMetadata for WorldPermissionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
