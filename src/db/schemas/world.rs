//! World document schema
//!
//! One row per world name: the currently deployed scene entity, its owner,
//! the deduplicated content size, and the access settings for both
//! permission types. This collection is the authoritative metadata the
//! garbage collector marks from.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::permissions::WorldPermissions;

/// Collection name for worlds
pub const WORLD_COLLECTION: &str = "worlds";

/// World document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct WorldDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// World name (lowercase, unique)
    pub name: String,

    /// Address that owned the world name at last deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Content hash of the currently deployed entity, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// The deployed entity document (including its content references)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<JsonValue>,

    /// Total deduplicated content bytes of the deployed scene
    #[serde(default)]
    pub size_bytes: u64,

    /// Access settings for both permission types
    #[serde(default)]
    pub permissions: WorldPermissions,
}

impl WorldDoc {
    /// Create an empty world row (no deployment yet) with default settings
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            metadata: Metadata::new(),
            ..Default::default()
        }
    }

    /// Referenced content hashes of the deployed entity, if deployed
    pub fn content_hashes(&self) -> Vec<String> {
        self.entity
            .as_ref()
            .and_then(|entity| entity.get("content"))
            .and_then(|content| content.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("hash"))
                    .filter_map(|hash| hash.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl IntoIndexes for WorldDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One row per world name
            (
                doc! { "name": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            // GC mark scan: worlds with a deployed entity
            (doc! { "entity_id": 1 }, None),
            (doc! { "owner": 1 }, None),
        ]
    }
}

impl MutMetadata for WorldDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hashes_from_entity_json() {
        let mut world = WorldDoc::named("Foo.Elohim");
        assert_eq!(world.name, "foo.elohim");
        assert!(world.content_hashes().is_empty());

        world.entity = Some(serde_json::json!({
            "type": "scene",
            "content": [
                { "file": "scene.json", "hash": "bafkreiaaa" },
                { "file": "model.glb", "hash": "bafkreibbb" },
            ],
        }));

        assert_eq!(world.content_hashes(), vec!["bafkreiaaa", "bafkreibbb"]);
    }
}
