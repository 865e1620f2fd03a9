//! Content-addressed entity documents
//!
//! An entity is the unit of deployment: a JSON document whose id is the
//! content hash of its own canonical bytes, pointing at one or more parcels
//! and referencing a set of content-addressed asset files. Scene entities
//! additionally carry world metadata (title, thumbnail, minimap, skybox).

pub mod auth_chain;
pub mod hashing;

pub use auth_chain::{AuthChain, AuthLink, AuthLinkKind};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

use crate::types::{FirmamentError, Result};

/// Entity type, drives post-deployment hook dispatch.
///
/// Unrecognized types deserialize to `Unknown` and get the no-op hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Scene,
    Profile,
    #[serde(other)]
    Unknown,
}

/// One referenced asset file: logical path plus content hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub file: String,
    pub hash: String,
}

/// The serialized entity document as uploaded by scene builders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDocument {
    #[serde(default)]
    pub version: Option<String>,

    #[serde(rename = "type")]
    pub kind: EntityType,

    /// Parcel coordinates ("x,y") this scene occupies; at least one
    pub pointers: Vec<String>,

    /// Client-side creation time, unix milliseconds
    pub timestamp: u64,

    /// Referenced asset files, ordered
    #[serde(default)]
    pub content: Vec<ContentItem>,

    /// Free-form scene-specific metadata
    #[serde(default)]
    pub metadata: JsonValue,
}

/// A parsed entity together with its self-verifying id
#[derive(Debug, Clone)]
pub struct Entity {
    /// Content hash of the canonical raw bytes
    pub id: String,
    pub document: EntityDocument,
}

/// Parse a parcel coordinate string "x,y".
pub fn parse_parcel(pointer: &str) -> Result<(i32, i32)> {
    let mut parts = pointer.split(',');
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FirmamentError::StructuralValidation(format!(
            "Invalid parcel pointer: {}",
            pointer
        )));
    };

    let x: i32 = x.trim().parse().map_err(|_| {
        FirmamentError::StructuralValidation(format!("Invalid parcel pointer: {}", pointer))
    })?;
    let y: i32 = y.trim().parse().map_err(|_| {
        FirmamentError::StructuralValidation(format!("Invalid parcel pointer: {}", pointer))
    })?;

    Ok((x, y))
}

impl Entity {
    /// Parse an entity from its canonical raw bytes, deriving the id from
    /// the bytes themselves.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let document: EntityDocument = serde_json::from_slice(raw)
            .map_err(|e| FirmamentError::StructuralValidation(format!("Invalid entity JSON: {}", e)))?;

        Ok(Self {
            id: hashing::compute_content_hash(raw),
            document,
        })
    }

    /// All structural problems with the document. Empty means well-formed.
    pub fn structural_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.document.pointers.is_empty() {
            errors.push("Entity must point at one or more parcels".to_string());
        }

        for pointer in &self.document.pointers {
            if parse_parcel(pointer).is_err() {
                errors.push(format!("Invalid parcel pointer: {}", pointer));
            }
        }

        if self.document.timestamp == 0 {
            errors.push("Entity timestamp is missing".to_string());
        }

        let mut seen_files = HashSet::new();
        for item in &self.document.content {
            if item.file.is_empty() {
                errors.push("Content entry with empty file name".to_string());
            } else if !seen_files.insert(item.file.to_lowercase()) {
                errors.push(format!("Duplicate content file: {}", item.file));
            }

            if let Err(e) = hashing::validate_content_hash(&item.hash) {
                errors.push(e.to_string());
            }
        }

        errors
    }

    /// Distinct referenced content hashes.
    pub fn content_hashes(&self) -> HashSet<String> {
        self.document
            .content
            .iter()
            .map(|item| item.hash.clone())
            .collect()
    }

    /// Hash of the content entry with the given file name, if referenced.
    /// File names compare case-insensitively.
    pub fn hash_for_file(&self, file: &str) -> Option<&str> {
        let wanted = file.to_lowercase();
        self.document
            .content
            .iter()
            .find(|item| item.file.to_lowercase() == wanted)
            .map(|item| item.hash.as_str())
    }

    // --- scene metadata accessors -----------------------------------------

    fn metadata_str(&self, path: &[&str]) -> Option<String> {
        let mut node = &self.document.metadata;
        for key in path {
            node = node.get(key)?;
        }
        node.as_str().map(|s| s.to_string())
    }

    /// The world name this scene deploys into (`metadata.worldName`).
    pub fn world_name(&self) -> Option<String> {
        self.metadata_str(&["worldName"])
            .map(|name| name.to_lowercase())
    }

    /// Scene title, if declared.
    pub fn title(&self) -> Option<String> {
        self.metadata_str(&["title"])
    }

    /// Declared thumbnail file name.
    pub fn thumbnail(&self) -> Option<String> {
        self.metadata_str(&["thumbnail"])
    }

    /// Minimap texture file names declared in metadata.
    pub fn minimap_files(&self) -> Vec<String> {
        ["dataImage", "estateImage"]
            .iter()
            .filter_map(|key| self.metadata_str(&["minimap", key]))
            .collect()
    }

    /// Skybox texture file names declared in metadata.
    pub fn skybox_files(&self) -> Vec<String> {
        self.document
            .metadata
            .get("skybox")
            .and_then(|s| s.get("textures"))
            .and_then(|t| t.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
