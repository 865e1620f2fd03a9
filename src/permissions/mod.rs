//! Access control for worlds
//!
//! Two permission types gate a world: `deployment` (who may publish scenes)
//! and `streaming` (who may cast into the world's comms). Each type carries
//! exactly one setting kind; allow-list settings are backed by per-address
//! grant records that are either world-wide or scoped to a parcel set.

pub mod engine;
pub mod repo;

pub use engine::{GrantScope, ParcelGrantOutcome, PermissionsEngine, PermissionsSummary};
pub use repo::{InMemoryPermissionsRepository, MongoPermissionsRepository, PermissionsRepository};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{FirmamentError, Result};

/// Which access a permission grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    #[default]
    Deployment,
    Streaming,
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionType::Deployment => write!(f, "deployment"),
            PermissionType::Streaming => write!(f, "streaming"),
        }
    }
}

/// How a permission type is gated for one world.
///
/// Exactly one kind applies per (world, permission type); dispatch over the
/// kinds is always an exhaustive match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PermissionSetting {
    /// Always allow
    Unrestricted,
    /// Allow addresses holding a grant record (world-wide or parcel-scoped)
    #[default]
    AllowList,
    /// Allow addresses owning a given NFT (checked via collaborator)
    NftOwnership { nft: String },
    /// Allow callers presenting the shared secret (stored argon2-hashed)
    SharedSecret { secret_hash: String },
}

impl PermissionSetting {
    /// Build a shared-secret setting, hashing the plaintext immediately.
    pub fn shared_secret(plain: &str) -> Result<Self> {
        Ok(PermissionSetting::SharedSecret {
            secret_hash: hash_shared_secret(plain)?,
        })
    }

    /// Short kind label for logs and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            PermissionSetting::Unrestricted => "unrestricted",
            PermissionSetting::AllowList => "allow-list",
            PermissionSetting::NftOwnership { .. } => "nft-ownership",
            PermissionSetting::SharedSecret { .. } => "shared-secret",
        }
    }
}

/// Per-world settings for both permission types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldPermissions {
    pub deployment: PermissionSetting,
    pub streaming: PermissionSetting,
}

impl Default for WorldPermissions {
    fn default() -> Self {
        Self {
            deployment: PermissionSetting::AllowList,
            streaming: PermissionSetting::Unrestricted,
        }
    }
}

impl WorldPermissions {
    pub fn setting_for(&self, permission_type: PermissionType) -> &PermissionSetting {
        match permission_type {
            PermissionType::Deployment => &self.deployment,
            PermissionType::Streaming => &self.streaming,
        }
    }
}

/// Hash a shared secret using Argon2id
///
/// Returns the PHC-formatted hash string that includes the salt and parameters.
pub fn hash_shared_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| FirmamentError::Internal(format!("Failed to hash secret: {e}")))
}

/// Verify a shared secret against a stored hash
pub fn verify_shared_secret(secret: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| FirmamentError::Internal(format!("Invalid secret hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok())
}
