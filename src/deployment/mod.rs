//! Scene deployments
//!
//! A deployment carries an entity document, the auth chain proving who
//! signed it, and the uploaded asset files. The validation pipeline
//! (`validations`) decides whether it may land; the orchestrator
//! (`orchestrator`) makes it durable; `ongoing` adds the resumable
//! init/add-file/complete flow for large deployments.

pub mod ongoing;
pub mod orchestrator;
pub mod validations;

pub use ongoing::{OngoingDeployments, StartDeploymentResponse};
pub use orchestrator::DeploymentOrchestrator;
pub use validations::{validate_deployment, ValidationContext, ValidationResult};

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Args;
use crate::db::worlds::WorldsRepository;
use crate::entity::{AuthChain, Entity};
use crate::names::NameOwnership;
use crate::notifications::NotificationSender;
use crate::permissions::PermissionsEngine;
use crate::storage::ContentStorage;
use crate::types::Result;

/// Quota knobs the pipeline enforces
#[derive(Debug, Clone)]
pub struct DeploymentLimits {
    /// Maximum parcels a scene may occupy
    pub max_parcels: usize,
    /// Maximum deployed bytes per parcel
    pub max_size_per_parcel_bytes: u64,
    /// Maximum age of a deployment request in milliseconds
    pub deployment_ttl_ms: u64,
    /// Maximum age of delegation signatures in seconds (0 disables)
    pub auth_max_signature_age_secs: u64,
}

impl DeploymentLimits {
    pub fn from_args(args: &Args) -> Self {
        Self {
            max_parcels: args.max_parcels,
            max_size_per_parcel_bytes: args.max_size_per_parcel_bytes,
            deployment_ttl_ms: args.deployment_ttl_seconds * 1000,
            auth_max_signature_age_secs: args.auth_max_signature_age_seconds,
        }
    }
}

/// Everything a deployment needs to validate and persist
pub struct DeploymentComponents {
    pub storage: Arc<dyn ContentStorage>,
    pub worlds: Arc<dyn WorldsRepository>,
    pub permissions: Arc<PermissionsEngine>,
    pub names: Arc<dyn NameOwnership>,
    pub notifier: Arc<dyn NotificationSender>,
    pub limits: DeploymentLimits,
}

/// One deployment request, alive for the duration of a single attempt
pub struct Deployment {
    /// Entity id the client claims (verified against the bytes in stage 1)
    pub entity_id: String,
    /// Parsed entity with its recomputed id
    pub entity: Entity,
    /// Canonical entity bytes as uploaded
    pub raw_entity_bytes: Bytes,
    pub auth_chain: AuthChain,
    /// Uploaded files by declared content hash
    pub files: HashMap<String, Bytes>,
    /// Which referenced hashes already exist durably in the content store
    pub hashes_in_storage: HashMap<String, bool>,
}

impl Deployment {
    /// Assemble a deployment, probing the content store for every referenced
    /// hash that was not uploaded with the request.
    pub async fn assemble(
        entity_id: String,
        raw_entity_bytes: Bytes,
        auth_chain: AuthChain,
        files: HashMap<String, Bytes>,
        storage: &dyn ContentStorage,
    ) -> Result<Self> {
        let entity = Entity::from_bytes(&raw_entity_bytes)?;

        let missing: Vec<String> = entity
            .content_hashes()
            .into_iter()
            .filter(|hash| !files.contains_key(hash))
            .collect();
        let hashes_in_storage = storage.exist_multiple(&missing).await?;

        Ok(Self {
            entity_id,
            entity,
            raw_entity_bytes,
            auth_chain,
            files,
            hashes_in_storage,
        })
    }

    /// Whether a referenced hash is available: uploaded with the request or
    /// already durable in the store.
    pub fn is_hash_available(&self, hash: &str) -> bool {
        self.files.contains_key(hash)
            || self.hashes_in_storage.get(hash).copied().unwrap_or(false)
    }
}
