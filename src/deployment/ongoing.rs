//! Incremental deployments
//!
//! Large deployments arrive in three steps: `init` declares the entity and a
//! manifest of content hashes with expected sizes, `add_file` uploads one
//! blob at a time, `complete` re-runs the full validation pipeline against
//! the assembled set and persists through the orchestrator.
//!
//! Pending state is scoped per entity id and never outlives one deployment
//! attempt: `complete` discards the temp files and the pending record on
//! every exit path, success or failure. No lock is held across the three
//! calls; a second `init` for the same entity id replaces the first record
//! (last-writer-wins, logged at warn level).

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entity::{hashing, AuthChain, Entity};
use crate::types::{FirmamentError, Result};

use super::orchestrator::{now_ms, DeploymentOrchestrator};
use super::validations::ValidationResult;
use super::Deployment;

const ENTITY_FILE: &str = "entity.json";

/// Reply to `init`: which manifest hashes still need uploading
#[derive(Debug, Clone)]
pub struct StartDeploymentResponse {
    /// Manifest hashes already durable in the content store
    pub available: Vec<String>,
    /// Manifest hashes the client must upload via `add_file`
    pub missing: Vec<String>,
}

/// Pending record for one in-flight incremental deployment
struct PendingDeployment {
    auth_chain: AuthChain,
    /// Declared content hash -> expected byte size
    manifest: HashMap<String, u64>,
    /// Uploaded so far (subset of manifest keys)
    uploaded: HashSet<String>,
    started_at: Instant,
    /// Per-attempt scratch directory holding the entity copy and buffered files
    temp_dir: PathBuf,
}

/// Manager for the init / add-file / complete flow
pub struct OngoingDeployments {
    orchestrator: Arc<DeploymentOrchestrator>,
    temp_root: PathBuf,
    pending: DashMap<String, PendingDeployment>,
}

impl OngoingDeployments {
    pub fn new(orchestrator: Arc<DeploymentOrchestrator>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            temp_root: temp_root.into(),
            pending: DashMap::new(),
        }
    }

    /// Number of in-flight deployments
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Start (or restart) an incremental deployment for one entity id.
    pub async fn init(
        &self,
        entity_id: &str,
        raw_entity_bytes: Bytes,
        auth_chain: AuthChain,
        manifest: HashMap<String, u64>,
    ) -> Result<StartDeploymentResponse> {
        // Entity bytes must at least parse; everything else waits for complete
        Entity::from_bytes(&raw_entity_bytes)?;

        let hashes: Vec<String> = manifest.keys().cloned().collect();
        let existence = self
            .orchestrator
            .components()
            .storage
            .exist_multiple(&hashes)
            .await?;

        let mut available: Vec<String> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        for hash in hashes {
            if existence.get(&hash).copied().unwrap_or(false) {
                available.push(hash);
            } else {
                missing.push(hash);
            }
        }
        available.sort();
        missing.sort();

        // Buffer the entity bytes in a fresh per-attempt scratch dir
        let temp_dir = self.temp_root.join(format!("{}-{}", entity_id, Uuid::new_v4()));
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .map_err(|e| FirmamentError::Storage(format!("mkdir failed: {}", e)))?;
        tokio::fs::write(temp_dir.join(ENTITY_FILE), &raw_entity_bytes)
            .await
            .map_err(|e| FirmamentError::Storage(format!("write failed: {}", e)))?;

        let record = PendingDeployment {
            auth_chain,
            manifest,
            uploaded: HashSet::new(),
            started_at: Instant::now(),
            temp_dir,
        };

        // Last-writer-wins: a concurrent init for the same entity id
        // silently replaces the previous attempt
        if let Some(previous) = self.pending.insert(entity_id.to_string(), record) {
            warn!(
                entity_id = %entity_id,
                "Replacing in-flight incremental deployment (last-writer-wins)"
            );
            remove_temp_dir(&previous.temp_dir).await;
        }

        info!(
            entity_id = %entity_id,
            available = available.len(),
            missing = missing.len(),
            "Incremental deployment started"
        );

        Ok(StartDeploymentResponse { available, missing })
    }

    /// Buffer one uploaded file for a pending deployment.
    pub async fn add_file(&self, entity_id: &str, declared_hash: &str, bytes: Bytes) -> Result<()> {
        let temp_dir = {
            let record = self.pending.get(entity_id).ok_or_else(|| {
                FirmamentError::NotFound(format!(
                    "No ongoing deployment for entity {}",
                    entity_id
                ))
            })?;

            let Some(&expected_size) = record.manifest.get(declared_hash) else {
                return Err(FirmamentError::StructuralValidation(format!(
                    "Unexpected file {}: not part of the deployment manifest",
                    declared_hash
                )));
            };

            if bytes.len() as u64 != expected_size {
                return Err(FirmamentError::StructuralValidation(format!(
                    "File {} is {} bytes but the manifest declared {}",
                    declared_hash,
                    bytes.len(),
                    expected_size
                )));
            }

            hashing::verify_content_hash(&bytes, declared_hash)?;

            record.temp_dir.clone()
        };

        tokio::fs::write(temp_dir.join(declared_hash), &bytes)
            .await
            .map_err(|e| FirmamentError::Storage(format!("write failed: {}", e)))?;

        if let Some(mut record) = self.pending.get_mut(entity_id) {
            record.uploaded.insert(declared_hash.to_string());
        }

        debug!(entity_id = %entity_id, hash = %declared_hash, "Deployment file buffered");

        Ok(())
    }

    /// Assemble and finish a pending deployment. The validation pipeline
    /// runs against current state (fresh storage probes, buffered files).
    ///
    /// Temp files and the pending record are discarded on every exit path.
    pub async fn complete(&self, entity_id: &str) -> Result<ValidationResult> {
        let result = self.complete_inner(entity_id).await;

        // Guaranteed cleanup, not conditional on the outcome above
        self.discard(entity_id).await;

        result
    }

    async fn complete_inner(&self, entity_id: &str) -> Result<ValidationResult> {
        let (auth_chain, uploaded, temp_dir) = {
            let record = self.pending.get(entity_id).ok_or_else(|| {
                FirmamentError::NotFound(format!(
                    "No ongoing deployment for entity {}",
                    entity_id
                ))
            })?;
            (
                record.auth_chain.clone(),
                record.uploaded.clone(),
                record.temp_dir.clone(),
            )
        };

        let raw_entity_bytes = tokio::fs::read(temp_dir.join(ENTITY_FILE))
            .await
            .map(Bytes::from)
            .map_err(|e| FirmamentError::Storage(format!("read failed: {}", e)))?;

        let mut files = HashMap::with_capacity(uploaded.len());
        for hash in uploaded {
            let bytes = tokio::fs::read(temp_dir.join(&hash))
                .await
                .map(Bytes::from)
                .map_err(|e| FirmamentError::Storage(format!("read failed: {}", e)))?;
            files.insert(hash, bytes);
        }

        let deployment = Deployment::assemble(
            entity_id.to_string(),
            raw_entity_bytes,
            auth_chain,
            files,
            self.orchestrator.components().storage.as_ref(),
        )
        .await?;

        self.orchestrator.deploy_at(deployment, now_ms()).await
    }

    /// Drop the pending record and its temp files for one entity id.
    pub async fn discard(&self, entity_id: &str) {
        if let Some((_, record)) = self.pending.remove(entity_id) {
            remove_temp_dir(&record.temp_dir).await;
            debug!(entity_id = %entity_id, "Ongoing deployment discarded");
        }
    }

    /// Evict pending deployments older than `max_age`, with their temp
    /// files. Returns how many were pruned.
    pub async fn prune_stale(&self, max_age: Duration) -> usize {
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| entry.value().started_at.elapsed() > max_age)
            .map(|entry| entry.key().clone())
            .collect();

        for entity_id in &stale {
            warn!(entity_id = %entity_id, "Pruning stale incremental deployment");
            self.discard(entity_id).await;
        }

        stale.len()
    }
}

async fn remove_temp_dir(dir: &PathBuf) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), error = %e, "Failed to remove deployment temp dir");
        }
    }
}
