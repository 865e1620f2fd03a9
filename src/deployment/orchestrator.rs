//! Deployment orchestrator
//!
//! Turns a validated deployment into durable, deduplicated storage. Write
//! ordering is load-bearing for the garbage collector: every content blob
//! (asset files, the entity document, its auth chain) is durable in the
//! content store before the referencing world row is committed. See the
//! gc module for the other half of that contract.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::entity::{hashing, EntityType};
use crate::notifications::NotificationEvent;
use crate::types::Result;

use super::validations::{validate_deployment, ValidationContext, ValidationResult};
use super::{Deployment, DeploymentComponents};

/// Persists validated deployments
pub struct DeploymentOrchestrator {
    components: Arc<DeploymentComponents>,
}

impl DeploymentOrchestrator {
    pub fn new(components: Arc<DeploymentComponents>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &Arc<DeploymentComponents> {
        &self.components
    }

    /// Validate and, when valid, persist a single-shot deployment.
    ///
    /// Expected validation failures come back as a failing
    /// `ValidationResult`; only infrastructure problems are errors.
    pub async fn deploy(&self, deployment: Deployment) -> Result<ValidationResult> {
        self.deploy_at(deployment, now_ms()).await
    }

    /// `deploy` with an injected clock.
    pub async fn deploy_at(
        &self,
        deployment: Deployment,
        now_ms: u64,
    ) -> Result<ValidationResult> {
        let ctx = ValidationContext {
            deployment: &deployment,
            components: self.components.as_ref(),
            now_ms,
        };

        let result = validate_deployment(&ctx).await?;
        if !result.ok() {
            return Ok(result);
        }

        self.persist(&deployment).await?;
        self.run_post_deployment_hook(&deployment).await?;

        Ok(ValidationResult::valid())
    }

    /// Make every blob of the deployment durable, deduplicated: only hashes
    /// not already present in the store are written.
    async fn persist(&self, deployment: &Deployment) -> Result<()> {
        let storage = &self.components.storage;
        let mut written = 0usize;

        for (hash, bytes) in &deployment.files {
            if storage.exists(hash).await? {
                continue;
            }
            storage.store(hash, bytes.clone()).await?;
            written += 1;
        }

        // The entity document and its auth chain are content too
        if !storage.exists(&deployment.entity_id).await? {
            storage
                .store(&deployment.entity_id, deployment.raw_entity_bytes.clone())
                .await?;
            written += 1;
        }

        let auth_key = hashing::auth_chain_key(&deployment.entity_id);
        storage
            .store(&auth_key, deployment.auth_chain.to_json()?.into())
            .await?;

        info!(
            entity_id = %deployment.entity_id,
            files = deployment.files.len(),
            written,
            "Deployment content persisted"
        );

        Ok(())
    }

    /// Entity-type specific finalization. Unknown types are a no-op.
    async fn run_post_deployment_hook(&self, deployment: &Deployment) -> Result<()> {
        match deployment.entity.document.kind {
            EntityType::Scene => self.finalize_scene(deployment).await,
            EntityType::Profile | EntityType::Unknown => {
                debug!(
                    entity_id = %deployment.entity_id,
                    "No post-deployment hook for entity type"
                );
                Ok(())
            }
        }
    }

    /// Scene hook: resolve the owning world name, commit the world's scene
    /// index row, and emit a deployment notification.
    async fn finalize_scene(&self, deployment: &Deployment) -> Result<()> {
        let world = deployment
            .entity
            .world_name()
            .expect("scene validated with a world name");

        let owner = self.components.names.owner_of(&world).await?;
        let size_bytes = self.deduplicated_size(deployment).await?;

        let entity_json = serde_json::to_value(&deployment.entity.document)
            .expect("entity document serializes");

        // Metadata commit: content blobs are already durable at this point
        self.components
            .worlds
            .record_deployment(
                &world,
                owner,
                deployment.entity_id.clone(),
                entity_json,
                size_bytes,
            )
            .await?;

        info!(world = %world, entity_id = %deployment.entity_id, size_bytes, "World scene updated");

        let event = NotificationEvent::WorldDeployed {
            world,
            entity_id: deployment.entity_id.clone(),
        };
        if let Err(e) = self.components.notifier.send_batch(vec![event]).await {
            warn!(error = %e, "Deployment notification dropped");
        }

        Ok(())
    }

    /// Total bytes of the scene's referenced content, each unique hash
    /// counted once.
    async fn deduplicated_size(&self, deployment: &Deployment) -> Result<u64> {
        let mut total = 0u64;
        for hash in deployment.entity.content_hashes() {
            if let Some(bytes) = deployment.files.get(&hash) {
                total += bytes.len() as u64;
            } else if let Some(size) = self.components.storage.size_of(&hash).await? {
                total += size;
            }
        }
        Ok(total)
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use std::collections::HashMap;

    use crate::db::worlds::{InMemoryWorldsRepository, WorldsRepository};
    use crate::deployment::DeploymentLimits;
    use crate::entity::auth_chain::address_of;
    use crate::entity::AuthChain;
    use crate::names::{StaticNameOwnership, StaticNftOwnership};
    use crate::notifications::RecordingNotificationSender;
    use crate::permissions::repo::InMemoryPermissionsRepository;
    use crate::permissions::PermissionsEngine;
    use crate::storage::{ContentStorage, InMemoryContentStorage};

    const WORLD: &str = "foo.elohim";
    const TIMESTAMP_MS: u64 = 1_700_000_000_000;
    const NOW_MS: u64 = TIMESTAMP_MS + 1_000;

    struct Fixture {
        orchestrator: DeploymentOrchestrator,
        storage: Arc<InMemoryContentStorage>,
        worlds: Arc<InMemoryWorldsRepository>,
        names: Arc<StaticNameOwnership>,
        sender: Arc<RecordingNotificationSender>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryContentStorage::new());
        let worlds = Arc::new(InMemoryWorldsRepository::new());
        let names = Arc::new(StaticNameOwnership::new());
        let sender = Arc::new(RecordingNotificationSender::new());

        let permissions = Arc::new(PermissionsEngine::new(
            Arc::new(InMemoryPermissionsRepository::new()),
            worlds.clone(),
            Arc::new(StaticNftOwnership::new()),
            Arc::new(RecordingNotificationSender::new()),
        ));

        let components = Arc::new(DeploymentComponents {
            storage: storage.clone(),
            worlds: worlds.clone(),
            permissions,
            names: names.clone(),
            notifier: sender.clone(),
            limits: DeploymentLimits {
                max_parcels: 4,
                max_size_per_parcel_bytes: 15 * 1024 * 1024,
                deployment_ttl_ms: 300_000,
                auth_max_signature_age_secs: 600,
            },
        });

        Fixture {
            orchestrator: DeploymentOrchestrator::new(components),
            storage,
            worlds,
            names,
            sender,
        }
    }

    async fn owned_deployment(f: &Fixture, asset: &'static [u8]) -> Deployment {
        owned_deployment_titled(f, asset, "Test World").await
    }

    async fn owned_deployment_titled(
        f: &Fixture,
        asset: &'static [u8],
        title: &str,
    ) -> Deployment {
        let key = SigningKey::generate(&mut OsRng);
        let thumb = Bytes::from_static(asset);
        let thumb_hash = hashing::compute_content_hash(&thumb);

        let raw = Bytes::from(
            serde_json::to_vec(&serde_json::json!({
                "type": "scene",
                "pointers": ["0,0"],
                "timestamp": TIMESTAMP_MS,
                "content": [{ "file": "thumb.png", "hash": thumb_hash }],
                "metadata": {
                    "worldName": WORLD,
                    "title": title,
                    "thumbnail": "thumb.png",
                },
            }))
            .unwrap(),
        );
        let entity_id = hashing::compute_content_hash(&raw);
        let auth_chain = AuthChain::single_signer(&key, &entity_id);
        f.names.set_owner(WORLD, &address_of(&key.verifying_key()));

        let mut files = HashMap::new();
        files.insert(thumb_hash, thumb);

        Deployment::assemble(entity_id, raw, auth_chain, files, f.storage.as_ref())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_deploy_persists_everything() {
        let f = fixture();
        let deployment = owned_deployment(&f, b"png bytes").await;
        let entity_id = deployment.entity_id.clone();
        let content_hashes = deployment.entity.content_hashes();

        let result = f.orchestrator.deploy_at(deployment, NOW_MS).await.unwrap();
        assert!(result.ok(), "unexpected errors: {:?}", result.errors());

        // Entity, auth chain companion, and every referenced file present
        assert!(f.storage.exists(&entity_id).await.unwrap());
        assert!(f
            .storage
            .exists(&hashing::auth_chain_key(&entity_id))
            .await
            .unwrap());
        for hash in content_hashes {
            assert!(f.storage.exists(&hash).await.unwrap());
        }

        // World row committed with the deployed entity
        let world = f.worlds.get_world(WORLD).await.unwrap().unwrap();
        assert_eq!(world.entity_id.as_deref(), Some(entity_id.as_str()));
        assert_eq!(world.size_bytes, 9);
        assert!(world.owner.is_some());

        // One deployment notification
        let events = f.sender.events().await;
        assert!(matches!(
            events.as_slice(),
            [NotificationEvent::WorldDeployed { ref world, .. }] if world == WORLD
        ));
    }

    #[tokio::test]
    async fn test_failed_validation_persists_nothing() {
        let f = fixture();
        let mut deployment = owned_deployment(&f, b"png bytes").await;
        let entity_id = deployment.entity_id.clone();

        // Corrupt an uploaded file so the files stage fails
        let declared = deployment.files.keys().next().unwrap().clone();
        deployment
            .files
            .insert(declared.clone(), Bytes::from_static(b"corrupted"));

        let result = f.orchestrator.deploy_at(deployment, NOW_MS).await.unwrap();
        assert!(!result.ok());

        // Nothing leaked into the store or the world index
        assert!(!f.storage.exists(&entity_id).await.unwrap());
        assert!(!f.storage.exists(&declared).await.unwrap());
        assert!(f.worlds.get_world(WORLD).await.unwrap().is_none());
        assert!(f.sender.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_redeploy_deduplicates_unchanged_files() {
        let f = fixture();

        let first = owned_deployment(&f, b"shared asset").await;
        let result = f.orchestrator.deploy_at(first, NOW_MS).await.unwrap();
        assert!(result.ok());
        let after_first = f.storage.len();

        // A second scene (different entity bytes) referencing the same asset
        let second = owned_deployment_titled(&f, b"shared asset", "Test World v2").await;
        let second_entity = second.entity_id.clone();
        let result = f.orchestrator.deploy_at(second, NOW_MS).await.unwrap();
        assert!(result.ok(), "unexpected errors: {:?}", result.errors());

        // Only the new entity and its auth chain were added; the asset
        // deduplicated against the existing blob
        assert_eq!(f.storage.len(), after_first + 2);
        assert!(f.storage.exists(&second_entity).await.unwrap());

        // World row points at the latest entity
        let world = f.worlds.get_world(WORLD).await.unwrap().unwrap();
        assert_eq!(world.entity_id.as_deref(), Some(second_entity.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_entity_type_skips_hook() {
        let f = fixture();
        let key = SigningKey::generate(&mut OsRng);

        let raw = Bytes::from(
            serde_json::to_vec(&serde_json::json!({
                "type": "hologram",
                "pointers": ["0,0"],
                "timestamp": TIMESTAMP_MS,
                "content": [],
            }))
            .unwrap(),
        );
        let entity_id = hashing::compute_content_hash(&raw);
        let auth_chain = AuthChain::single_signer(&key, &entity_id);

        let deployment =
            Deployment::assemble(entity_id.clone(), raw, auth_chain, HashMap::new(), f.storage.as_ref())
                .await
                .unwrap();

        let result = f.orchestrator.deploy_at(deployment, NOW_MS).await.unwrap();
        assert!(result.ok(), "unexpected errors: {:?}", result.errors());

        // Content persisted, but no world row and no notification
        assert!(f.storage.exists(&entity_id).await.unwrap());
        assert!(f.worlds.deployed_worlds().await.unwrap().is_empty());
        assert!(f.sender.events().await.is_empty());
    }
}
