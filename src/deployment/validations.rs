//! Deployment validation pipeline
//!
//! An ordered list of independent validators, evaluated fail-fast: the
//! pipeline stops at the first failing stage and returns its errors. The
//! order is deliberate - cheap structural checks run first, storage- and
//! DB-touching checks last, so malformed input never pays network cost.
//!
//! Expected validation failures are values, not errors: every stage returns
//! a `ValidationResult`. Only infrastructure failures (storage, database)
//! propagate as `Err`.

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::entity::auth_chain::is_valid_address;
use crate::entity::{hashing, EntityType};
use crate::permissions::PermissionType;
use crate::types::Result;

use super::{Deployment, DeploymentComponents};

/// Outcome of a validation stage (or of the whole pipeline)
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    errors: Vec<String>,
}

impl ValidationResult {
    /// A passing result
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self { errors }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Everything a validator may look at
pub struct ValidationContext<'a> {
    pub deployment: &'a Deployment,
    pub components: &'a DeploymentComponents,
    /// Server clock at request time, unix milliseconds. Injected so stages
    /// stay deterministic under test.
    pub now_ms: u64,
}

/// One pipeline stage
pub type Validator = for<'a> fn(&'a ValidationContext<'a>) -> BoxFuture<'a, Result<ValidationResult>>;

/// The standard stages in evaluation order
pub fn standard_validators() -> Vec<(&'static str, Validator)> {
    vec![
        ("entity-id", validate_entity_id),
        ("entity-structure", validate_entity_structure),
        ("auth-chain-structure", validate_auth_chain_structure),
        ("signer-address", validate_signer_address),
        ("signatures", validate_signatures),
        ("deployment-ttl", validate_deployment_ttl),
        ("files", validate_files),
        ("scene", validate_scene),
        ("size", validate_size),
        ("permission", validate_deployment_permission),
    ]
}

/// Run the full pipeline, stopping at the first failing stage.
pub async fn validate_deployment(ctx: &ValidationContext<'_>) -> Result<ValidationResult> {
    for (stage, validator) in standard_validators() {
        let result = validator(ctx).await?;
        if !result.ok() {
            debug!(stage, errors = ?result.errors(), "Deployment validation failed");
            return Ok(result);
        }
    }
    Ok(ValidationResult::valid())
}

// ============================================================================
// Stage 1: entity id integrity
// ============================================================================

fn validate_entity_id<'a>(ctx: &'a ValidationContext<'a>) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        let declared = &ctx.deployment.entity_id;
        let computed = &ctx.deployment.entity.id;

        if declared != computed {
            return Ok(ValidationResult::with_error(format!(
                "Entity id {} does not match the entity bytes (computed {})",
                declared, computed
            )));
        }
        Ok(ValidationResult::valid())
    })
}

// ============================================================================
// Stage 2: entity document structure
// ============================================================================

fn validate_entity_structure<'a>(
    ctx: &'a ValidationContext<'a>,
) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        Ok(ValidationResult::from_errors(
            ctx.deployment.entity.structural_errors(),
        ))
    })
}

// ============================================================================
// Stage 3: auth chain structure
// ============================================================================

fn validate_auth_chain_structure<'a>(
    ctx: &'a ValidationContext<'a>,
) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        match ctx.deployment.auth_chain.validate_structure() {
            Ok(()) => Ok(ValidationResult::valid()),
            Err(e) => Ok(ValidationResult::with_error(e.to_string())),
        }
    })
}

// ============================================================================
// Stage 4: signer address format
// ============================================================================

fn validate_signer_address<'a>(
    ctx: &'a ValidationContext<'a>,
) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        let signer = ctx.deployment.auth_chain.signer_address().unwrap_or("");
        if !is_valid_address(signer) {
            return Ok(ValidationResult::with_error(format!(
                "Malformed signer address: {}",
                signer
            )));
        }
        Ok(ValidationResult::valid())
    })
}

// ============================================================================
// Stage 5: signature chain
// ============================================================================

fn validate_signatures<'a>(
    ctx: &'a ValidationContext<'a>,
) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        let result = ctx.deployment.auth_chain.verify(
            &ctx.deployment.entity_id,
            ctx.now_ms / 1000,
            ctx.components.limits.auth_max_signature_age_secs,
        );

        match result {
            Ok(()) => Ok(ValidationResult::valid()),
            Err(e) => Ok(ValidationResult::with_error(e.to_string())),
        }
    })
}

// ============================================================================
// Stage 6: deployment TTL
// ============================================================================

fn validate_deployment_ttl<'a>(
    ctx: &'a ValidationContext<'a>,
) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        let age_ms = ctx
            .now_ms
            .saturating_sub(ctx.deployment.entity.document.timestamp);

        if age_ms > ctx.components.limits.deployment_ttl_ms {
            return Ok(ValidationResult::with_error(format!(
                "The deployment is not recent enough: entity timestamp is {} ms old, maximum is {} ms",
                age_ms, ctx.components.limits.deployment_ttl_ms
            )));
        }
        Ok(ValidationResult::valid())
    })
}

// ============================================================================
// Stage 7: file set consistency
// ============================================================================

fn validate_files<'a>(ctx: &'a ValidationContext<'a>) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        let deployment = ctx.deployment;
        let referenced = deployment.entity.content_hashes();
        let mut errors = Vec::new();

        // No unreferenced uploads (the entity's own bytes are legitimate)
        for hash in deployment.files.keys() {
            if !referenced.contains(hash) && hash != &deployment.entity_id {
                errors.push(format!("Extra uploaded file detected: {}", hash));
            }
        }

        // Every reference reachable: uploaded now or already durable
        for hash in &referenced {
            if !deployment.is_hash_available(hash) {
                errors.push(format!(
                    "The file {} is neither present in storage nor uploaded with this deployment",
                    hash
                ));
            }
        }

        // Every upload re-hashes to its declared key
        for (hash, bytes) in &deployment.files {
            let computed = hashing::compute_content_hash(bytes);
            if &computed != hash {
                errors.push(format!(
                    "The uploaded file {} doesn't match the provided content",
                    hash
                ));
            }
        }

        Ok(ValidationResult::from_errors(errors))
    })
}

// ============================================================================
// Stage 8: scene-specific checks
// ============================================================================

fn validate_scene<'a>(ctx: &'a ValidationContext<'a>) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        let entity = &ctx.deployment.entity;
        if entity.document.kind != EntityType::Scene {
            return Ok(ValidationResult::valid());
        }

        let mut errors = Vec::new();
        let limits = &ctx.components.limits;

        let parcel_count = entity.document.pointers.len();
        if parcel_count > limits.max_parcels {
            errors.push(format!(
                "Scene spans {} parcels, maximum is {}",
                parcel_count, limits.max_parcels
            ));
        }

        if entity.world_name().is_none() {
            errors.push("Scene has no worldName in its metadata".to_string());
        }

        match entity.thumbnail() {
            None => errors.push("Scene has no thumbnail".to_string()),
            Some(file) => {
                if entity.hash_for_file(&file).is_none() {
                    errors.push(format!(
                        "Thumbnail file '{}' is not part of the scene content",
                        file
                    ));
                }
            }
        }

        for file in entity.minimap_files() {
            if entity.hash_for_file(&file).is_none() {
                errors.push(format!(
                    "Minimap file '{}' is not part of the scene content",
                    file
                ));
            }
        }

        for file in entity.skybox_files() {
            if entity.hash_for_file(&file).is_none() {
                errors.push(format!(
                    "Skybox texture '{}' is not part of the scene content",
                    file
                ));
            }
        }

        Ok(ValidationResult::from_errors(errors))
    })
}

// ============================================================================
// Stage 9: size quota (expensive: may stat stored blobs)
// ============================================================================

fn validate_size<'a>(ctx: &'a ValidationContext<'a>) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        let deployment = ctx.deployment;
        let limits = &ctx.components.limits;

        // Each unique hash counts once, deduplicated across the scene
        let mut total_bytes: u64 = 0;
        for hash in deployment.entity.content_hashes() {
            if let Some(bytes) = deployment.files.get(&hash) {
                total_bytes += bytes.len() as u64;
            } else if let Some(size) = ctx.components.storage.size_of(&hash).await? {
                total_bytes += size;
            }
            // Unreachable hashes were already rejected by the files stage
        }

        let parcel_count = deployment.entity.document.pointers.len().max(1) as u64;
        let max_total = limits.max_size_per_parcel_bytes.saturating_mul(parcel_count);

        if total_bytes > max_total {
            return Ok(ValidationResult::with_error(format!(
                "The deployment is too big. The maximum allowed size per parcel is {} bytes. \
                 The deployment references {} bytes over {} parcels ({} bytes per parcel)",
                limits.max_size_per_parcel_bytes,
                total_bytes,
                parcel_count,
                total_bytes / parcel_count
            )));
        }

        Ok(ValidationResult::valid())
    })
}

// ============================================================================
// Stage 10: deployment permission (expensive: DB + name registry)
// ============================================================================

fn validate_deployment_permission<'a>(
    ctx: &'a ValidationContext<'a>,
) -> BoxFuture<'a, Result<ValidationResult>> {
    Box::pin(async move {
        let entity = &ctx.deployment.entity;
        if entity.document.kind != EntityType::Scene {
            return Ok(ValidationResult::valid());
        }

        // Present after the scene stage
        let Some(world) = entity.world_name() else {
            return Ok(ValidationResult::with_error(
                "Scene has no worldName in its metadata".to_string(),
            ));
        };

        let signer = ctx
            .deployment
            .auth_chain
            .signer_address()
            .unwrap_or("")
            .to_lowercase();

        // The name owner may always deploy into their own world
        let owner = ctx.components.names.owner_of(&world).await?;
        if owner.as_deref() == Some(signer.as_str()) {
            return Ok(ValidationResult::valid());
        }

        let allowed = ctx
            .components
            .permissions
            .check_access(
                &world,
                PermissionType::Deployment,
                &signer,
                &entity.document.pointers,
                None,
            )
            .await?;

        if !allowed {
            return Ok(ValidationResult::with_error(format!(
                "Address {} does not have permission to deploy to world {}",
                signer, world
            )));
        }

        Ok(ValidationResult::valid())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use serde_json::Value as JsonValue;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::db::worlds::InMemoryWorldsRepository;
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
        components: DeploymentComponents,
        storage: Arc<InMemoryContentStorage>,
        names: Arc<StaticNameOwnership>,
        permissions: Arc<PermissionsEngine>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryContentStorage::new());
        let worlds = Arc::new(InMemoryWorldsRepository::new());
        let names = Arc::new(StaticNameOwnership::new());
        let permissions = Arc::new(PermissionsEngine::new(
            Arc::new(InMemoryPermissionsRepository::new()),
            worlds.clone(),
            Arc::new(StaticNftOwnership::new()),
            Arc::new(RecordingNotificationSender::new()),
        ));

        let components = DeploymentComponents {
            storage: storage.clone(),
            worlds,
            permissions: permissions.clone(),
            names: names.clone(),
            notifier: Arc::new(RecordingNotificationSender::new()),
            limits: DeploymentLimits {
                max_parcels: 4,
                max_size_per_parcel_bytes: 15 * 1024 * 1024,
                deployment_ttl_ms: 300_000,
                auth_max_signature_age_secs: 600,
            },
        };

        Fixture {
            components,
            storage,
            names,
            permissions,
        }
    }

    fn scene_bytes(pointers: &[&str], content: &[(&str, &str)], metadata: JsonValue) -> Bytes {
        let content: Vec<JsonValue> = content
            .iter()
            .map(|(file, hash)| serde_json::json!({ "file": file, "hash": hash }))
            .collect();

        Bytes::from(
            serde_json::to_vec(&serde_json::json!({
                "type": "scene",
                "pointers": pointers,
                "timestamp": TIMESTAMP_MS,
                "content": content,
                "metadata": metadata,
            }))
            .unwrap(),
        )
    }

    fn default_metadata() -> JsonValue {
        serde_json::json!({
            "worldName": WORLD,
            "title": "Test World",
            "thumbnail": "thumb.png",
        })
    }

    /// A deployment whose signer owns the world name.
    async fn owned_deployment(fixture: &Fixture) -> Deployment {
        let key = SigningKey::generate(&mut OsRng);
        deployment_signed_by(fixture, &key, true).await
    }

    async fn deployment_signed_by(
        fixture: &Fixture,
        key: &SigningKey,
        signer_owns_name: bool,
    ) -> Deployment {
        let thumb = Bytes::from_static(b"png bytes");
        let thumb_hash = hashing::compute_content_hash(&thumb);

        let raw = scene_bytes(&["0,0"], &[("thumb.png", &thumb_hash)], default_metadata());
        let entity_id = hashing::compute_content_hash(&raw);
        let auth_chain = AuthChain::single_signer(key, &entity_id);

        if signer_owns_name {
            fixture
                .names
                .set_owner(WORLD, &address_of(&key.verifying_key()));
        }

        let mut files = HashMap::new();
        files.insert(thumb_hash, thumb);

        Deployment::assemble(entity_id, raw, auth_chain, files, fixture.storage.as_ref())
            .await
            .unwrap()
    }

    async fn run(fixture: &Fixture, deployment: &Deployment) -> ValidationResult {
        let ctx = ValidationContext {
            deployment,
            components: &fixture.components,
            now_ms: NOW_MS,
        };
        validate_deployment(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_valid_deployment_passes() {
        let f = fixture();
        let deployment = owned_deployment(&f).await;

        let result = run(&f, &deployment).await;
        assert!(result.ok(), "unexpected errors: {:?}", result.errors());
    }

    #[tokio::test]
    async fn test_wrong_entity_id_fails_first() {
        let f = fixture();
        let mut deployment = owned_deployment(&f).await;
        deployment.entity_id = "bafkreibogus".to_string();

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        assert!(result.errors()[0].contains("does not match the entity bytes"));
    }

    #[tokio::test]
    async fn test_structural_errors_reported() {
        let f = fixture();
        let key = SigningKey::generate(&mut OsRng);

        let raw = Bytes::from(
            serde_json::to_vec(&serde_json::json!({
                "type": "scene",
                "pointers": [],
                "timestamp": TIMESTAMP_MS,
            }))
            .unwrap(),
        );
        let entity_id = hashing::compute_content_hash(&raw);
        let auth_chain = AuthChain::single_signer(&key, &entity_id);

        let deployment =
            Deployment::assemble(entity_id, raw, auth_chain, HashMap::new(), f.storage.as_ref())
                .await
                .unwrap();

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        assert!(result
            .errors()
            .iter()
            .any(|e| e.contains("one or more parcels")));
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected() {
        let f = fixture();
        let mut deployment = owned_deployment(&f).await;
        deployment.auth_chain.0[1].signature = hex::encode([7u8; 64]);

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        assert!(result.errors()[0].contains("verification failed"));
    }

    #[tokio::test]
    async fn test_stale_deployment_rejected() {
        let f = fixture();
        let deployment = owned_deployment(&f).await;

        let ctx = ValidationContext {
            deployment: &deployment,
            components: &f.components,
            now_ms: TIMESTAMP_MS + 301_000,
        };
        let result = validate_deployment(&ctx).await.unwrap();
        assert!(!result.ok());
        assert!(result.errors()[0].contains("not recent enough"));
    }

    #[tokio::test]
    async fn test_missing_referenced_file_rejected() {
        let f = fixture();
        let key = SigningKey::generate(&mut OsRng);

        let ghost_hash = hashing::compute_content_hash(b"never uploaded");
        let raw = scene_bytes(
            &["0,0"],
            &[("thumb.png", &ghost_hash)],
            default_metadata(),
        );
        let entity_id = hashing::compute_content_hash(&raw);
        let auth_chain = AuthChain::single_signer(&key, &entity_id);
        f.names.set_owner(WORLD, &address_of(&key.verifying_key()));

        let deployment =
            Deployment::assemble(entity_id, raw, auth_chain, HashMap::new(), f.storage.as_ref())
                .await
                .unwrap();

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        assert!(result.errors()[0].contains("neither present in storage"));
    }

    #[tokio::test]
    async fn test_referenced_file_already_in_storage_passes() {
        let f = fixture();
        let key = SigningKey::generate(&mut OsRng);

        let thumb = Bytes::from_static(b"stored png");
        let thumb_hash = hashing::compute_content_hash(&thumb);
        f.storage.store(&thumb_hash, thumb).await.unwrap();

        let raw = scene_bytes(&["0,0"], &[("thumb.png", &thumb_hash)], default_metadata());
        let entity_id = hashing::compute_content_hash(&raw);
        let auth_chain = AuthChain::single_signer(&key, &entity_id);
        f.names.set_owner(WORLD, &address_of(&key.verifying_key()));

        // Nothing uploaded: the only referenced file is already durable
        let deployment =
            Deployment::assemble(entity_id, raw, auth_chain, HashMap::new(), f.storage.as_ref())
                .await
                .unwrap();

        let result = run(&f, &deployment).await;
        assert!(result.ok(), "unexpected errors: {:?}", result.errors());
    }

    #[tokio::test]
    async fn test_uploaded_hash_mismatch_rejected() {
        let f = fixture();
        let mut deployment = owned_deployment(&f).await;

        // Corrupt the uploaded bytes behind their declared hash
        let declared = deployment.files.keys().next().unwrap().clone();
        deployment
            .files
            .insert(declared, Bytes::from_static(b"corrupted bytes"));

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        assert!(result.errors()[0].contains("doesn't match the provided content"));
    }

    #[tokio::test]
    async fn test_extra_uploaded_file_rejected() {
        let f = fixture();
        let mut deployment = owned_deployment(&f).await;

        let extra = Bytes::from_static(b"stowaway");
        deployment
            .files
            .insert(hashing::compute_content_hash(&extra), extra);

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        assert!(result.errors()[0].contains("Extra uploaded file"));
    }

    #[tokio::test]
    async fn test_parcel_quota_enforced() {
        let f = fixture();
        let key = SigningKey::generate(&mut OsRng);

        let thumb = Bytes::from_static(b"png bytes");
        let thumb_hash = hashing::compute_content_hash(&thumb);
        let raw = scene_bytes(
            &["0,0", "1,0", "0,1", "1,1", "2,0"],
            &[("thumb.png", &thumb_hash)],
            default_metadata(),
        );
        let entity_id = hashing::compute_content_hash(&raw);
        let auth_chain = AuthChain::single_signer(&key, &entity_id);
        f.names.set_owner(WORLD, &address_of(&key.verifying_key()));

        let mut files = HashMap::new();
        files.insert(thumb_hash, thumb);
        let deployment = Deployment::assemble(entity_id, raw, auth_chain, files, f.storage.as_ref())
            .await
            .unwrap();

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        assert!(result.errors()[0].contains("maximum is 4"));
    }

    #[tokio::test]
    async fn test_missing_thumbnail_rejected() {
        let f = fixture();
        let key = SigningKey::generate(&mut OsRng);

        let raw = scene_bytes(&["0,0"], &[], serde_json::json!({ "worldName": WORLD }));
        let entity_id = hashing::compute_content_hash(&raw);
        let auth_chain = AuthChain::single_signer(&key, &entity_id);
        f.names.set_owner(WORLD, &address_of(&key.verifying_key()));

        let deployment =
            Deployment::assemble(entity_id, raw, auth_chain, HashMap::new(), f.storage.as_ref())
                .await
                .unwrap();

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        assert!(result.errors()[0].contains("no thumbnail"));
    }

    #[tokio::test]
    async fn test_size_quota_reports_totals() {
        let f = fixture();
        let key = SigningKey::generate(&mut OsRng);

        // One parcel, 15 MB limit, 16 MB asset
        let big = Bytes::from(vec![0u8; 16 * 1024 * 1024]);
        let big_hash = hashing::compute_content_hash(&big);
        let thumb = Bytes::from_static(b"png bytes");
        let thumb_hash = hashing::compute_content_hash(&thumb);

        let raw = scene_bytes(
            &["0,0"],
            &[("thumb.png", &thumb_hash), ("model.glb", &big_hash)],
            default_metadata(),
        );
        let entity_id = hashing::compute_content_hash(&raw);
        let auth_chain = AuthChain::single_signer(&key, &entity_id);
        f.names.set_owner(WORLD, &address_of(&key.verifying_key()));

        let mut files = HashMap::new();
        files.insert(thumb_hash, thumb);
        files.insert(big_hash, big);
        let deployment = Deployment::assemble(entity_id, raw, auth_chain, files, f.storage.as_ref())
            .await
            .unwrap();

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        let error = &result.errors()[0];
        assert!(error.contains("too big"));
        assert!(error.contains(&(15 * 1024 * 1024).to_string()));
        assert!(error.contains(&(16 * 1024 * 1024 + 9).to_string()));
    }

    #[tokio::test]
    async fn test_permission_denied_for_stranger() {
        let f = fixture();
        let owner = SigningKey::generate(&mut OsRng);
        let stranger = SigningKey::generate(&mut OsRng);

        // The world is owned by someone else and the signer has no grant
        f.names.set_owner(WORLD, &address_of(&owner.verifying_key()));
        let deployment = deployment_signed_by(&f, &stranger, false).await;

        let result = run(&f, &deployment).await;
        assert!(!result.ok());
        assert!(result.errors()[0].contains("does not have permission to deploy"));
    }

    #[tokio::test]
    async fn test_acl_grant_allows_non_owner() {
        let f = fixture();
        let owner = SigningKey::generate(&mut OsRng);
        let builder = SigningKey::generate(&mut OsRng);

        f.names.set_owner(WORLD, &address_of(&owner.verifying_key()));
        f.permissions
            .add_parcels_to_permission(
                WORLD,
                PermissionType::Deployment,
                &address_of(&builder.verifying_key()),
                vec!["0,0".into()],
            )
            .await
            .unwrap();

        let deployment = deployment_signed_by(&f, &builder, false).await;
        let result = run(&f, &deployment).await;
        assert!(result.ok(), "unexpected errors: {:?}", result.errors());
    }

    #[tokio::test]
    async fn test_parcel_scoped_grant_denies_other_parcels() {
        let f = fixture();
        let owner = SigningKey::generate(&mut OsRng);
        let builder = SigningKey::generate(&mut OsRng);

        f.names.set_owner(WORLD, &address_of(&owner.verifying_key()));
        f.permissions
            .add_parcels_to_permission(
                WORLD,
                PermissionType::Deployment,
                &address_of(&builder.verifying_key()),
                vec!["5,5".into()],
            )
            .await
            .unwrap();

        // Scene targets 0,0 but the grant only covers 5,5
        let deployment = deployment_signed_by(&f, &builder, false).await;
        let result = run(&f, &deployment).await;
        assert!(!result.ok());
    }
}
