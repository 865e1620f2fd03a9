//! Permission engine
//!
//! Evaluates and mutates access-control records for worlds. All keys
//! (world names, addresses) are lowercased at this boundary; repositories
//! only ever see normalized keys.
//!
//! Mutations that change an address's access emit outbound notification
//! events in a single batch per operation. Delivery is best-effort: a failed
//! batch is logged and never turns into the mutation's error.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::schemas::WorldPermissionDoc;
use crate::db::worlds::WorldsRepository;
use crate::names::NftOwnership;
use crate::notifications::{NotificationEvent, NotificationSender};
use crate::permissions::repo::PermissionsRepository;
use crate::permissions::{verify_shared_secret, PermissionSetting, PermissionType, WorldPermissions};
use crate::types::{FirmamentError, Result};

/// Scope of one grant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrantScope {
    WorldWide,
    Parcels(Vec<String>),
}

impl From<&WorldPermissionDoc> for GrantScope {
    fn from(record: &WorldPermissionDoc) -> Self {
        match &record.parcels {
            None => GrantScope::WorldWide,
            Some(parcels) => GrantScope::Parcels(parcels.clone()),
        }
    }
}

/// Outcome of `add_parcels_to_permission`: whether a new record was created
/// (the caller decides whether creation warrants a notification).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParcelGrantOutcome {
    pub created: bool,
}

/// One address's grant in a summary listing
#[derive(Debug, Clone, Serialize)]
pub struct GrantSummary {
    pub address: String,
    pub scope: GrantScope,
}

/// Setting plus grants for one permission type
#[derive(Debug, Clone, Serialize)]
pub struct TypeSummary {
    pub setting: PermissionSetting,
    pub grants: Vec<GrantSummary>,
}

/// Full permission state of a world
#[derive(Debug, Clone, Serialize)]
pub struct PermissionsSummary {
    pub world: String,
    pub deployment: TypeSummary,
    pub streaming: TypeSummary,
}

/// Evaluates and mutates world access control
pub struct PermissionsEngine {
    repo: Arc<dyn PermissionsRepository>,
    worlds: Arc<dyn WorldsRepository>,
    nft: Arc<dyn NftOwnership>,
    notifier: Arc<dyn NotificationSender>,
}

impl PermissionsEngine {
    pub fn new(
        repo: Arc<dyn PermissionsRepository>,
        worlds: Arc<dyn WorldsRepository>,
        nft: Arc<dyn NftOwnership>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            repo,
            worlds,
            nft,
            notifier,
        }
    }

    /// Best-effort notification dispatch; failures are contained here.
    async fn notify(&self, events: Vec<NotificationEvent>) {
        if events.is_empty() {
            return;
        }
        if let Err(e) = self.notifier.send_batch(events).await {
            warn!(error = %e, "Permission notification batch dropped");
        }
    }

    // --- reads -------------------------------------------------------------

    /// Whether the address holds a world-wide grant.
    pub async fn has_world_wide_permission(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<bool> {
        let record = self
            .repo
            .get_record(&world.to_lowercase(), permission_type, &address.to_lowercase())
            .await?;

        Ok(matches!(record, Some(ref r) if r.parcels.is_none()))
    }

    /// Parcel-subset rule: granted iff a record exists and it is world-wide
    /// or its parcel set contains every requested parcel.
    pub async fn has_permission_for_parcels(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
        parcels: &[String],
    ) -> Result<bool> {
        let record = self
            .repo
            .get_record(&world.to_lowercase(), permission_type, &address.to_lowercase())
            .await?;

        Ok(record.map(|r| r.covers(parcels)).unwrap_or(false))
    }

    /// Parcels of the address's grant: None when no record exists.
    pub async fn get_allowed_parcels_for_permission(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<Option<GrantScope>> {
        let record = self
            .repo
            .get_record(&world.to_lowercase(), permission_type, &address.to_lowercase())
            .await?;

        Ok(record.as_ref().map(GrantScope::from))
    }

    /// Settings and grant listings for both permission types.
    pub async fn get_permissions_summary(&self, world: &str) -> Result<PermissionsSummary> {
        let world = world.to_lowercase();
        let settings = self
            .worlds
            .get_world(&world)
            .await?
            .map(|w| w.permissions)
            .unwrap_or_default();

        let deployment = self
            .type_summary(&world, PermissionType::Deployment, &settings)
            .await?;
        let streaming = self
            .type_summary(&world, PermissionType::Streaming, &settings)
            .await?;

        Ok(PermissionsSummary {
            world,
            deployment,
            streaming,
        })
    }

    async fn type_summary(
        &self,
        world: &str,
        permission_type: PermissionType,
        settings: &WorldPermissions,
    ) -> Result<TypeSummary> {
        let grants = self
            .repo
            .records_for(world, permission_type)
            .await?
            .iter()
            .map(|record| GrantSummary {
                address: record.address.clone(),
                scope: GrantScope::from(record),
            })
            .collect();

        Ok(TypeSummary {
            setting: settings.setting_for(permission_type).clone(),
            grants,
        })
    }

    /// Effective access decision for an address over a parcel set, honoring
    /// the world's configured setting kind for that permission type.
    pub async fn check_access(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
        parcels: &[String],
        shared_secret: Option<&str>,
    ) -> Result<bool> {
        let world = world.to_lowercase();
        let settings = self
            .worlds
            .get_world(&world)
            .await?
            .map(|w| w.permissions)
            .unwrap_or_else(WorldPermissions::default);

        match settings.setting_for(permission_type) {
            PermissionSetting::Unrestricted => Ok(true),
            PermissionSetting::AllowList => {
                self.has_permission_for_parcels(&world, permission_type, address, parcels)
                    .await
            }
            PermissionSetting::NftOwnership { nft } => {
                self.nft.owns(&address.to_lowercase(), nft).await
            }
            PermissionSetting::SharedSecret { secret_hash } => match shared_secret {
                Some(secret) => verify_shared_secret(secret, secret_hash),
                None => Ok(false),
            },
        }
    }

    // --- mutations ---------------------------------------------------------

    /// Grant a world-wide permission. Idempotent: re-granting an address
    /// that already holds world-wide access is a no-op with no notification.
    /// Supersedes any narrower parcel grant for the same triple.
    pub async fn grant_world_wide_permission(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<()> {
        let world = world.to_lowercase();
        let address = address.to_lowercase();

        let existing = self.repo.get_record(&world, permission_type, &address).await?;
        if matches!(existing, Some(ref r) if r.parcels.is_none()) {
            debug!(world = %world, address = %address, %permission_type, "World-wide grant already present");
            return Ok(());
        }

        self.repo
            .upsert_record(WorldPermissionDoc::world_wide(&world, permission_type, &address))
            .await?;

        info!(world = %world, address = %address, %permission_type, "Granted world-wide permission");

        self.notify(vec![NotificationEvent::PermissionGranted {
            world,
            permission_type,
            address,
        }])
        .await;

        Ok(())
    }

    /// Revoke an address's grant entirely. The grant must exist.
    pub async fn revoke_permission(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
    ) -> Result<()> {
        let world = world.to_lowercase();
        let address = address.to_lowercase();

        let existed = self.repo.delete_record(&world, permission_type, &address).await?;
        if !existed {
            return Err(FirmamentError::Conflict(format!(
                "No {} permission to revoke for {} on {}",
                permission_type, address, world
            )));
        }

        info!(world = %world, address = %address, %permission_type, "Revoked permission");

        self.notify(vec![NotificationEvent::PermissionRevoked {
            world,
            permission_type,
            address,
        }])
        .await;

        Ok(())
    }

    /// Replace the deployment allow-list with exactly `addresses`.
    pub async fn set_deployment_permission(
        &self,
        world: &str,
        addresses: Vec<String>,
    ) -> Result<()> {
        let world = world.to_lowercase();

        self.worlds
            .set_permission_setting(&world, PermissionType::Deployment, PermissionSetting::AllowList)
            .await?;

        self.sync_address_set(&world, PermissionType::Deployment, addresses)
            .await
    }

    /// Configure streaming as unrestricted or replace its allow-list.
    /// Other setting kinds are rejected.
    pub async fn set_streaming_permission(
        &self,
        world: &str,
        setting: PermissionSetting,
        addresses: Vec<String>,
    ) -> Result<()> {
        let world = world.to_lowercase();

        match &setting {
            PermissionSetting::Unrestricted => {
                if !addresses.is_empty() {
                    return Err(FirmamentError::StructuralValidation(
                        "Unrestricted streaming takes no address list".to_string(),
                    ));
                }
            }
            PermissionSetting::AllowList => {}
            other => {
                return Err(FirmamentError::StructuralValidation(format!(
                    "Streaming permission must be unrestricted or allow-list, got {}",
                    other.kind()
                )));
            }
        }

        self.worlds
            .set_permission_setting(&world, PermissionType::Streaming, setting)
            .await?;

        self.sync_address_set(&world, PermissionType::Streaming, addresses)
            .await
    }

    /// Reconcile the stored world-wide grants with `desired`: revoke the
    /// removed addresses, grant the added ones. Two idempotent batches, so
    /// there is never a window where the whole set is revoked.
    async fn sync_address_set(
        &self,
        world: &str,
        permission_type: PermissionType,
        desired: Vec<String>,
    ) -> Result<()> {
        let desired: BTreeSet<String> = desired.into_iter().map(|a| a.to_lowercase()).collect();

        let current: BTreeSet<String> = self
            .repo
            .records_for(world, permission_type)
            .await?
            .into_iter()
            .map(|record| record.address)
            .collect();

        let mut events = Vec::new();

        for address in current.difference(&desired) {
            if self.repo.delete_record(world, permission_type, address).await? {
                events.push(NotificationEvent::PermissionRevoked {
                    world: world.to_string(),
                    permission_type,
                    address: address.clone(),
                });
            }
        }

        for address in desired.difference(&current) {
            self.repo
                .upsert_record(WorldPermissionDoc::world_wide(world, permission_type, address))
                .await?;
            events.push(NotificationEvent::PermissionGranted {
                world: world.to_string(),
                permission_type,
                address: address.clone(),
            });
        }

        info!(
            world = %world,
            %permission_type,
            granted = events.iter().filter(|e| matches!(e, NotificationEvent::PermissionGranted { .. })).count(),
            revoked = events.iter().filter(|e| matches!(e, NotificationEvent::PermissionRevoked { .. })).count(),
            "Replaced permission address set"
        );

        self.notify(events).await;

        Ok(())
    }

    /// Union parcels into an address's grant, creating the record when
    /// absent. A world-wide grant already covers everything and is left
    /// untouched. Notification is the caller's call, driven by `created`.
    pub async fn add_parcels_to_permission(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
        parcels: Vec<String>,
    ) -> Result<ParcelGrantOutcome> {
        let world = world.to_lowercase();
        let address = address.to_lowercase();

        let existing = self.repo.get_record(&world, permission_type, &address).await?;

        match existing {
            None => {
                let parcels: Vec<String> = dedup_parcels(parcels);
                self.repo
                    .upsert_record(WorldPermissionDoc::for_parcels(
                        &world,
                        permission_type,
                        &address,
                        parcels,
                    ))
                    .await?;
                Ok(ParcelGrantOutcome { created: true })
            }
            Some(record) if record.parcels.is_none() => {
                debug!(world = %world, address = %address, "World-wide grant already covers parcels");
                Ok(ParcelGrantOutcome { created: false })
            }
            Some(mut record) => {
                let granted = record.parcels.get_or_insert_with(Vec::new);
                for parcel in parcels {
                    if !granted.contains(&parcel) {
                        granted.push(parcel);
                    }
                }
                self.repo.upsert_record(record).await?;
                Ok(ParcelGrantOutcome { created: false })
            }
        }
    }

    /// Remove parcels from an existing parcel-scoped grant. Removing the
    /// final parcel leaves an empty grant; deleting the record is a separate
    /// `revoke_permission` call.
    pub async fn remove_parcels_from_permission(
        &self,
        world: &str,
        permission_type: PermissionType,
        address: &str,
        parcels: &[String],
    ) -> Result<()> {
        let world = world.to_lowercase();
        let address = address.to_lowercase();

        let record = self
            .repo
            .get_record(&world, permission_type, &address)
            .await?
            .ok_or_else(|| {
                FirmamentError::NotFound(format!(
                    "No {} permission for {} on {}",
                    permission_type, address, world
                ))
            })?;

        let Some(granted) = record.parcels.clone() else {
            return Err(FirmamentError::Conflict(
                "A world-wide grant has no parcels to remove".to_string(),
            ));
        };

        let remaining: Vec<String> = granted
            .into_iter()
            .filter(|p| !parcels.contains(p))
            .collect();

        let mut updated = record;
        updated.parcels = Some(remaining);
        self.repo.upsert_record(updated).await
    }
}

fn dedup_parcels(parcels: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    parcels
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
