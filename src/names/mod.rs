//! Name and NFT ownership collaborators
//!
//! Ownership truth lives outside this service: world names resolve through
//! an external name registry, NFT holdings through an ownership endpoint.
//! Both are modeled as injected trait objects with HTTP implementations; the
//! name lookup gets a TTL-cache decorator because it sits on the deployment
//! hot path.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::TtlCache;
use crate::types::{FirmamentError, Result};

/// Resolves which address owns a world name
#[async_trait]
pub trait NameOwnership: Send + Sync {
    /// Owner address of a world name, or None when unregistered.
    async fn owner_of(&self, world_name: &str) -> Result<Option<String>>;
}

/// Checks whether an address holds a given NFT
#[async_trait]
pub trait NftOwnership: Send + Sync {
    async fn owns(&self, address: &str, nft: &str) -> Result<bool>;
}

// ============================================================================
// HTTP name registry
// ============================================================================

#[derive(Debug, Deserialize)]
struct OwnerResponse {
    owner: Option<String>,
}

/// Name registry client (`GET {base}/names/{name}/owner`)
pub struct HttpNameRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNameRegistry {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("elohim-firmament/1.0")
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl NameOwnership for HttpNameRegistry {
    async fn owner_of(&self, world_name: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/names/{}/owner",
            self.base_url.trim_end_matches('/'),
            world_name.to_lowercase()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FirmamentError::Internal(format!("Name registry request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(FirmamentError::Internal(format!(
                "Name registry returned {}",
                response.status()
            )));
        }

        let body: OwnerResponse = response
            .json()
            .await
            .map_err(|e| FirmamentError::Internal(format!("Name registry response: {}", e)))?;

        Ok(body.owner.map(|o| o.to_lowercase()))
    }
}

// ============================================================================
// Caching decorator
// ============================================================================

/// TTL-cached name ownership lookups with explicit invalidation
pub struct CachedNameOwnership {
    inner: Arc<dyn NameOwnership>,
    cache: TtlCache<String, Option<String>>,
}

impl CachedNameOwnership {
    pub fn new(inner: Arc<dyn NameOwnership>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }

    /// Drop the cached owner for one name (e.g. after an ownership change).
    pub fn invalidate(&self, world_name: &str) {
        self.cache.invalidate(&world_name.to_lowercase());
    }
}

#[async_trait]
impl NameOwnership for CachedNameOwnership {
    async fn owner_of(&self, world_name: &str) -> Result<Option<String>> {
        let key = world_name.to_lowercase();

        if let Some(owner) = self.cache.get(&key) {
            debug!(world = %key, "Name ownership resolved from cache");
            return Ok(owner);
        }

        let owner = self.inner.owner_of(&key).await?;
        self.cache.insert(key, owner.clone());
        Ok(owner)
    }
}

// ============================================================================
// HTTP NFT registry
// ============================================================================

#[derive(Debug, Deserialize)]
struct OwnsResponse {
    owns: bool,
}

/// NFT ownership client (`GET {base}/ownership?address=..&nft=..`)
pub struct HttpNftRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNftRegistry {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("elohim-firmament/1.0")
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl NftOwnership for HttpNftRegistry {
    async fn owns(&self, address: &str, nft: &str) -> Result<bool> {
        let url = format!("{}/ownership", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("address", &address.to_lowercase()), ("nft", &nft.to_string())])
            .send()
            .await
            .map_err(|e| FirmamentError::Internal(format!("NFT registry request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FirmamentError::Internal(format!(
                "NFT registry returned {}",
                response.status()
            )));
        }

        let body: OwnsResponse = response
            .json()
            .await
            .map_err(|e| FirmamentError::Internal(format!("NFT registry response: {}", e)))?;

        Ok(body.owns)
    }
}

// ============================================================================
// Static implementations (dev mode, tests)
// ============================================================================

/// Fixed name→owner table
#[derive(Default)]
pub struct StaticNameOwnership {
    owners: dashmap::DashMap<String, String>,
}

impl StaticNameOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_owner(&self, world_name: &str, owner: &str) {
        self.owners
            .insert(world_name.to_lowercase(), owner.to_lowercase());
    }
}

#[async_trait]
impl NameOwnership for StaticNameOwnership {
    async fn owner_of(&self, world_name: &str) -> Result<Option<String>> {
        Ok(self
            .owners
            .get(&world_name.to_lowercase())
            .map(|o| o.clone()))
    }
}

/// Fixed (address, nft) holdings
#[derive(Default)]
pub struct StaticNftOwnership {
    holdings: dashmap::DashMap<(String, String), ()>,
}

impl StaticNftOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_holding(&self, address: &str, nft: &str) {
        self.holdings
            .insert((address.to_lowercase(), nft.to_string()), ());
    }
}

#[async_trait]
impl NftOwnership for StaticNftOwnership {
    async fn owns(&self, address: &str, nft: &str) -> Result<bool> {
        Ok(self
            .holdings
            .contains_key(&(address.to_lowercase(), nft.to_string())))
    }
}
