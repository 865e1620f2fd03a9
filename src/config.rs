//! Configuration for Firmament
//!
//! CLI arguments and environment variable handling using clap.
//! Pattern adapted from holo-host/rust/holo-gateway/src/lib.rs

use clap::Parser;
use std::path::PathBuf;
use uuid::Uuid;

/// Firmament - world deployment gateway for Elohim
///
/// "And God called the firmament Heaven" - Genesis 1:8
#[derive(Parser, Debug, Clone)]
#[command(name = "firmament")]
#[command(about = "Content-addressed world scene storage with signed deployments")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Enable development mode (in-memory repositories, relaxed checks)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "firmament")]
    pub mongodb_db: String,

    /// Root directory for the filesystem content store
    #[arg(long, env = "STORAGE_ROOT", default_value = "/var/lib/firmament/contents")]
    pub storage_root: PathBuf,

    /// Maximum parcels a single world scene may occupy
    #[arg(long, env = "MAX_PARCELS", default_value = "4")]
    pub max_parcels: usize,

    /// Maximum deployed bytes per parcel
    #[arg(long, env = "MAX_SIZE_PER_PARCEL_BYTES", default_value = "26214400")]
    pub max_size_per_parcel_bytes: u64,

    /// Maximum age of a deployment request in seconds
    /// (entity timestamp vs server clock)
    #[arg(long, env = "DEPLOYMENT_TTL_SECONDS", default_value = "300")]
    pub deployment_ttl_seconds: u64,

    /// Maximum age of a delegation signature in seconds (0 disables the check)
    #[arg(long, env = "AUTH_MAX_SIGNATURE_AGE_SECONDS", default_value = "600")]
    pub auth_max_signature_age_seconds: u64,

    /// Stale incremental deployments are pruned after this many seconds
    #[arg(long, env = "ONGOING_DEPLOYMENT_TTL_SECONDS", default_value = "3600")]
    pub ongoing_deployment_ttl_seconds: u64,

    /// Directory for incremental-deployment temp files
    #[arg(long, env = "TEMP_ROOT", default_value = "/var/lib/firmament/pending")]
    pub temp_root: PathBuf,

    /// Failed attempts allowed per (world, subject) inside the rate window
    #[arg(long, env = "RATE_LIMIT_MAX_ATTEMPTS", default_value = "3")]
    pub rate_limit_max_attempts: usize,

    /// Sliding rate-limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECONDS", default_value = "60")]
    pub rate_limit_window_seconds: u64,

    /// Garbage-collector delete batch size
    #[arg(long, env = "GC_BATCH_SIZE", default_value = "500")]
    pub gc_batch_size: usize,

    /// Name registry endpoint for world-name ownership lookups
    /// (e.g., "https://names.elohim.host")
    #[arg(long, env = "NAME_REGISTRY_URL")]
    pub name_registry_url: Option<String>,

    /// NFT ownership endpoint for NFT-gated permission checks
    #[arg(long, env = "NFT_REGISTRY_URL")]
    pub nft_registry_url: Option<String>,

    /// Notification service endpoint for deployment/permission events
    #[arg(long, env = "NOTIFICATION_URL")]
    pub notification_url: Option<String>,

    /// TTL for cached name-ownership lookups in seconds
    #[arg(long, env = "NAME_CACHE_TTL_SECONDS", default_value = "300")]
    pub name_cache_ttl_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Maximum total deployed bytes for a scene with the given pointer count
    pub fn max_size_for_pointers(&self, pointers: usize) -> u64 {
        self.max_size_per_parcel_bytes.saturating_mul(pointers as u64)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_parcels == 0 {
            return Err("MAX_PARCELS must be at least 1".to_string());
        }

        if self.rate_limit_max_attempts == 0 {
            return Err("RATE_LIMIT_MAX_ATTEMPTS must be at least 1".to_string());
        }

        if self.gc_batch_size == 0 {
            return Err("GC_BATCH_SIZE must be at least 1".to_string());
        }

        if !self.dev_mode && self.name_registry_url.is_none() {
            return Err("NAME_REGISTRY_URL is required in production mode".to_string());
        }

        Ok(())
    }
}
