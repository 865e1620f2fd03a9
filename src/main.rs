//! Firmament maintenance entry point
//!
//! Wires the configured repositories and content store, then runs an
//! admin-triggered garbage-collection pass. The HTTP surface lives in the
//! gateway deployment; this binary covers the operational side.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use firmament::{
    config::Args,
    db::{InMemoryWorldsRepository, MongoClient, MongoWorldsRepository, WorldsRepository},
    gc::GarbageCollector,
    storage::FsContentStorage,
};

/// Extra flags for the maintenance run
#[derive(Parser, Debug)]
struct MaintenanceArgs {
    #[command(flatten)]
    args: Args,

    /// Report GC candidates without deleting anything
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let MaintenanceArgs { args, dry_run } = MaintenanceArgs::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("firmament={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Firmament - Elohim World Gateway");
    info!("  \"And God called the firmament Heaven\"");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Version: {} ({})", env!("GIT_COMMIT_SHORT"), env!("BUILD_TIMESTAMP"));
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Storage root: {}", args.storage_root.display());
    info!("MongoDB: {}", args.mongodb_uri);
    info!("GC batch size: {}", args.gc_batch_size);
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let worlds: Arc<dyn WorldsRepository> =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                Arc::new(MongoWorldsRepository::new(&client).await?)
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, using in-memory worlds): {}", e);
                    Arc::new(InMemoryWorldsRepository::new())
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    let storage = Arc::new(FsContentStorage::new(args.storage_root.clone()));

    let collector = GarbageCollector::new(storage, worlds, args.gc_batch_size);
    let summary = collector.run(dry_run).await?;

    info!(
        live = summary.live,
        scanned = summary.scanned,
        candidates = summary.candidates,
        deleted = summary.deleted,
        dry_run,
        "Garbage collection pass complete"
    );

    Ok(())
}
