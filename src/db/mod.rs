//! Persistence layer
//!
//! MongoDB wrapper, document schemas, and the worlds repository. Permission
//! grant records have their own repository in `crate::permissions::repo`.

pub mod mongo;
pub mod schemas;
pub mod worlds;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use schemas::{Metadata, WorldDoc, WorldPermissionDoc};
pub use worlds::{InMemoryWorldsRepository, MongoWorldsRepository, WorldsRepository};
