//! Firmament - world deployment gateway for Elohim
//!
//! "And God called the firmament Heaven" - Genesis 1:8
//!
//! Firmament stores and gates access to world scenes: content-addressed
//! entity documents plus their asset files, deployed by signed requests and
//! deduplicated in a content-addressable store.
//!
//! ## Components
//!
//! - **Validation**: ordered fail-fast pipeline over incoming deployments
//! - **Permissions**: world-wide and parcel-scoped grants, four setting kinds
//! - **Orchestrator**: single-shot and incremental deployment persistence
//! - **GC**: mark-and-sweep reclamation of unreferenced content
//! - **Limiter**: sliding-window guard for sensitive mutations

pub mod cache;
pub mod config;
pub mod db;
pub mod deployment;
pub mod entity;
pub mod gc;
pub mod limiter;
pub mod names;
pub mod notifications;
pub mod permissions;
pub mod storage;
pub mod types;

pub use config::Args;
pub use types::{FirmamentError, Result};
