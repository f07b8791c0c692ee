//! stockpile-core - Core library for Stockpile
//!
//! Offline-first inventory tracking: a durable mutation queue, offline
//! identifier virtualization, conflict detection and resolution, and a
//! local-first read path over a `SQLite` store.

pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod ids;
pub mod inventory;
pub mod lookup;
pub mod models;
pub mod remote;
pub mod search;
pub mod sync;
pub mod util;

pub use config::CoreConfig;
pub use error::{Error, Result};
pub use inventory::{EntityDraft, Inventory};
pub use models::{CachedEntity, EntityKind, EntitySnapshot};
pub use sync::{Connectivity, SyncEngine, SyncSummary};
