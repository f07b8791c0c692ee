//! Data models for Stockpile

mod conflict;
mod entity;
mod event;
mod mapping;

pub use conflict::{
    ConflictKind, ConflictRecord, MergeSide, Resolution, ResolutionStrategy,
};
pub use entity::{
    is_valid_code, CachedEntity, EntityKind, EntitySnapshot, ScalarField, SyncStatus,
};
pub use event::{EventStatus, MutationEvent, MutationKind};
pub use mapping::IdentifierMapping;
