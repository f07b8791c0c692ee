//! Identifier mapping model

use serde::{Deserialize, Serialize};

use crate::models::EntityKind;

/// Durable binding from an offline identifier to the remote-assigned one.
///
/// Created the moment the remote service acknowledges a Create event for an
/// offline-identified entity, in the same transaction that rewrites every
/// local reference to the offline form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierMapping {
    /// The syntactically tagged local identifier
    pub offline_id: String,
    /// The identifier assigned by the remote service
    pub real_id: String,
    /// Kind of the mapped entity
    pub entity_kind: EntityKind,
    /// When the offline identifier was first handed out (Unix ms)
    pub created_at: i64,
    /// When the remote service confirmed the real identifier (Unix ms)
    pub confirmed_at: i64,
}
