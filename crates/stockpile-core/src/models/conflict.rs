//! Conflict record model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{EntityKind, EntitySnapshot, ScalarField};
use crate::util::unix_timestamp_ms;

/// Classification of a detected divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides updated the entity since the last common snapshot
    UpdateUpdate,
    /// One side deleted the entity while the other updated it
    DeleteUpdate,
    /// Two offline origins created logically-equivalent entities (same code)
    CreateCreate,
    /// Concurrent relocation to different parents
    MoveMove,
}

impl ConflictKind {
    /// Stable snake_case name used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateUpdate => "update_update",
            Self::DeleteUpdate => "delete_update",
            Self::CreateCreate => "create_create",
            Self::MoveMove => "move_move",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "update_update" => Ok(Self::UpdateUpdate),
            "delete_update" => Ok(Self::DeleteUpdate),
            "create_create" => Ok(Self::CreateCreate),
            "move_move" => Ok(Self::MoveMove),
            other => Err(Error::InvalidInput(format!("Unknown conflict kind: {other}"))),
        }
    }
}

/// How a conflict was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Local snapshot won; remote divergence discarded
    Local,
    /// Remote snapshot won; local divergence discarded
    Remote,
    /// Field-by-field combination of both sides
    Merge,
}

impl Resolution {
    /// Stable lowercase name used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Merge => "merge",
        }
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "merge" => Ok(Self::Merge),
            other => Err(Error::InvalidInput(format!("Unknown resolution: {other}"))),
        }
    }
}

/// Side chosen for one field of a merge resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeSide {
    Local,
    Remote,
}

/// User-selected resolution strategy for `resolve_manually`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Keep the local snapshot wholesale
    Local,
    /// Accept the remote snapshot wholesale
    Remote,
    /// Pick a side per diverging field; applied all-or-nothing
    Merge(BTreeMap<ScalarField, MergeSide>),
}

/// A detected divergence between local and remote state.
///
/// At most one unresolved record exists per `(entity_kind, entity_id)`.
/// Once resolved the record is immutable; a later divergence produces a new
/// record, never a reopening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Unique record identifier (UUID v7)
    pub id: String,
    /// Divergence classification
    pub kind: ConflictKind,
    /// Kind of the conflicted entity
    pub entity_kind: EntityKind,
    /// Identifier of the conflicted entity
    pub entity_id: String,
    /// Local side; `None` when the local side deleted the entity
    pub local: Option<EntitySnapshot>,
    /// Remote side; `None` when the remote side deleted the entity
    pub remote: Option<EntitySnapshot>,
    /// Last common snapshot both sides diverged from, when known
    pub base: Option<EntitySnapshot>,
    /// Timestamp of the local divergence (Unix ms)
    pub local_updated_at: i64,
    /// Timestamp of the remote divergence (Unix ms)
    pub remote_updated_at: i64,
    /// When the detector materialized this record (Unix ms)
    pub detected_at: i64,
    /// Applied resolution, once any
    pub resolution: Option<Resolution>,
    /// When the resolution was applied (Unix ms)
    pub resolved_at: Option<i64>,
    /// Who resolved it (`auto` or a user/device identifier)
    pub resolved_by: Option<String>,
}

impl ConflictRecord {
    /// Materialize a newly detected, unresolved conflict
    #[must_use]
    pub fn new(
        kind: ConflictKind,
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        local: Option<EntitySnapshot>,
        remote: Option<EntitySnapshot>,
        base: Option<EntitySnapshot>,
        local_updated_at: i64,
        remote_updated_at: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            entity_kind,
            entity_id: entity_id.into(),
            local,
            remote,
            base,
            local_updated_at,
            remote_updated_at,
            detected_at: unix_timestamp_ms(),
            resolution: None,
            resolved_at: None,
            resolved_by: None,
        }
    }

    /// Whether a resolution has been applied
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}
