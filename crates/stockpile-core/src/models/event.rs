//! Mutation event model: one recorded intent to change remote state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{EntityKind, EntitySnapshot};
use crate::util::unix_timestamp_ms;

/// What the mutation does to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Move,
}

impl MutationKind {
    /// Stable lowercase name used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Move => "move",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "move" => Ok(Self::Move),
            other => Err(Error::InvalidInput(format!("Unknown mutation kind: {other}"))),
        }
    }
}

/// Queue lifecycle state of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Waiting for a sync pass (or eligible for retry)
    Pending,
    /// Picked up by an in-flight sync pass
    Syncing,
    /// Acknowledged by the remote service; retained briefly for audit
    Synced,
    /// Terminal failure; surfaced to the user or cleared by resolution
    Failed,
}

impl EventStatus {
    /// Stable lowercase name used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("Unknown event status: {other}"))),
        }
    }
}

/// One recorded offline mutation, durable until synced and purged.
///
/// The `id` is caller-generated and doubles as the idempotency key: enqueuing
/// the same id twice is a no-op, and the remote service receives it with
/// creates so a replayed push cannot duplicate an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEvent {
    /// Globally unique event identifier (UUID v7)
    pub id: String,
    /// Mutation kind
    pub kind: MutationKind,
    /// Kind of the touched entity
    pub entity_kind: EntityKind,
    /// Offline or real identifier of the touched entity
    pub entity_id: String,
    /// Full post-mutation snapshot
    pub payload: EntitySnapshot,
    /// Pre-mutation snapshot; the base the sync compares remote state against
    pub prior: Option<EntitySnapshot>,
    /// Creation timestamp (Unix ms); orders events within an entity
    pub created_at: i64,
    /// Device that recorded the mutation
    pub origin_device: String,
    /// Queue lifecycle state
    pub status: EventStatus,
    /// Automatic retry attempts so far
    pub attempts: u32,
    /// Message from the most recent failure
    pub last_error: Option<String>,
    /// Earliest time (Unix ms) the event is eligible for retry
    pub next_attempt_at: i64,
}

impl MutationEvent {
    /// Record a new pending mutation
    #[must_use]
    pub fn new(
        kind: MutationKind,
        payload: EntitySnapshot,
        prior: Option<EntitySnapshot>,
        origin_device: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            entity_kind: payload.kind,
            entity_id: payload.id.clone(),
            payload,
            prior,
            created_at: unix_timestamp_ms(),
            origin_device: origin_device.into(),
            status: EventStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: 0,
        }
    }
}
