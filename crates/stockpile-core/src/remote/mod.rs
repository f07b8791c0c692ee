//! Remote persistence service contract.
//!
//! The core only ever talks to the authoritative backend through this narrow
//! CRUD surface. Writes carry the base `updated_at` the client last saw so
//! the server can reject divergent writes, and creates carry the event id as
//! an idempotency key so a replayed push cannot duplicate an entity.

mod http;
mod memory;

use thiserror::Error;

use crate::models::{EntityKind, EntitySnapshot};

pub use http::HttpRemoteService;
pub use memory::MemoryRemoteService;

/// Errors surfaced by the remote service
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transient transport failure; the event stays retryable
    #[error("Remote network error: {0}")]
    Network(String),

    /// Remote service reported an application error
    #[error("Remote API error: {0}")]
    Api(String),

    /// Remote rejected the write because its state diverged from the base
    #[error("Remote rejected write for {entity_id}: {reason}")]
    Conflict {
        /// Identifier of the contested entity
        entity_id: String,
        /// Server-side reason
        reason: String,
    },

    /// Remote response could not be interpreted
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

impl RemoteError {
    /// Whether retrying later may succeed without intervention
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<RemoteError> for crate::error::Error {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Conflict { entity_id, reason } => {
                Self::RemoteConflict(format!("{entity_id}: {reason}"))
            }
            RemoteError::Network(message)
            | RemoteError::Api(message)
            | RemoteError::InvalidPayload(message) => Self::Network(message),
        }
    }
}

/// Result type alias for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// CRUD contract of the authoritative remote service
#[allow(async_fn_in_trait)]
pub trait RemoteService {
    /// Create an entity and return the authoritative snapshot. Offline-form
    /// identifiers are replaced by a server-assigned id; a real identifier is
    /// kept as-is (re-creation after a delete conflict). `idempotency_key` is
    /// the event id: replaying the same key must return the original record.
    async fn create(
        &self,
        snapshot: &EntitySnapshot,
        idempotency_key: &str,
    ) -> RemoteResult<EntitySnapshot>;

    /// Overwrite an entity, conditional on the server's current `updated_at`
    /// equaling `base_updated_at`.
    async fn update(
        &self,
        snapshot: &EntitySnapshot,
        base_updated_at: i64,
    ) -> RemoteResult<EntitySnapshot>;

    /// Delete an entity, conditional on `base_updated_at`. Deleting an
    /// already-missing entity succeeds.
    async fn delete(&self, kind: EntityKind, id: &str, base_updated_at: i64) -> RemoteResult<()>;

    /// Fetch the authoritative record by id, for conflict comparison
    async fn fetch(&self, kind: EntityKind, id: &str) -> RemoteResult<Option<EntitySnapshot>>;

    /// Exact natural-key lookup on the server
    async fn find_by_code(&self, kind: EntityKind, code: &str)
        -> RemoteResult<Option<EntitySnapshot>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_remote_error_converts_by_severity() {
        let conflict = RemoteError::Conflict {
            entity_id: "e1".to_string(),
            reason: "code already taken".to_string(),
        };
        assert!(matches!(
            Error::from(conflict),
            Error::RemoteConflict(message) if message == "e1: code already taken"
        ));

        assert!(matches!(
            Error::from(RemoteError::Network("timeout".to_string())),
            Error::Network(_)
        ));
        assert!(matches!(
            Error::from(RemoteError::Api("HTTP 500".to_string())),
            Error::Network(_)
        ));
    }
}
