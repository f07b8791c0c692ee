//! Offline-first entity lookup by natural key.
//!
//! The local store always answers first; the remote is consulted only on a
//! local miss while effectively online, and a remote hit is cached locally
//! so the next scan of the same code works offline.

use rusqlite::Connection;

use crate::db::{EntityRepository, SqliteEntityRepository};
use crate::error::Result;
use crate::models::{CachedEntity, EntityKind, SyncStatus};
use crate::remote::RemoteService;
use crate::sync::Connectivity;

/// Where a lookup hit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    /// Answered from the local store
    Local,
    /// Fetched from the remote service on a local miss
    Remote,
}

/// A successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupHit {
    /// Where the answer came from
    pub source: LookupSource,
    /// The entity found
    pub entity: CachedEntity,
}

/// Local-first read path over the store and the remote service
pub struct ReadPath<'a, R> {
    conn: &'a Connection,
    remote: &'a R,
}

impl<'a, R: RemoteService> ReadPath<'a, R> {
    /// Create a read path over the given connection and remote service
    pub const fn new(conn: &'a Connection, remote: &'a R) -> Self {
        Self { conn, remote }
    }

    /// Look up an entity by its scanned code.
    ///
    /// Returns `None` on a local miss while offline; the caller cannot
    /// distinguish "absent" from "not cached" until connectivity returns.
    pub async fn lookup(
        &self,
        kind: EntityKind,
        code: &str,
        connectivity: Connectivity,
    ) -> Result<Option<LookupHit>> {
        let entities = SqliteEntityRepository::new(self.conn);
        if let Some(entity) = entities.get_by_code(kind, code)? {
            return Ok(Some(LookupHit {
                source: LookupSource::Local,
                entity,
            }));
        }
        if !connectivity.effective_online() {
            return Ok(None);
        }

        let Some(snapshot) = self.remote.find_by_code(kind, code).await? else {
            return Ok(None);
        };

        let entity = CachedEntity {
            snapshot,
            sync_status: SyncStatus::Synced,
            is_offline: false,
        };
        entities.upsert(&entity)?;
        tracing::debug!(kind = kind.as_str(), code, "cached remote lookup hit");
        Ok(Some(LookupHit {
            source: LookupSource::Remote,
            entity,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::EntitySnapshot;
    use crate::remote::MemoryRemoteService;
    use pretty_assertions::assert_eq;

    const ONLINE: Connectivity = Connectivity {
        online: true,
        forced_offline: false,
    };
    const OFFLINE: Connectivity = Connectivity {
        online: false,
        forced_offline: false,
    };

    fn snapshot(id: &str, code: &str) -> EntitySnapshot {
        EntitySnapshot {
            id: id.to_string(),
            kind: EntityKind::Item,
            name: "Bolts".to_string(),
            code: Some(code.to_string()),
            parent_id: None,
            category_id: None,
            quantity: 4,
            price_cents: None,
            notes: None,
            updated_at: 100,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_hit_never_touches_remote() {
        let db = Database::open_in_memory().unwrap();
        let remote = MemoryRemoteService::new();
        remote.set_offline(true); // Any remote call would fail

        SqliteEntityRepository::new(db.connection())
            .upsert(&CachedEntity {
                snapshot: snapshot("e1", "BOLT-M6"),
                sync_status: SyncStatus::Synced,
                is_offline: false,
            })
            .unwrap();

        let read = ReadPath::new(db.connection(), &remote);
        let hit = read
            .lookup(EntityKind::Item, "BOLT-M6", ONLINE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.source, LookupSource::Local);
        assert_eq!(hit.entity.snapshot.id, "e1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_fallback_caches_locally() {
        let db = Database::open_in_memory().unwrap();
        let remote = MemoryRemoteService::new();
        remote.put(snapshot("e1", "BOLT-M6"));

        let read = ReadPath::new(db.connection(), &remote);
        let hit = read
            .lookup(EntityKind::Item, "BOLT-M6", ONLINE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.source, LookupSource::Remote);

        // Cached: the same scan now answers locally, even offline
        let hit = read
            .lookup(EntityKind::Item, "BOLT-M6", OFFLINE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.source, LookupSource::Local);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_miss_is_none() {
        let db = Database::open_in_memory().unwrap();
        let remote = MemoryRemoteService::new();
        remote.put(snapshot("e1", "BOLT-M6"));

        let read = ReadPath::new(db.connection(), &remote);
        // Offline by network signal
        assert!(read
            .lookup(EntityKind::Item, "BOLT-M6", OFFLINE)
            .await
            .unwrap()
            .is_none());
        // Online but forced offline by the user
        let forced = Connectivity {
            online: true,
            forced_offline: true,
        };
        assert!(read
            .lookup(EntityKind::Item, "BOLT-M6", forced)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_failure_surfaces_as_network_error() {
        let db = Database::open_in_memory().unwrap();
        let remote = MemoryRemoteService::new();
        remote.set_offline(true);

        let read = ReadPath::new(db.connection(), &remote);
        let error = read
            .lookup(EntityKind::Item, "BOLT-M6", ONLINE)
            .await
            .unwrap_err();
        assert!(matches!(error, crate::error::Error::Network(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_online_miss_is_none() {
        let db = Database::open_in_memory().unwrap();
        let remote = MemoryRemoteService::new();

        let read = ReadPath::new(db.connection(), &remote);
        assert!(read
            .lookup(EntityKind::Item, "NOPE-1", ONLINE)
            .await
            .unwrap()
            .is_none());
    }
}
