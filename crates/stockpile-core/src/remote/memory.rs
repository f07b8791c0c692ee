//! In-memory remote service used by tests and local demos.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::models::{EntityKind, EntitySnapshot};
use crate::remote::{RemoteError, RemoteResult, RemoteService};

#[derive(Default)]
struct Inner {
    entities: HashMap<(EntityKind, String), EntitySnapshot>,
    // Idempotency key -> assigned entity id
    created: HashMap<String, String>,
    offline: bool,
}

/// An authoritative remote backend held entirely in memory.
///
/// Supports fault injection (`set_offline`) and direct state manipulation so
/// tests can play the part of a second device editing remote state.
#[derive(Default)]
pub struct MemoryRemoteService {
    inner: Mutex<Inner>,
}

impl MemoryRemoteService {
    /// Create an empty remote
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) connectivity: while offline every call
    /// fails with a transient network error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().expect("remote lock").offline = offline;
    }

    /// Seed or overwrite authoritative state directly, bypassing the base
    /// check — this is "another device synced first".
    pub fn put(&self, snapshot: EntitySnapshot) {
        let mut inner = self.inner.lock().expect("remote lock");
        inner
            .entities
            .insert((snapshot.kind, snapshot.id.clone()), snapshot);
    }

    /// Remove authoritative state directly ("another device deleted it")
    pub fn remove(&self, kind: EntityKind, id: &str) {
        let mut inner = self.inner.lock().expect("remote lock");
        inner.entities.remove(&(kind, id.to_string()));
    }

    /// Read authoritative state directly, for assertions
    #[must_use]
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<EntitySnapshot> {
        let inner = self.inner.lock().expect("remote lock");
        inner.entities.get(&(kind, id.to_string())).cloned()
    }

    /// Number of authoritative records, for assertions
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("remote lock").entities.len()
    }

    /// Whether the remote holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(inner: &Inner) -> RemoteResult<()> {
        if inner.offline {
            return Err(RemoteError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

impl RemoteService for MemoryRemoteService {
    async fn create(
        &self,
        snapshot: &EntitySnapshot,
        idempotency_key: &str,
    ) -> RemoteResult<EntitySnapshot> {
        let mut inner = self.inner.lock().expect("remote lock");
        Self::check_online(&inner)?;

        // Replayed create: hand back the record assigned the first time.
        if let Some(assigned_id) = inner.created.get(idempotency_key).cloned() {
            return inner
                .entities
                .get(&(snapshot.kind, assigned_id.clone()))
                .cloned()
                .ok_or_else(|| {
                    RemoteError::Api(format!("idempotent replay of deleted entity {assigned_id}"))
                });
        }

        // Natural keys are unique per kind
        if let Some(code) = &snapshot.code {
            let taken = inner.entities.values().any(|existing| {
                existing.kind == snapshot.kind && existing.code.as_deref() == Some(code)
            });
            if taken {
                return Err(RemoteError::Conflict {
                    entity_id: snapshot.id.clone(),
                    reason: format!("code {code} is already in use"),
                });
            }
        }

        let mut stored = snapshot.clone();
        if crate::ids::is_offline_id(&stored.id) {
            stored.id = Uuid::now_v7().to_string();
        }
        inner
            .created
            .insert(idempotency_key.to_string(), stored.id.clone());
        inner
            .entities
            .insert((stored.kind, stored.id.clone()), stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        snapshot: &EntitySnapshot,
        base_updated_at: i64,
    ) -> RemoteResult<EntitySnapshot> {
        let mut inner = self.inner.lock().expect("remote lock");
        Self::check_online(&inner)?;

        let key = (snapshot.kind, snapshot.id.clone());
        let Some(current) = inner.entities.get(&key) else {
            return Err(RemoteError::Conflict {
                entity_id: snapshot.id.clone(),
                reason: "entity missing on remote".to_string(),
            });
        };
        if current.updated_at != base_updated_at {
            return Err(RemoteError::Conflict {
                entity_id: snapshot.id.clone(),
                reason: "base version is stale".to_string(),
            });
        }
        inner.entities.insert(key, snapshot.clone());
        Ok(snapshot.clone())
    }

    async fn delete(&self, kind: EntityKind, id: &str, base_updated_at: i64) -> RemoteResult<()> {
        let mut inner = self.inner.lock().expect("remote lock");
        Self::check_online(&inner)?;

        let key = (kind, id.to_string());
        let Some(current) = inner.entities.get(&key) else {
            return Ok(()); // Already gone
        };
        if current.updated_at != base_updated_at {
            return Err(RemoteError::Conflict {
                entity_id: id.to_string(),
                reason: "base version is stale".to_string(),
            });
        }
        inner.entities.remove(&key);
        Ok(())
    }

    async fn fetch(&self, kind: EntityKind, id: &str) -> RemoteResult<Option<EntitySnapshot>> {
        let inner = self.inner.lock().expect("remote lock");
        Self::check_online(&inner)?;
        Ok(inner.entities.get(&(kind, id.to_string())).cloned())
    }

    async fn find_by_code(
        &self,
        kind: EntityKind,
        code: &str,
    ) -> RemoteResult<Option<EntitySnapshot>> {
        let inner = self.inner.lock().expect("remote lock");
        Self::check_online(&inner)?;
        Ok(inner
            .entities
            .values()
            .find(|snapshot| snapshot.kind == kind && snapshot.code.as_deref() == Some(code))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: &str, code: Option<&str>) -> EntitySnapshot {
        EntitySnapshot {
            id: crate::ids::generate_offline_id(EntityKind::Item),
            kind: EntityKind::Item,
            name: name.to_string(),
            code: code.map(ToString::to_string),
            parent_id: None,
            category_id: None,
            quantity: 5,
            price_cents: None,
            notes: None,
            updated_at: 100,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_assigns_real_id() {
        let remote = MemoryRemoteService::new();
        let created = remote.create(&snapshot("Bolts", None), "key-1").await.unwrap();

        assert!(!crate::ids::is_offline_id(&created.id));
        assert_eq!(remote.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_keeps_real_id() {
        let remote = MemoryRemoteService::new();
        let mut draft = snapshot("Bolts", None);
        draft.id = "real-1".to_string();

        let created = remote.create(&draft, "key-1").await.unwrap();
        assert_eq!(created.id, "real-1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_idempotent_on_key() {
        let remote = MemoryRemoteService::new();
        let first = remote.create(&snapshot("Bolts", None), "key-1").await.unwrap();
        let replay = remote.create(&snapshot("Bolts", None), "key-1").await.unwrap();

        assert_eq!(first.id, replay.id);
        assert_eq!(remote.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_checks_base_version() {
        let remote = MemoryRemoteService::new();
        let mut created = remote.create(&snapshot("Bolts", None), "key-1").await.unwrap();

        created.quantity = 7;
        created.updated_at = 200;
        remote.update(&created, 100).await.unwrap();

        // Stale base is rejected
        created.updated_at = 300;
        let err = remote.update(&created, 100).await.unwrap_err();
        assert!(matches!(err, RemoteError::Conflict { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_missing_is_ok() {
        let remote = MemoryRemoteService::new();
        remote.delete(EntityKind::Item, "ghost", 0).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_fails_transient() {
        let remote = MemoryRemoteService::new();
        remote.set_offline(true);

        let err = remote.fetch(EntityKind::Item, "e1").await.unwrap_err();
        assert!(err.is_transient());

        remote.set_offline(false);
        assert_eq!(remote.fetch(EntityKind::Item, "e1").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_find_by_code() {
        let remote = MemoryRemoteService::new();
        remote.create(&snapshot("Bolts", Some("B-1")), "key-1").await.unwrap();

        let hit = remote.find_by_code(EntityKind::Item, "B-1").await.unwrap();
        assert_eq!(hit.unwrap().name, "Bolts");
        assert!(remote
            .find_by_code(EntityKind::Item, "B-2")
            .await
            .unwrap()
            .is_none());
    }
}
