//! Local-first inventory write API.
//!
//! Every mutation applies to the local store and records a queue event in
//! one transaction, so the app is fully usable offline and nothing is lost
//! if the process dies between the two. Validation happens before either
//! write: a rejected mutation surfaces synchronously and enqueues nothing.

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::db::{EntityRepository, EventQueue, SqliteEntityRepository, SqliteEventQueue};
use crate::error::{Error, Result};
use crate::ids;
use crate::models::{
    CachedEntity, EntityKind, EntitySnapshot, MutationEvent, MutationKind, ScalarField, SyncStatus,
};
use crate::util::{normalize_text_option, unix_timestamp_ms};

/// Input for creating an entity; identifiers and timestamps are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct EntityDraft {
    /// Entity kind
    pub kind: EntityKind,
    /// Display name
    pub name: String,
    /// Natural key (scanned code)
    pub code: Option<String>,
    /// Containing container/location
    pub parent_id: Option<String>,
    /// Category reference
    pub category_id: Option<String>,
    /// Stock count
    pub quantity: i64,
    /// Unit price in cents
    pub price_cents: Option<i64>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl EntityDraft {
    /// A minimal draft with the given kind and name
    #[must_use]
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            code: None,
            parent_id: None,
            category_id: None,
            quantity: 0,
            price_cents: None,
            notes: None,
        }
    }
}

/// The write surface of the local store.
///
/// Mutations always succeed or fail immediately against local state;
/// reconciliation with the remote happens later through the queue.
pub struct Inventory<'a> {
    conn: &'a Connection,
    device_id: String,
}

impl<'a> Inventory<'a> {
    /// Create an inventory over the given connection, attributing events to
    /// `device_id`.
    pub const fn new(conn: &'a Connection, device_id: String) -> Self {
        Self { conn, device_id }
    }

    /// Create an entity under a fresh offline identifier and queue its
    /// create event.
    pub fn create(&self, draft: EntityDraft) -> Result<CachedEntity> {
        let entities = SqliteEntityRepository::new(self.conn);

        let snapshot = EntitySnapshot {
            id: ids::generate_offline_id(draft.kind),
            kind: draft.kind,
            name: draft.name.trim().to_string(),
            code: normalize_text_option(draft.code),
            parent_id: draft.parent_id,
            category_id: draft.category_id,
            quantity: draft.quantity,
            price_cents: draft.price_cents,
            notes: normalize_text_option(draft.notes),
            updated_at: unix_timestamp_ms(),
        };
        snapshot.validate()?;
        if let Some(code) = &snapshot.code {
            if entities.get_by_code(snapshot.kind, code)?.is_some() {
                return Err(Error::InvalidInput(format!(
                    "Code {code} is already used by another {}",
                    snapshot.kind
                )));
            }
        }
        self.check_references(&snapshot)?;

        let entity = CachedEntity {
            snapshot: snapshot.clone(),
            sync_status: SyncStatus::OfflineOnly,
            is_offline: true,
        };

        let tx = self.conn.unchecked_transaction()?;
        entities.upsert(&entity)?;
        SqliteEventQueue::new(self.conn).enqueue(&MutationEvent::new(
            MutationKind::Create,
            snapshot,
            None,
            self.device_id.clone(),
        ))?;
        tx.commit()?;
        Ok(entity)
    }

    /// Apply scalar-field changes to an entity and queue its update event.
    ///
    /// Relocation is not an update; changing `parent_id` goes through
    /// [`Self::relocate`] so concurrent moves classify as such.
    pub fn update(
        &self,
        kind: EntityKind,
        id: &str,
        changes: &[(ScalarField, Value)],
    ) -> Result<CachedEntity> {
        let entities = SqliteEntityRepository::new(self.conn);
        let current = entities
            .get(kind, id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let prior = current.snapshot.clone();
        let mut snapshot = current.snapshot;
        for (field, value) in changes {
            if *field == ScalarField::ParentId {
                return Err(Error::InvalidInput(
                    "Relocation is a move, not an update".to_string(),
                ));
            }
            snapshot.set_field(*field, value.clone())?;
        }
        snapshot.updated_at = unix_timestamp_ms();
        snapshot.validate()?;
        if let Some(code) = &snapshot.code {
            if let Some(holder) = entities.get_by_code(kind, code)? {
                if holder.snapshot.id != snapshot.id {
                    return Err(Error::InvalidInput(format!(
                        "Code {code} is already used by another {kind}"
                    )));
                }
            }
        }
        self.check_references(&snapshot)?;

        self.commit_mutation(MutationKind::Update, snapshot, Some(prior))
    }

    /// Move an entity under a new parent (or to the top level) and queue its
    /// move event.
    pub fn relocate(
        &self,
        kind: EntityKind,
        id: &str,
        new_parent_id: Option<String>,
    ) -> Result<CachedEntity> {
        let entities = SqliteEntityRepository::new(self.conn);
        let current = entities
            .get(kind, id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let prior = current.snapshot.clone();
        let mut snapshot = current.snapshot;
        snapshot.parent_id = new_parent_id;
        snapshot.updated_at = unix_timestamp_ms();
        snapshot.validate()?;
        self.check_references(&snapshot)?;

        self.commit_mutation(MutationKind::Move, snapshot, Some(prior))
    }

    /// Delete an entity and queue its delete event.
    ///
    /// An entity that never left this device is simply forgotten: its row
    /// and its queued events are dropped, and no delete reaches the remote.
    pub fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let entities = SqliteEntityRepository::new(self.conn);
        let current = entities
            .get(kind, id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let tx = self.conn.unchecked_transaction()?;
        entities.delete(kind, id)?;
        if current.sync_status == SyncStatus::OfflineOnly && ids::is_offline_id(id) {
            self.conn.execute(
                "DELETE FROM sync_events WHERE entity_id = ? AND status != 'synced'",
                params![id],
            )?;
        } else {
            SqliteEventQueue::new(self.conn).enqueue(&MutationEvent::new(
                MutationKind::Delete,
                current.snapshot.clone(),
                Some(current.snapshot),
                self.device_id.clone(),
            ))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Get an entity by kind and id
    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Option<CachedEntity>> {
        SqliteEntityRepository::new(self.conn).get(kind, id)
    }

    /// List entities of a kind, most recently updated first
    pub fn list(&self, kind: EntityKind, limit: usize, offset: usize) -> Result<Vec<CachedEntity>> {
        SqliteEntityRepository::new(self.conn).list(kind, limit, offset)
    }

    fn commit_mutation(
        &self,
        kind: MutationKind,
        snapshot: EntitySnapshot,
        prior: Option<EntitySnapshot>,
    ) -> Result<CachedEntity> {
        let is_offline = ids::is_offline_id(&snapshot.id);
        let entity = CachedEntity {
            snapshot: snapshot.clone(),
            sync_status: if is_offline {
                SyncStatus::OfflineOnly
            } else {
                SyncStatus::Pending
            },
            is_offline,
        };

        let tx = self.conn.unchecked_transaction()?;
        SqliteEntityRepository::new(self.conn).upsert(&entity)?;
        SqliteEventQueue::new(self.conn).enqueue(&MutationEvent::new(
            kind,
            snapshot,
            prior,
            self.device_id.clone(),
        ))?;
        tx.commit()?;
        Ok(entity)
    }

    /// Referential checks against local state: the parent must exist and be
    /// of an accepted kind, the category must exist. Offline references are
    /// fine; the queue orders the referenced creates first.
    fn check_references(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let entities = SqliteEntityRepository::new(self.conn);
        if let Some(parent_id) = &snapshot.parent_id {
            let parent = [EntityKind::Container, EntityKind::Location]
                .into_iter()
                .find_map(|kind| entities.get(kind, parent_id).transpose())
                .transpose()?
                .ok_or_else(|| {
                    Error::InvalidInput(format!("Parent {parent_id} does not exist"))
                })?;
            if !snapshot.kind.accepts_parent(parent.snapshot.kind) {
                return Err(Error::InvalidInput(format!(
                    "A {} cannot live inside a {}",
                    snapshot.kind, parent.snapshot.kind
                )));
            }
            if parent.snapshot.id == snapshot.id {
                return Err(Error::InvalidInput(
                    "An entity cannot contain itself".to_string(),
                ));
            }
        }
        if let Some(category_id) = &snapshot.category_id {
            if entities.get(EntityKind::Category, category_id)?.is_none() {
                return Err(Error::InvalidInput(format!(
                    "Category {category_id} does not exist"
                )));
            }
        }
        Ok(())
    }
}
