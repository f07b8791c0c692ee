//! Conflict resolution.
//!
//! Resolution is the only way a conflicted entity leaves its blocked state.
//! Applying a resolution is atomic: the surviving snapshot, the queue, and
//! the conflict record change together or not at all. The blocked events for
//! the entity are dropped and, when local state must reach the remote, a
//! single new event carrying the resolved snapshot replaces them.

use rusqlite::{params, Connection};

use crate::db::{
    ConflictRepository, EntityRepository, EventQueue, SqliteConflictRepository,
    SqliteEntityRepository, SqliteEventQueue,
};
use crate::error::{Error, Result};
use crate::ids::{self, IdVirtualizer};
use crate::models::{
    CachedEntity, ConflictKind, ConflictRecord, EntitySnapshot, MergeSide, MutationEvent,
    MutationKind, Resolution, ResolutionStrategy, SyncStatus,
};

/// Applies automatic and manual resolutions to open conflict records
pub struct ConflictResolver<'a> {
    conn: &'a Connection,
    device_id: String,
}

impl<'a> ConflictResolver<'a> {
    /// Create a resolver over the given connection, attributing queue events
    /// it produces to `device_id`.
    pub const fn new(conn: &'a Connection, device_id: String) -> Self {
        Self { conn, device_id }
    }

    /// Attempt to resolve a conflict without user input.
    ///
    /// Delete-update conflicts resolve in favor of the deleted side.
    /// Update-update conflicts resolve by field-level three-way merge when a
    /// base snapshot is available and no field was changed on both sides at
    /// the same instant. Create-create and move-move conflicts always need a
    /// human. Returns the applied resolution, or `None` when the record must
    /// stay open.
    pub fn resolve_automatically(
        &self,
        conflict: &ConflictRecord,
        now: i64,
    ) -> Result<Option<Resolution>> {
        if conflict.is_resolved() {
            return Ok(None);
        }
        match conflict.kind {
            ConflictKind::DeleteUpdate => {
                let resolution = if conflict.local.is_none() {
                    Resolution::Local
                } else {
                    Resolution::Remote
                };
                self.apply(conflict, None, resolution, "auto", now)?;
                Ok(Some(resolution))
            }
            ConflictKind::UpdateUpdate => {
                let (Some(base), Some(local), Some(remote)) =
                    (&conflict.base, &conflict.local, &conflict.remote)
                else {
                    return Ok(None);
                };
                let Some(merged) = three_way_merge(
                    base,
                    local,
                    remote,
                    conflict.local_updated_at,
                    conflict.remote_updated_at,
                ) else {
                    return Ok(None);
                };
                self.apply(conflict, Some(merged), Resolution::Merge, "auto", now)?;
                Ok(Some(Resolution::Merge))
            }
            // Identity and placement disputes carry intent a timestamp
            // cannot arbitrate
            ConflictKind::CreateCreate | ConflictKind::MoveMove => Ok(None),
        }
    }

    /// Apply a user-selected resolution to an open conflict.
    ///
    /// A merge selection must name every diverging field and nothing else;
    /// an incomplete or stray selection is rejected before any state
    /// changes. Returns the resolved record.
    pub fn resolve_manually(
        &self,
        conflict_id: &str,
        strategy: &ResolutionStrategy,
        resolved_by: &str,
        now: i64,
    ) -> Result<ConflictRecord> {
        let conflicts = SqliteConflictRepository::new(self.conn);
        let conflict = conflicts
            .get(conflict_id)?
            .ok_or_else(|| Error::NotFound(conflict_id.to_string()))?;
        if conflict.is_resolved() {
            return Err(Error::InvalidInput(format!(
                "Conflict {conflict_id} is already resolved"
            )));
        }

        let (resolution, winner) = match strategy {
            ResolutionStrategy::Local => (Resolution::Local, conflict.local.clone()),
            ResolutionStrategy::Remote => (Resolution::Remote, conflict.remote.clone()),
            ResolutionStrategy::Merge(selection) => {
                let (Some(local), Some(remote)) = (&conflict.local, &conflict.remote) else {
                    return Err(Error::InvalidInput(
                        "A field merge needs both sides present".to_string(),
                    ));
                };
                let diverging = EntitySnapshot::diverging_fields(local, remote);
                for field in &diverging {
                    if !selection.contains_key(field) {
                        return Err(Error::InvalidInput(format!(
                            "Merge selection is missing diverging field {field}"
                        )));
                    }
                }
                for field in selection.keys() {
                    if !diverging.contains(field) {
                        return Err(Error::InvalidInput(format!(
                            "Field {field} does not diverge"
                        )));
                    }
                }

                let mut merged = local.clone();
                for (field, side) in selection {
                    if *side == MergeSide::Remote {
                        merged.set_field(*field, remote.field(*field))?;
                    }
                }
                (Resolution::Merge, Some(merged))
            }
        };

        self.apply(&conflict, winner, resolution, resolved_by, now)?;
        conflicts
            .get(conflict_id)?
            .ok_or_else(|| Error::NotFound(conflict_id.to_string()))
    }

    /// Apply a decided resolution in one transaction: rewrite the entity,
    /// replace the entity's blocked events, and stamp the record.
    ///
    /// `winner` is the surviving snapshot; `None` means the deletion side
    /// won. When the resolution changes what the remote should hold, one new
    /// queue event based on the current remote state replaces the dropped
    /// ones.
    fn apply(
        &self,
        conflict: &ConflictRecord,
        winner: Option<EntitySnapshot>,
        resolution: Resolution,
        resolved_by: &str,
        now: i64,
    ) -> Result<()> {
        let mut entity_id = conflict.entity_id.clone();

        // Both sides of a create-create claim the natural key; the survivor
        // keeps the remote identity. Rewriting local references to the
        // offline id is atomic on its own and must happen before the write
        // transaction below.
        if conflict.kind == ConflictKind::CreateCreate {
            let remote = conflict.remote.as_ref().ok_or_else(|| {
                Error::InvalidInput("Create conflict without a remote side".to_string())
            })?;
            if ids::is_offline_id(&entity_id) {
                IdVirtualizer::new(self.conn).create_mapping(
                    &entity_id,
                    &remote.id,
                    conflict.entity_kind,
                    now,
                )?;
                entity_id.clone_from(&remote.id);
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        let entities = SqliteEntityRepository::new(self.conn);
        let queue = SqliteEventQueue::new(self.conn);
        let conflicts = SqliteConflictRepository::new(self.conn);

        // The entity's blocked events are superseded by the resolution
        self.conn.execute(
            "DELETE FROM sync_events WHERE entity_id = ? AND status != 'synced'",
            params![entity_id],
        )?;

        match winner {
            Some(mut snapshot) => {
                snapshot.id.clone_from(&entity_id);
                if resolution == Resolution::Remote {
                    // Local simply adopts the authoritative state
                    entities.upsert(&CachedEntity {
                        snapshot,
                        sync_status: SyncStatus::Synced,
                        is_offline: false,
                    })?;
                } else {
                    snapshot.updated_at = now;
                    snapshot.validate()?;
                    entities.upsert(&CachedEntity {
                        snapshot: snapshot.clone(),
                        sync_status: SyncStatus::Pending,
                        is_offline: ids::is_offline_id(&entity_id),
                    })?;
                    let kind = match conflict.kind {
                        ConflictKind::MoveMove => MutationKind::Move,
                        // Remote side deleted: the survivor must be re-created
                        _ if conflict.remote.is_none() => MutationKind::Create,
                        _ => MutationKind::Update,
                    };
                    queue.enqueue(&MutationEvent::new(
                        kind,
                        snapshot,
                        conflict.remote.clone(),
                        self.device_id.clone(),
                    ))?;
                }
            }
            None => {
                // The deletion side won
                entities.delete(conflict.entity_kind, &entity_id)?;
                if let Some(remote) = &conflict.remote {
                    queue.enqueue(&MutationEvent::new(
                        MutationKind::Delete,
                        remote.clone(),
                        Some(remote.clone()),
                        self.device_id.clone(),
                    ))?;
                }
            }
        }

        conflicts.mark_resolved(&conflict.id, resolution, resolved_by, now)?;
        tx.commit()?;
        tracing::info!(
            conflict_id = conflict.id,
            kind = conflict.kind.as_str(),
            entity_id,
            resolution = resolution.as_str(),
            resolved_by,
            "resolved sync conflict"
        );
        Ok(())
    }
}

/// Field-level three-way merge of two divergent snapshots.
///
/// A field changed on one side takes that side's value. A field changed on
/// both sides takes the later side's value, and `None` is returned when the
/// two sides tie on the clock; such a conflict cannot be arbitrated
/// automatically.
fn three_way_merge(
    base: &EntitySnapshot,
    local: &EntitySnapshot,
    remote: &EntitySnapshot,
    local_updated_at: i64,
    remote_updated_at: i64,
) -> Option<EntitySnapshot> {
    let mut merged = base.clone();
    for field in crate::models::ScalarField::ALL {
        let base_value = base.field(field);
        let local_value = local.field(field);
        let remote_value = remote.field(field);

        let value = if local_value == remote_value {
            local_value
        } else if remote_value == base_value {
            local_value
        } else if local_value == base_value {
            remote_value
        } else if local_updated_at > remote_updated_at {
            local_value
        } else if remote_updated_at > local_updated_at {
            remote_value
        } else {
            return None;
        };
        // Values read from a snapshot are type-correct by construction
        merged.set_field(field, value).ok()?;
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{EntityKind, EventStatus, ScalarField};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn resolver(db: &Database) -> ConflictResolver<'_> {
        ConflictResolver::new(db.connection(), "dev-a".to_string())
    }

    fn snapshot(id: &str, updated_at: i64) -> EntitySnapshot {
        EntitySnapshot {
            id: id.to_string(),
            kind: EntityKind::Item,
            name: "Washers".to_string(),
            code: Some("WASH-M8".to_string()),
            parent_id: None,
            category_id: None,
            quantity: 10,
            price_cents: Some(5),
            notes: None,
            updated_at,
        }
    }

    fn insert(db: &Database, record: &ConflictRecord) {
        assert!(SqliteConflictRepository::new(db.connection())
            .insert_if_absent(record)
            .unwrap());
    }

    fn pending_events(db: &Database) -> Vec<MutationEvent> {
        let queue = SqliteEventQueue::new(db.connection());
        queue.next_batch(i64::MAX, 100).unwrap()
    }

    #[test]
    fn test_auto_remote_delete_wins() {
        let db = setup();
        let entities = SqliteEntityRepository::new(db.connection());
        entities
            .upsert(&CachedEntity {
                snapshot: snapshot("e1", 200),
                sync_status: SyncStatus::Pending,
                is_offline: false,
            })
            .unwrap();

        // Local updated, remote deleted
        let record = ConflictRecord::new(
            ConflictKind::DeleteUpdate,
            EntityKind::Item,
            "e1",
            Some(snapshot("e1", 200)),
            None,
            Some(snapshot("e1", 100)),
            200,
            250,
        );
        insert(&db, &record);

        let applied = resolver(&db).resolve_automatically(&record, 300).unwrap();
        assert_eq!(applied, Some(Resolution::Remote));

        // The deletion propagated locally; nothing left to push
        assert!(entities.get(EntityKind::Item, "e1").unwrap().is_none());
        assert!(pending_events(&db).is_empty());
        let resolved = SqliteConflictRepository::new(db.connection())
            .get(&record.id)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.resolved_by.as_deref(), Some("auto"));
    }

    #[test]
    fn test_auto_local_delete_wins_and_pushes() {
        let db = setup();

        // Local deleted, remote updated
        let record = ConflictRecord::new(
            ConflictKind::DeleteUpdate,
            EntityKind::Item,
            "e1",
            None,
            Some(snapshot("e1", 250)),
            Some(snapshot("e1", 100)),
            200,
            250,
        );
        insert(&db, &record);

        let applied = resolver(&db).resolve_automatically(&record, 300).unwrap();
        assert_eq!(applied, Some(Resolution::Local));

        // One delete event based on the current remote state
        let events = pending_events(&db);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MutationKind::Delete);
        assert_eq!(events[0].prior.as_ref().unwrap().updated_at, 250);
    }

    #[test]
    fn test_auto_merge_disjoint_fields() {
        let db = setup();

        let base = snapshot("e1", 100);
        let mut local = base.clone();
        local.quantity = 12;
        local.updated_at = 200;
        let mut remote = base.clone();
        remote.notes = Some("restocked".to_string());
        remote.updated_at = 250;

        let record = ConflictRecord::new(
            ConflictKind::UpdateUpdate,
            EntityKind::Item,
            "e1",
            Some(local),
            Some(remote),
            Some(base),
            200,
            250,
        );
        insert(&db, &record);

        let applied = resolver(&db).resolve_automatically(&record, 300).unwrap();
        assert_eq!(applied, Some(Resolution::Merge));

        let entities = SqliteEntityRepository::new(db.connection());
        let merged = entities.get(EntityKind::Item, "e1").unwrap().unwrap();
        assert_eq!(merged.snapshot.quantity, 12);
        assert_eq!(merged.snapshot.notes.as_deref(), Some("restocked"));
        assert_eq!(merged.snapshot.updated_at, 300);
        assert_eq!(merged.sync_status, SyncStatus::Pending);

        let events = pending_events(&db);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MutationKind::Update);
        // The push's base is the current remote state
        assert_eq!(events[0].prior.as_ref().unwrap().updated_at, 250);
    }

    #[test]
    fn test_auto_merge_same_field_later_wins() {
        let base = snapshot("e1", 100);
        let mut local = base.clone();
        local.quantity = 12;
        let mut remote = base.clone();
        remote.quantity = 3;

        let merged = three_way_merge(&base, &local, &remote, 200, 250).unwrap();
        assert_eq!(merged.quantity, 3);

        let merged = three_way_merge(&base, &local, &remote, 300, 250).unwrap();
        assert_eq!(merged.quantity, 12);

        // A tie cannot be arbitrated
        assert!(three_way_merge(&base, &local, &remote, 250, 250).is_none());
    }

    #[test]
    fn test_auto_leaves_move_move_open() {
        let db = setup();

        let base = snapshot("e1", 100);
        let mut local = base.clone();
        local.parent_id = Some("bin-2".to_string());
        let mut remote = base.clone();
        remote.parent_id = Some("bin-3".to_string());

        let record = ConflictRecord::new(
            ConflictKind::MoveMove,
            EntityKind::Item,
            "e1",
            Some(local),
            Some(remote),
            Some(base),
            200,
            250,
        );
        insert(&db, &record);

        assert_eq!(resolver(&db).resolve_automatically(&record, 300).unwrap(), None);
        assert!(!SqliteConflictRepository::new(db.connection())
            .get(&record.id)
            .unwrap()
            .unwrap()
            .is_resolved());
    }

    #[test]
    fn test_auto_update_update_without_base_stays_open() {
        let db = setup();

        let mut local = snapshot("e1", 200);
        local.quantity = 12;
        let record = ConflictRecord::new(
            ConflictKind::UpdateUpdate,
            EntityKind::Item,
            "e1",
            Some(local),
            Some(snapshot("e1", 250)),
            None,
            200,
            250,
        );
        insert(&db, &record);

        assert_eq!(resolver(&db).resolve_automatically(&record, 300).unwrap(), None);
    }

    #[test]
    fn test_manual_local_wholesale() {
        let db = setup();

        let mut local = snapshot("e1", 200);
        local.quantity = 12;
        let record = ConflictRecord::new(
            ConflictKind::MoveMove,
            EntityKind::Item,
            "e1",
            Some(local),
            Some(snapshot("e1", 250)),
            Some(snapshot("e1", 100)),
            200,
            250,
        );
        insert(&db, &record);

        let resolved = resolver(&db)
            .resolve_manually(&record.id, &ResolutionStrategy::Local, "user-1", 300)
            .unwrap();
        assert_eq!(resolved.resolution, Some(Resolution::Local));
        assert_eq!(resolved.resolved_by.as_deref(), Some("user-1"));

        let entities = SqliteEntityRepository::new(db.connection());
        let kept = entities.get(EntityKind::Item, "e1").unwrap().unwrap();
        assert_eq!(kept.snapshot.quantity, 12);
        assert_eq!(kept.sync_status, SyncStatus::Pending);

        let events = pending_events(&db);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MutationKind::Move);
    }

    #[test]
    fn test_manual_merge_selection_all_or_nothing() {
        let db = setup();

        let base = snapshot("e1", 100);
        let mut local = base.clone();
        local.quantity = 12;
        local.name = "Washers M8".to_string();
        let mut remote = base.clone();
        remote.quantity = 3;
        remote.notes = Some("restocked".to_string());

        let record = ConflictRecord::new(
            ConflictKind::UpdateUpdate,
            EntityKind::Item,
            "e1",
            Some(local),
            Some(remote),
            Some(base),
            200,
            200,
        );
        insert(&db, &record);
        let resolver = resolver(&db);

        // Diverging: name, quantity, notes. An incomplete selection fails.
        let partial: BTreeMap<_, _> = [(ScalarField::Quantity, MergeSide::Local)].into();
        assert!(resolver
            .resolve_manually(&record.id, &ResolutionStrategy::Merge(partial), "user-1", 300)
            .is_err());

        // A stray non-diverging field fails
        let stray: BTreeMap<_, _> = [
            (ScalarField::Name, MergeSide::Local),
            (ScalarField::Quantity, MergeSide::Local),
            (ScalarField::Notes, MergeSide::Remote),
            (ScalarField::Code, MergeSide::Remote),
        ]
        .into();
        assert!(resolver
            .resolve_manually(&record.id, &ResolutionStrategy::Merge(stray), "user-1", 300)
            .is_err());

        // Nothing was applied by the failed attempts
        assert!(!SqliteConflictRepository::new(db.connection())
            .get(&record.id)
            .unwrap()
            .unwrap()
            .is_resolved());

        let complete: BTreeMap<_, _> = [
            (ScalarField::Name, MergeSide::Local),
            (ScalarField::Quantity, MergeSide::Remote),
            (ScalarField::Notes, MergeSide::Remote),
        ]
        .into();
        resolver
            .resolve_manually(&record.id, &ResolutionStrategy::Merge(complete), "user-1", 300)
            .unwrap();

        let entities = SqliteEntityRepository::new(db.connection());
        let merged = entities.get(EntityKind::Item, "e1").unwrap().unwrap();
        assert_eq!(merged.snapshot.name, "Washers M8");
        assert_eq!(merged.snapshot.quantity, 3);
        assert_eq!(merged.snapshot.notes.as_deref(), Some("restocked"));
    }

    #[test]
    fn test_manual_rejects_resolved_or_missing() {
        let db = setup();

        let record = ConflictRecord::new(
            ConflictKind::UpdateUpdate,
            EntityKind::Item,
            "e1",
            Some(snapshot("e1", 200)),
            Some(snapshot("e1", 250)),
            None,
            200,
            250,
        );
        insert(&db, &record);
        let resolver = resolver(&db);

        resolver
            .resolve_manually(&record.id, &ResolutionStrategy::Remote, "user-1", 300)
            .unwrap();
        assert!(resolver
            .resolve_manually(&record.id, &ResolutionStrategy::Local, "user-1", 400)
            .is_err());
        assert!(resolver
            .resolve_manually("missing", &ResolutionStrategy::Local, "user-1", 400)
            .is_err());
    }

    #[test]
    fn test_create_create_remote_wins_maps_identity() {
        let db = setup();
        let entities = SqliteEntityRepository::new(db.connection());
        let queue = SqliteEventQueue::new(db.connection());

        let offline_id = ids::generate_offline_id(EntityKind::Item);
        let local = snapshot(&offline_id, 200);
        entities
            .upsert(&CachedEntity {
                snapshot: local.clone(),
                sync_status: SyncStatus::OfflineOnly,
                is_offline: true,
            })
            .unwrap();
        queue
            .enqueue(&MutationEvent::new(
                MutationKind::Create,
                local.clone(),
                None,
                "dev-a",
            ))
            .unwrap();

        let record = ConflictRecord::new(
            ConflictKind::CreateCreate,
            EntityKind::Item,
            offline_id.clone(),
            Some(local),
            Some(snapshot("real-1", 250)),
            None,
            200,
            250,
        );
        insert(&db, &record);

        resolver(&db)
            .resolve_manually(&record.id, &ResolutionStrategy::Remote, "user-1", 300)
            .unwrap();

        // The offline identity is retired in favor of the remote record
        assert!(entities.get(EntityKind::Item, &offline_id).unwrap().is_none());
        let kept = entities.get(EntityKind::Item, "real-1").unwrap().unwrap();
        assert_eq!(kept.sync_status, SyncStatus::Synced);
        assert!(IdVirtualizer::new(db.connection())
            .get(&offline_id)
            .unwrap()
            .is_some());

        // The superseded create event is gone
        assert!(pending_events(&db).is_empty());
        assert!(queue.failed().unwrap().is_empty());
    }

    #[test]
    fn test_resolution_clears_blocked_events() {
        let db = setup();
        let queue = SqliteEventQueue::new(db.connection());

        let blocked = MutationEvent::new(
            MutationKind::Update,
            snapshot("e1", 200),
            Some(snapshot("e1", 100)),
            "dev-a",
        );
        queue.enqueue(&blocked).unwrap();
        queue.mark_conflicted(&blocked.id, "conflict: update_update").unwrap();

        let record = ConflictRecord::new(
            ConflictKind::UpdateUpdate,
            EntityKind::Item,
            "e1",
            Some(snapshot("e1", 200)),
            Some(snapshot("e1", 250)),
            None,
            200,
            250,
        );
        insert(&db, &record);

        resolver(&db)
            .resolve_manually(&record.id, &ResolutionStrategy::Remote, "user-1", 300)
            .unwrap();

        // The conflicted event no longer blocks the entity
        assert!(queue.failed().unwrap().is_empty());
        assert_eq!(queue.get(&blocked.id).unwrap(), None);

        // And the entity sits at the adopted remote state
        let entities = SqliteEntityRepository::new(db.connection());
        let adopted = entities.get(EntityKind::Item, "e1").unwrap().unwrap();
        assert_eq!(adopted.snapshot.updated_at, 250);
        assert_eq!(adopted.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn test_local_update_wins_over_remote_delete_recreates() {
        let db = setup();

        let mut local = snapshot("e1", 200);
        local.quantity = 12;
        let record = ConflictRecord::new(
            ConflictKind::DeleteUpdate,
            EntityKind::Item,
            "e1",
            Some(local),
            None,
            Some(snapshot("e1", 100)),
            200,
            0,
        );
        insert(&db, &record);

        // The user overrides the deleted-side-wins default
        resolver(&db)
            .resolve_manually(&record.id, &ResolutionStrategy::Local, "user-1", 300)
            .unwrap();

        let events = pending_events(&db);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MutationKind::Create);
        assert_eq!(events[0].payload.quantity, 12);
        assert!(events[0].prior.is_none());

        let status = SqliteEventQueue::new(db.connection())
            .get(&events[0].id)
            .unwrap()
            .unwrap()
            .status;
        assert_eq!(status, EventStatus::Pending);
    }
}
