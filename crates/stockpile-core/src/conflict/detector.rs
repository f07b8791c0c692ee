//! Conflict detection.
//!
//! A conflict exists when the remote record diverged from the base snapshot a
//! queued event was recorded against. Classification is a pure function of
//! the event and the current remote state; materializing the record goes
//! through [`ConflictDetector`], which enforces at most one open record per
//! entity.

use rusqlite::Connection;

use crate::db::{ConflictRepository, EventQueue, SqliteConflictRepository, SqliteEventQueue};
use crate::error::Result;
use crate::ids;
use crate::models::{
    ConflictKind, ConflictRecord, EntityKind, EntitySnapshot, MutationEvent, MutationKind,
};
use crate::remote::RemoteService;

/// Classify the divergence between a queued event and the current remote
/// state, if any.
///
/// `remote` is the authoritative record for the event's entity: looked up by
/// natural key for creates, by id otherwise. Returns `None` when the event
/// can be pushed as-is.
#[must_use]
pub fn classify(event: &MutationEvent, remote: Option<&EntitySnapshot>) -> Option<ConflictKind> {
    match event.kind {
        // A create collides when the remote already holds a record with the
        // same natural key under a different identity.
        MutationKind::Create => match remote {
            Some(existing) if existing.id != event.entity_id => Some(ConflictKind::CreateCreate),
            _ => None,
        },
        MutationKind::Update | MutationKind::Move | MutationKind::Delete => {
            // Without a base snapshot there is nothing to compare against
            let base = event.prior.as_ref()?;
            match remote {
                // Remote unchanged since the base: clean fast-forward
                Some(current) if current.updated_at == base.updated_at => None,
                Some(current) => {
                    if event.kind == MutationKind::Delete {
                        return Some(ConflictKind::DeleteUpdate);
                    }
                    let local_moved = event.payload.parent_id != base.parent_id;
                    let remote_moved = current.parent_id != base.parent_id;
                    if local_moved && remote_moved && current.parent_id != event.payload.parent_id
                    {
                        Some(ConflictKind::MoveMove)
                    } else {
                        Some(ConflictKind::UpdateUpdate)
                    }
                }
                None => {
                    // Both sides deleted: the intents agree
                    if event.kind == MutationKind::Delete {
                        None
                    } else {
                        Some(ConflictKind::DeleteUpdate)
                    }
                }
            }
        }
    }
}

/// Detects divergence between queued events and remote state and materializes
/// conflict records.
pub struct ConflictDetector<'a, R> {
    conn: &'a Connection,
    remote: &'a R,
}

impl<'a, R: RemoteService> ConflictDetector<'a, R> {
    /// Create a detector over the given connection and remote service
    pub const fn new(conn: &'a Connection, remote: &'a R) -> Self {
        Self { conn, remote }
    }

    /// Classify `event` against `remote` and persist a conflict record when
    /// they diverge. Returns the open record (newly inserted or pre-existing)
    /// or `None` when the event is pushable.
    pub fn record(
        &self,
        event: &MutationEvent,
        remote: Option<&EntitySnapshot>,
        now: i64,
    ) -> Result<Option<ConflictRecord>> {
        let Some(kind) = classify(event, remote) else {
            return Ok(None);
        };

        // The local side of a delete intent is an absence
        let local = if event.kind == MutationKind::Delete {
            None
        } else {
            Some(event.payload.clone())
        };
        let record = ConflictRecord::new(
            kind,
            event.entity_kind,
            event.entity_id.clone(),
            local,
            remote.cloned(),
            event.prior.clone(),
            event.payload.updated_at,
            remote.map_or(now, |snapshot| snapshot.updated_at),
        );

        let conflicts = SqliteConflictRepository::new(self.conn);
        if conflicts.insert_if_absent(&record)? {
            return Ok(Some(record));
        }
        conflicts.open_for(record.entity_kind, &record.entity_id)
    }

    /// Check one entity's oldest unsynced event against remote state,
    /// recording a conflict if they diverge.
    pub async fn check_entity(
        &self,
        kind: EntityKind,
        entity_id: &str,
        now: i64,
    ) -> Result<Option<ConflictRecord>> {
        let conflicts = SqliteConflictRepository::new(self.conn);
        if let Some(open) = conflicts.open_for(kind, entity_id)? {
            return Ok(Some(open));
        }

        let Some(event) = oldest_unsynced_event(self.conn, entity_id)? else {
            return Ok(None);
        };

        let remote = self.fetch_remote(&event).await?;
        self.record(&event, remote.as_ref(), now)
    }

    /// Sweep every entity with unsynced events, recording conflicts for all
    /// detected divergences. Returns the open records found by this sweep.
    pub async fn detect_all(&self, now: i64) -> Result<Vec<ConflictRecord>> {
        let mut found = Vec::new();
        for (kind, entity_id) in unsynced_entities(self.conn)? {
            if let Some(record) = self.check_entity(kind, &entity_id, now).await? {
                found.push(record);
            }
        }
        Ok(found)
    }

    /// All unresolved conflicts, oldest first
    pub fn unresolved(&self) -> Result<Vec<ConflictRecord>> {
        SqliteConflictRepository::new(self.conn).unresolved()
    }

    /// Look up the remote side for an event: by natural key for creates, by
    /// id otherwise. An offline-form id is unknowable to the remote service,
    /// so it never hits the wire.
    async fn fetch_remote(&self, event: &MutationEvent) -> Result<Option<EntitySnapshot>> {
        let remote = match event.kind {
            MutationKind::Create => match &event.payload.code {
                Some(code) => self.remote.find_by_code(event.entity_kind, code).await?,
                None => None,
            },
            _ if ids::is_offline_id(&event.entity_id) => None,
            _ => self.remote.fetch(event.entity_kind, &event.entity_id).await?,
        };
        Ok(remote)
    }
}

fn oldest_unsynced_event(conn: &Connection, entity_id: &str) -> Result<Option<MutationEvent>> {
    let queue = SqliteEventQueue::new(conn);
    queue.oldest_unsynced_for(entity_id)
}

fn unsynced_entities(conn: &Connection) -> Result<Vec<(EntityKind, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT entity_kind, entity_id FROM sync_events
         WHERE status != 'synced'
         ORDER BY entity_kind, entity_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(kind, id)| Ok((kind.parse()?, id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{EntityKind, EventStatus};
    use crate::remote::MemoryRemoteService;

    fn snapshot(id: &str, updated_at: i64) -> EntitySnapshot {
        EntitySnapshot {
            id: id.to_string(),
            kind: EntityKind::Item,
            name: "Washers".to_string(),
            code: Some("WASH-M8".to_string()),
            parent_id: Some("bin-1".to_string()),
            category_id: None,
            quantity: 10,
            price_cents: None,
            notes: None,
            updated_at,
        }
    }

    fn update_event(payload: EntitySnapshot, prior: EntitySnapshot) -> MutationEvent {
        MutationEvent::new(MutationKind::Update, payload, Some(prior), "dev-a")
    }

    #[test]
    fn test_classify_fast_forward() {
        let base = snapshot("e1", 100);
        let mut local = base.clone();
        local.quantity = 12;
        local.updated_at = 200;
        let event = update_event(local, base.clone());

        // Remote still at the base: no conflict
        assert_eq!(classify(&event, Some(&base)), None);
    }

    #[test]
    fn test_classify_update_update() {
        let base = snapshot("e1", 100);
        let mut local = base.clone();
        local.quantity = 12;
        local.updated_at = 200;
        let mut remote = base.clone();
        remote.name = "Washers M8".to_string();
        remote.updated_at = 250;

        let event = update_event(local, base);
        assert_eq!(
            classify(&event, Some(&remote)),
            Some(ConflictKind::UpdateUpdate)
        );
    }

    #[test]
    fn test_classify_delete_update_both_directions() {
        let base = snapshot("e1", 100);
        let mut remote = base.clone();
        remote.quantity = 3;
        remote.updated_at = 250;

        // Local delete vs remote update
        let delete = MutationEvent::new(
            MutationKind::Delete,
            base.clone(),
            Some(base.clone()),
            "dev-a",
        );
        assert_eq!(
            classify(&delete, Some(&remote)),
            Some(ConflictKind::DeleteUpdate)
        );

        // Local update vs remote delete
        let mut local = base.clone();
        local.quantity = 12;
        local.updated_at = 200;
        let update = update_event(local, base.clone());
        assert_eq!(classify(&update, None), Some(ConflictKind::DeleteUpdate));

        // Both deleted: intents agree
        assert_eq!(classify(&delete, None), None);
    }

    #[test]
    fn test_classify_move_move() {
        let base = snapshot("e1", 100);
        let mut local = base.clone();
        local.parent_id = Some("bin-2".to_string());
        local.updated_at = 200;
        let mut remote = base.clone();
        remote.parent_id = Some("bin-3".to_string());
        remote.updated_at = 250;

        let event = MutationEvent::new(MutationKind::Move, local, Some(base.clone()), "dev-a");
        assert_eq!(classify(&event, Some(&remote)), Some(ConflictKind::MoveMove));

        // Same destination: ordinary update-update, both picked the same shelf
        let mut agreeing = base;
        agreeing.parent_id = Some("bin-2".to_string());
        agreeing.updated_at = 250;
        assert_eq!(
            classify(&event, Some(&agreeing)),
            Some(ConflictKind::UpdateUpdate)
        );
    }

    #[test]
    fn test_classify_create_create() {
        let offline_id = ids::generate_offline_id(EntityKind::Item);
        let local = snapshot(&offline_id, 200);
        let event = MutationEvent::new(MutationKind::Create, local, None, "dev-a");

        let remote = snapshot("real-1", 150);
        assert_eq!(
            classify(&event, Some(&remote)),
            Some(ConflictKind::CreateCreate)
        );
        assert_eq!(classify(&event, None), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_detect_all_records_one_open_conflict() {
        let db = Database::open_in_memory().unwrap();
        let remote = MemoryRemoteService::new();
        let detector = ConflictDetector::new(db.connection(), &remote);

        let base = snapshot("e1", 100);
        let mut remote_state = base.clone();
        remote_state.quantity = 3;
        remote_state.updated_at = 250;
        remote.put(remote_state);

        let mut local = base.clone();
        local.quantity = 12;
        local.updated_at = 200;
        let queue = SqliteEventQueue::new(db.connection());
        queue.enqueue(&update_event(local, base)).unwrap();

        let found = detector.detect_all(300).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ConflictKind::UpdateUpdate);
        assert_eq!(found[0].remote_updated_at, 250);

        // A second sweep reuses the open record instead of inserting another
        let again = detector.detect_all(400).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, found[0].id);
        assert_eq!(detector.unresolved().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_check_entity_without_events_is_clean() {
        let db = Database::open_in_memory().unwrap();
        let remote = MemoryRemoteService::new();
        let detector = ConflictDetector::new(db.connection(), &remote);

        let record = detector
            .check_entity(EntityKind::Item, "e1", 100)
            .await
            .unwrap();
        assert!(record.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_keeps_event_base() {
        let db = Database::open_in_memory().unwrap();
        let remote = MemoryRemoteService::new();
        let detector = ConflictDetector::new(db.connection(), &remote);

        let base = snapshot("e1", 100);
        let mut local = base.clone();
        local.quantity = 12;
        local.updated_at = 200;
        let mut remote_state = base.clone();
        remote_state.quantity = 3;
        remote_state.updated_at = 250;

        let event = update_event(local.clone(), base.clone());
        let record = detector
            .record(&event, Some(&remote_state), 300)
            .unwrap()
            .unwrap();

        assert_eq!(record.base, Some(base));
        assert_eq!(record.local, Some(local));
        assert_eq!(record.remote, Some(remote_state));
        assert_eq!(event.status, EventStatus::Pending);
    }
}
