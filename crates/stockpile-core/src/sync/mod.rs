//! Background sync engine.
//!
//! A sync pass drains the queue in per-entity order, pushing each event to
//! the remote service. Divergence becomes a conflict record and blocks the
//! entity; transient failures reschedule the event with backoff; everything
//! else the pass never touches. The pass is cancel-safe: every state change
//! is durable, and a crashed pass leaves at most Syncing markers that the
//! next pass resets.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::config::CoreConfig;
use crate::conflict::{ConflictDetector, ConflictResolver};
use crate::db::{
    ConflictRepository, EntityRepository, EventQueue, SettingsRepository,
    SqliteConflictRepository, SqliteEntityRepository, SqliteEventQueue, SqliteSettingsRepository,
};
use crate::error::{Error, Result};
use crate::ids::{self, IdVirtualizer};
use crate::models::{
    CachedEntity, ConflictRecord, EntitySnapshot, EventStatus, MutationEvent, MutationKind,
    SyncStatus,
};
use crate::remote::{RemoteError, RemoteService};
use crate::util::unix_timestamp_ms;

/// Connectivity inputs for sync and lookup decisions.
///
/// The user's forced-offline switch always beats the network signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connectivity {
    /// Whether the network currently looks reachable
    pub online: bool,
    /// Whether the user forced the app offline
    pub forced_offline: bool,
}

impl Connectivity {
    /// Whether remote calls are allowed right now
    #[must_use]
    pub const fn effective_online(&self) -> bool {
        self.online && !self.forced_offline
    }
}

/// Counters from one sync pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// Events acknowledged by the remote
    pub synced: usize,
    /// Events rescheduled or gone terminal after a failure
    pub failed: usize,
    /// Conflicts detected by this pass
    pub conflicts: usize,
    /// Conflicts resolved without user input
    pub auto_resolved: usize,
    /// Events not attempted (offline, blocked entity, unmet dependency)
    pub skipped: usize,
}

/// A point-in-time view of the sync state, for status surfaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatusReport {
    /// Events waiting to sync
    pub pending: usize,
    /// Terminal failures awaiting attention
    pub failed: Vec<MutationEvent>,
    /// Unresolved conflicts, oldest first
    pub conflicts: Vec<ConflictRecord>,
    /// When the last pass finished (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Whether the user forced the app offline
    pub forced_offline: bool,
}

enum PushOutcome {
    /// Remote acknowledged; carries the authoritative snapshot for upserts
    Applied(Option<EntitySnapshot>),
    /// Divergence recorded; the entity is blocked until resolution
    Conflicted(ConflictRecord),
    /// Transient or server failure; retry with backoff
    Retry(String),
}

/// Drives queue draining, conflict handling, and retention maintenance
pub struct SyncEngine<'a, R> {
    conn: &'a Connection,
    remote: &'a R,
    config: CoreConfig,
}

impl<'a, R: RemoteService> SyncEngine<'a, R> {
    /// Create an engine over the given connection and remote service
    pub const fn new(conn: &'a Connection, remote: &'a R, config: CoreConfig) -> Self {
        Self { conn, remote, config }
    }

    /// Run one full sync pass. `online` is the caller's network signal; the
    /// persisted forced-offline switch is honored on top of it.
    pub async fn sync_pass(&self, online: bool) -> Result<SyncSummary> {
        let settings = SqliteSettingsRepository::new(self.conn);
        let queue = SqliteEventQueue::new(self.conn);
        let mut summary = SyncSummary::default();

        let connectivity = Connectivity {
            online,
            forced_offline: settings.forced_offline()?,
        };
        if !connectivity.effective_online() {
            summary.skipped = queue.pending_count()?;
            tracing::debug!(
                forced_offline = connectivity.forced_offline,
                skipped = summary.skipped,
                "sync pass skipped while offline"
            );
            return Ok(summary);
        }

        let reset = queue.reset_stuck()?;
        if reset > 0 {
            tracing::warn!(reset, "reset events stuck from a cancelled pass");
        }

        let now = unix_timestamp_ms();
        self.drain_queue(now, &mut summary).await?;

        // Try to clear open conflicts without user input
        let resolver = ConflictResolver::new(self.conn, settings.device_id()?);
        for record in SqliteConflictRepository::new(self.conn).unresolved()? {
            if resolver.resolve_automatically(&record, now)?.is_some() {
                summary.auto_resolved += 1;
            }
        }

        self.run_maintenance(now)?;
        settings.set_last_sync_at(now)?;
        tracing::info!(
            synced = summary.synced,
            failed = summary.failed,
            conflicts = summary.conflicts,
            auto_resolved = summary.auto_resolved,
            skipped = summary.skipped,
            "sync pass finished"
        );
        Ok(summary)
    }

    /// Current queue and conflict state, for status commands
    pub fn status(&self) -> Result<SyncStatusReport> {
        let queue = SqliteEventQueue::new(self.conn);
        let settings = SqliteSettingsRepository::new(self.conn);
        Ok(SyncStatusReport {
            pending: queue.pending_count()?,
            failed: queue.failed()?,
            conflicts: SqliteConflictRepository::new(self.conn).unresolved()?,
            last_sync_at: settings.last_sync_at()?,
            forced_offline: settings.forced_offline()?,
        })
    }

    /// Drain the queue in rounds until nothing makes progress.
    ///
    /// Within a round, events are processed one at a time and the queue is
    /// re-read after each so identifier rewrites from a confirmed mapping
    /// are visible to the events that follow. An event deferred behind an
    /// unsynced reference gets another round once its dependency lands.
    async fn drain_queue(&self, now: i64, summary: &mut SyncSummary) -> Result<()> {
        let queue = SqliteEventQueue::new(self.conn);
        while self.drain_round(&queue, now, summary).await? {}
        // Whatever is still eligible was deferred or blocked this pass
        summary.skipped = queue.next_batch(now, 10_000)?.len();
        Ok(())
    }

    /// One round over the eligible events; returns whether any event was
    /// acknowledged or went to conflict.
    async fn drain_round(
        &self,
        queue: &SqliteEventQueue<'_>,
        now: i64,
        summary: &mut SyncSummary,
    ) -> Result<bool> {
        let mut attempted: HashSet<String> = HashSet::new();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut progressed = false;

        loop {
            let batch = queue.next_batch(now, self.config.batch_size)?;
            let Some(event) = batch
                .into_iter()
                .find(|event| !attempted.contains(&event.id))
            else {
                break;
            };
            attempted.insert(event.id.clone());

            if blocked.contains(&event.entity_id) {
                continue;
            }
            if let Some(missing) = self.unmet_dependency(&event)? {
                // The referenced entity has not synced yet; this event stays
                // pending behind it.
                tracing::debug!(
                    event_id = event.id,
                    reference = missing,
                    "deferring event behind an unsynced reference"
                );
                blocked.insert(event.entity_id.clone());
                continue;
            }

            queue.mark_syncing(&event.id)?;
            match self.push_event(&event, now).await? {
                PushOutcome::Applied(remote) => {
                    self.confirm(&event, remote, now)?;
                    queue.mark_synced(&event.id)?;
                    summary.synced += 1;
                    progressed = true;
                }
                PushOutcome::Conflicted(record) => {
                    queue.mark_conflicted(
                        &event.id,
                        &format!("conflict: {}", record.kind.as_str()),
                    )?;
                    blocked.insert(event.entity_id.clone());
                    summary.conflicts += 1;
                    progressed = true;
                }
                PushOutcome::Retry(error) => {
                    let status = queue.mark_failed(
                        &event.id,
                        &error,
                        self.config.max_retries,
                        self.config.backoff_base_secs,
                        now,
                    )?;
                    if status == EventStatus::Failed {
                        blocked.insert(event.entity_id.clone());
                    }
                    summary.failed += 1;
                }
            }
        }
        Ok(progressed)
    }

    /// Push one event to the remote service
    async fn push_event(&self, event: &MutationEvent, now: i64) -> Result<PushOutcome> {
        match event.kind {
            MutationKind::Create => {
                // A natural-key collision comes back as a server conflict
                // and classifies on recheck; a replayed create is absorbed
                // by the idempotency key instead.
                match self.remote.create(&event.payload, &event.id).await {
                    Ok(created) => Ok(PushOutcome::Applied(Some(created))),
                    Err(RemoteError::Conflict { .. }) => self.recheck(event, now).await,
                    Err(e) => Ok(PushOutcome::Retry(e.to_string())),
                }
            }
            MutationKind::Update | MutationKind::Move => {
                let current = match self.remote.fetch(event.entity_kind, &event.entity_id).await {
                    Ok(current) => current,
                    Err(e) => return Ok(PushOutcome::Retry(e.to_string())),
                };
                let base = event.prior.as_ref().map(|prior| prior.updated_at);
                match (&current, base) {
                    (None, _) => return self.record_conflict(event, None, now),
                    (Some(current), Some(base)) if current.updated_at != base => {
                        return self.record_conflict(event, Some(current), now);
                    }
                    _ => {}
                }
                let base = base.or_else(|| current.map(|c| c.updated_at)).unwrap_or(0);
                match self.remote.update(&event.payload, base).await {
                    Ok(updated) => Ok(PushOutcome::Applied(Some(updated))),
                    Err(RemoteError::Conflict { .. }) => self.recheck(event, now).await,
                    Err(e) => Ok(PushOutcome::Retry(e.to_string())),
                }
            }
            MutationKind::Delete => {
                let current = match self.remote.fetch(event.entity_kind, &event.entity_id).await {
                    Ok(current) => current,
                    Err(e) => return Ok(PushOutcome::Retry(e.to_string())),
                };
                let Some(current) = current else {
                    // Already gone; the intents agree
                    return Ok(PushOutcome::Applied(None));
                };
                let base = event.prior.as_ref().map(|prior| prior.updated_at);
                if base.is_some_and(|base| current.updated_at != base) {
                    return self.record_conflict(event, Some(&current), now);
                }
                let base = base.unwrap_or(current.updated_at);
                match self
                    .remote
                    .delete(event.entity_kind, &event.entity_id, base)
                    .await
                {
                    Ok(()) => Ok(PushOutcome::Applied(None)),
                    Err(RemoteError::Conflict { .. }) => self.recheck(event, now).await,
                    Err(e) => Ok(PushOutcome::Retry(e.to_string())),
                }
            }
        }
    }

    /// Settle local state after the remote acknowledged an event
    fn confirm(&self, event: &MutationEvent, remote: Option<EntitySnapshot>, now: i64) -> Result<()> {
        let entities = SqliteEntityRepository::new(self.conn);
        if event.kind == MutationKind::Delete {
            entities.delete(event.entity_kind, &event.entity_id)?;
            return Ok(());
        }

        let Some(snapshot) = remote else {
            return Ok(());
        };
        if ids::is_offline_id(&event.entity_id) {
            IdVirtualizer::new(self.conn).create_mapping(
                &event.entity_id,
                &snapshot.id,
                event.entity_kind,
                now,
            )?;
        }

        // Never clobber a local edit made since this event was recorded
        let newer_local = entities
            .get(snapshot.kind, &snapshot.id)?
            .is_some_and(|current| current.snapshot.updated_at > snapshot.updated_at);
        if !newer_local {
            entities.upsert(&CachedEntity {
                snapshot,
                sync_status: SyncStatus::Synced,
                is_offline: false,
            })?;
        }
        Ok(())
    }

    /// Record a conflict against known remote state
    fn record_conflict(
        &self,
        event: &MutationEvent,
        remote: Option<&EntitySnapshot>,
        now: i64,
    ) -> Result<PushOutcome> {
        let detector = ConflictDetector::new(self.conn, self.remote);
        match detector.record(event, remote, now)? {
            Some(record) => Ok(PushOutcome::Conflicted(record)),
            // Classification found no divergence after all; try again later
            None => Ok(PushOutcome::Retry("remote state changed during push".to_string())),
        }
    }

    /// The remote rejected a write we believed was clean; re-fetch and
    /// classify the divergence.
    async fn recheck(&self, event: &MutationEvent, now: i64) -> Result<PushOutcome> {
        let detector = ConflictDetector::new(self.conn, self.remote);
        match detector
            .check_entity(event.entity_kind, &event.entity_id, now)
            .await
        {
            Ok(Some(record)) => Ok(PushOutcome::Conflicted(record)),
            Ok(None) => Ok(PushOutcome::Retry("remote state changed during push".to_string())),
            Err(Error::Network(e)) => Ok(PushOutcome::Retry(e)),
            Err(e) => Err(e),
        }
    }

    /// An offline-form reference that has no confirmed mapping yet. The
    /// event's own identity is exempt for creates, which is what earns the
    /// mapping.
    fn unmet_dependency(&self, event: &MutationEvent) -> Result<Option<String>> {
        let virtualizer = IdVirtualizer::new(self.conn);
        let mut references = vec![];
        if event.kind != MutationKind::Create {
            references.push(&event.payload.id);
        }
        references.extend(event.payload.parent_id.iter());
        references.extend(event.payload.category_id.iter());

        for reference in references {
            if ids::is_offline_id(reference) && virtualizer.resolve_id(reference)? == *reference {
                return Ok(Some(reference.clone()));
            }
        }
        Ok(None)
    }

    /// Retention sweeps after a pass: synced events, confirmed mappings, and
    /// resolved conflict records all age out.
    fn run_maintenance(&self, now: i64) -> Result<()> {
        let days = self.config.retention_days;
        let purged_events = SqliteEventQueue::new(self.conn).cleanup(days, now)?;
        let purged_mappings = IdVirtualizer::new(self.conn).cleanup_old_mappings(days, now)?;
        let purged_conflicts =
            SqliteConflictRepository::new(self.conn).purge_resolved(days, now)?;
        if purged_events + purged_mappings + purged_conflicts > 0 {
            tracing::debug!(
                purged_events,
                purged_mappings,
                purged_conflicts,
                "retention maintenance"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::inventory::{EntityDraft, Inventory};
    use crate::models::{ConflictKind, EntityKind};
    use crate::remote::MemoryRemoteService;
    use pretty_assertions::assert_eq;

    fn setup() -> (Database, MemoryRemoteService) {
        (Database::open_in_memory().unwrap(), MemoryRemoteService::new())
    }

    fn engine<'a>(db: &'a Database, remote: &'a MemoryRemoteService) -> SyncEngine<'a, MemoryRemoteService> {
        SyncEngine::new(db.connection(), remote, CoreConfig::default())
    }

    fn inventory(db: &Database) -> Inventory<'_> {
        Inventory::new(db.connection(), "dev-a".to_string())
    }

    fn remote_snapshot(id: &str, updated_at: i64) -> EntitySnapshot {
        EntitySnapshot {
            id: id.to_string(),
            kind: EntityKind::Item,
            name: "Washers".to_string(),
            code: Some("WASH-M8".to_string()),
            parent_id: None,
            category_id: None,
            quantity: 10,
            price_cents: None,
            notes: None,
            updated_at,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_create_syncs_and_maps_identity() {
        let (db, remote) = setup();
        let inv = inventory(&db);

        let shelf = inv
            .create(EntityDraft::new(EntityKind::Location, "Shelf A"))
            .unwrap();
        let mut draft = EntityDraft::new(EntityKind::Item, "Hex bolts");
        draft.code = Some("BOLT-M6".to_string());
        draft.parent_id = Some(shelf.snapshot.id.clone());
        let item = inv.create(draft).unwrap();

        let summary = engine(&db, &remote).sync_pass(true).await.unwrap();
        assert_eq!(summary.synced, 2);
        assert_eq!(summary.conflicts, 0);
        assert_eq!(summary.failed, 0);

        // Both offline identities retired in favor of server ids
        let virtualizer = IdVirtualizer::new(db.connection());
        let shelf_real = virtualizer.resolve_id(&shelf.snapshot.id).unwrap();
        let item_real = virtualizer.resolve_id(&item.snapshot.id).unwrap();
        assert_ne!(shelf_real, shelf.snapshot.id);
        assert_ne!(item_real, item.snapshot.id);

        // No dangling offline references anywhere locally
        let entities = SqliteEntityRepository::new(db.connection());
        let synced_item = entities.get(EntityKind::Item, &item_real).unwrap().unwrap();
        assert_eq!(synced_item.sync_status, SyncStatus::Synced);
        assert!(!synced_item.is_offline);
        assert_eq!(synced_item.snapshot.parent_id.as_deref(), Some(shelf_real.as_str()));

        // And the remote holds the same record
        let authoritative = remote.get(EntityKind::Item, &item_real).unwrap();
        assert_eq!(authoritative.name, "Hex bolts");
        assert_eq!(authoritative.parent_id.as_deref(), Some(shelf_real.as_str()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_move_move_conflict_blocks_entity() {
        let (db, remote) = setup();
        let entities = SqliteEntityRepository::new(db.connection());
        let inv = inventory(&db);

        // Seed a synced item plus two synced containers
        for id in ["bin-1", "bin-2", "bin-3"] {
            let mut bin = remote_snapshot(id, 50);
            bin.kind = EntityKind::Container;
            bin.code = None;
            remote.put(bin.clone());
            entities
                .upsert(&CachedEntity {
                    snapshot: bin,
                    sync_status: SyncStatus::Synced,
                    is_offline: false,
                })
                .unwrap();
        }
        let mut item = remote_snapshot("e1", 100);
        item.parent_id = Some("bin-1".to_string());
        remote.put(item.clone());
        entities
            .upsert(&CachedEntity {
                snapshot: item,
                sync_status: SyncStatus::Synced,
                is_offline: false,
            })
            .unwrap();

        // This device moves the item to bin-2 while another device already
        // moved it to bin-3
        inv.relocate(EntityKind::Item, "e1", Some("bin-2".to_string()))
            .unwrap();
        let mut other = remote_snapshot("e1", 300);
        other.parent_id = Some("bin-3".to_string());
        remote.put(other);

        let summary = engine(&db, &remote).sync_pass(true).await.unwrap();
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.synced, 0);
        assert_eq!(summary.auto_resolved, 0);

        let open = SqliteConflictRepository::new(db.connection())
            .unresolved()
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, ConflictKind::MoveMove);
        assert_eq!(open[0].entity_id, "e1");

        // The event is terminal until the conflict is resolved
        let queue = SqliteEventQueue::new(db.connection());
        assert_eq!(queue.failed().unwrap().len(), 1);

        // A second pass does not duplicate the record
        let again = engine(&db, &remote).sync_pass(true).await.unwrap();
        assert_eq!(again.conflicts, 0);
        assert_eq!(
            SqliteConflictRepository::new(db.connection())
                .unresolved()
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_delete_auto_resolves() {
        let (db, remote) = setup();
        let entities = SqliteEntityRepository::new(db.connection());
        let inv = inventory(&db);

        let item = remote_snapshot("e1", 100);
        remote.put(item.clone());
        entities
            .upsert(&CachedEntity {
                snapshot: item,
                sync_status: SyncStatus::Synced,
                is_offline: false,
            })
            .unwrap();

        // Local update races a remote delete
        inv.update(
            EntityKind::Item,
            "e1",
            &[(crate::models::ScalarField::Quantity, serde_json::Value::from(3))],
        )
        .unwrap();
        remote.remove(EntityKind::Item, "e1");

        let summary = engine(&db, &remote).sync_pass(true).await.unwrap();
        assert_eq!(summary.conflicts, 1);
        // The deleted side wins without user input
        assert_eq!(summary.auto_resolved, 1);
        assert!(entities.get(EntityKind::Item, "e1").unwrap().is_none());
        assert!(SqliteConflictRepository::new(db.connection())
            .unresolved()
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_forced_offline_skips_pass() {
        let (db, remote) = setup();
        let inv = inventory(&db);
        inv.create(EntityDraft::new(EntityKind::Item, "Bolts")).unwrap();

        let settings = SqliteSettingsRepository::new(db.connection());
        settings.set_forced_offline(true).unwrap();

        let summary = engine(&db, &remote).sync_pass(true).await.unwrap();
        assert_eq!(summary.synced, 0);
        assert_eq!(summary.skipped, 1);
        assert!(remote.is_empty());
        assert_eq!(settings.last_sync_at().unwrap(), None);

        settings.set_forced_offline(false).unwrap();
        let summary = engine(&db, &remote).sync_pass(true).await.unwrap();
        assert_eq!(summary.synced, 1);
        assert_eq!(remote.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_network_failure_reschedules_with_backoff() {
        let (db, remote) = setup();
        let inv = inventory(&db);
        inv.create(EntityDraft::new(EntityKind::Item, "Bolts")).unwrap();

        let engine = SyncEngine::new(
            db.connection(),
            &remote,
            CoreConfig::default().with_backoff_base_secs(0),
        );

        remote.set_offline(true);
        let summary = engine.sync_pass(true).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.synced, 0);

        let queue = SqliteEventQueue::new(db.connection());
        let events = queue.next_batch(i64::MAX, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attempts, 1);
        assert_eq!(events[0].status, EventStatus::Pending);

        // Once connectivity returns it syncs
        remote.set_offline(false);
        let summary = engine.sync_pass(true).await.unwrap();
        assert_eq!(summary.synced, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_create_detected_by_code() {
        let (db, remote) = setup();
        let inv = inventory(&db);

        // Another device already owns this code remotely
        remote.put(remote_snapshot("real-1", 100));

        let mut draft = EntityDraft::new(EntityKind::Item, "My washers");
        draft.code = Some("WASH-M8".to_string());
        inv.create(draft).unwrap();

        let summary = engine(&db, &remote).sync_pass(true).await.unwrap();
        assert_eq!(summary.conflicts, 1);
        // Identity disputes are never auto-resolved
        assert_eq!(summary.auto_resolved, 0);

        let open = SqliteConflictRepository::new(db.connection())
            .unresolved()
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, ConflictKind::CreateCreate);
        assert_eq!(open[0].remote.as_ref().unwrap().id, "real-1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clean_update_fast_forwards() {
        let (db, remote) = setup();
        let entities = SqliteEntityRepository::new(db.connection());
        let inv = inventory(&db);

        let item = remote_snapshot("e1", 100);
        remote.put(item.clone());
        entities
            .upsert(&CachedEntity {
                snapshot: item,
                sync_status: SyncStatus::Synced,
                is_offline: false,
            })
            .unwrap();

        inv.update(
            EntityKind::Item,
            "e1",
            &[(crate::models::ScalarField::Quantity, serde_json::Value::from(7))],
        )
        .unwrap();

        let summary = engine(&db, &remote).sync_pass(true).await.unwrap();
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.conflicts, 0);

        assert_eq!(remote.get(EntityKind::Item, "e1").unwrap().quantity, 7);
        let local = entities.get(EntityKind::Item, "e1").unwrap().unwrap();
        assert_eq!(local.sync_status, SyncStatus::Synced);
        assert_eq!(local.snapshot.quantity, 7);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_report() {
        let (db, remote) = setup();
        let inv = inventory(&db);
        inv.create(EntityDraft::new(EntityKind::Item, "Bolts")).unwrap();

        let report = engine(&db, &remote).status().unwrap();
        assert_eq!(report.pending, 1);
        assert!(report.failed.is_empty());
        assert!(report.conflicts.is_empty());
        assert_eq!(report.last_sync_at, None);
        assert!(!report.forced_offline);

        engine(&db, &remote).sync_pass(true).await.unwrap();
        let report = engine(&db, &remote).status().unwrap();
        assert_eq!(report.pending, 0);
        assert!(report.last_sync_at.is_some());
    }
}
