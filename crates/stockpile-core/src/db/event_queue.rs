//! Durable event queue implementation

#![allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)] // SQLite integers are i64
#![allow(clippy::cast_sign_loss)]

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{EventStatus, MutationEvent};
use crate::util::{compact_text, MILLIS_PER_DAY};

/// Trait for durable event queue operations
pub trait EventQueue {
    /// Idempotent append: returns `false` when an event with the same id
    /// already exists (the call is then a no-op).
    fn enqueue(&self, event: &MutationEvent) -> Result<bool>;

    /// Pending events eligible at `now`, grouped by entity and ordered by
    /// creation time within each group. Entities with a Failed event are
    /// excluded entirely so later events never leapfrog a failure.
    fn next_batch(&self, now: i64, max: usize) -> Result<Vec<MutationEvent>>;

    /// Get an event by id
    fn get(&self, id: &str) -> Result<Option<MutationEvent>>;

    /// The oldest not-yet-synced event for an entity, regardless of status
    fn oldest_unsynced_for(&self, entity_id: &str) -> Result<Option<MutationEvent>>;

    /// Transition Pending → Syncing
    fn mark_syncing(&self, id: &str) -> Result<()>;

    /// Transition Syncing → Synced
    fn mark_synced(&self, id: &str) -> Result<()>;

    /// Record a transient failure: increments `attempts`, schedules the next
    /// retry with attempt-count backoff, and goes terminal Failed once
    /// `attempts` exceeds `max_retries`. Returns the resulting status.
    fn mark_failed(
        &self,
        id: &str,
        error: &str,
        max_retries: u32,
        backoff_base_secs: i64,
        now: i64,
    ) -> Result<EventStatus>;

    /// Record a structural failure (remote divergence): immediately terminal,
    /// cleared only by conflict resolution or an explicit reset.
    fn mark_conflicted(&self, id: &str, error: &str) -> Result<()>;

    /// Reset every Syncing leftover from a cancelled pass back to Pending.
    /// Returns the number of reset events.
    fn reset_stuck(&self) -> Result<usize>;

    /// Explicitly reset a Failed event for manual retry
    fn reset_failed(&self, id: &str) -> Result<()>;

    /// Purge Synced events older than the retention window; returns the
    /// number of purged events.
    fn cleanup(&self, older_than_days: i64, now: i64) -> Result<usize>;

    /// Number of events still waiting to sync
    fn pending_count(&self) -> Result<usize>;

    /// Terminal failures awaiting user attention
    fn failed(&self) -> Result<Vec<MutationEvent>>;
}

/// `SQLite` implementation of `EventQueue`
pub struct SqliteEventQueue<'a> {
    conn: &'a Connection,
}

const EVENT_COLUMNS: &str = "id, kind, entity_kind, entity_id, payload, prior,
     created_at, origin_device, status, attempts, last_error, next_attempt_at";

impl<'a> SqliteEventQueue<'a> {
    /// Create a new queue over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an event from a database row
    fn parse_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<MutationEvent> {
        let text_column = |idx: usize, name: &'static str| {
            rusqlite::Error::InvalidColumnType(idx, name.into(), rusqlite::types::Type::Text)
        };
        let kind: String = row.get(1)?;
        let entity_kind: String = row.get(2)?;
        let payload: String = row.get(4)?;
        let prior: Option<String> = row.get(5)?;
        let status: String = row.get(8)?;
        Ok(MutationEvent {
            id: row.get(0)?,
            kind: kind.parse().map_err(|_| text_column(1, "kind"))?,
            entity_kind: entity_kind
                .parse()
                .map_err(|_| text_column(2, "entity_kind"))?,
            entity_id: row.get(3)?,
            payload: serde_json::from_str(&payload).map_err(|_| text_column(4, "payload"))?,
            prior: prior
                .map(|p| serde_json::from_str(&p))
                .transpose()
                .map_err(|_| text_column(5, "prior"))?,
            created_at: row.get(6)?,
            origin_device: row.get(7)?,
            status: status.parse().map_err(|_| text_column(8, "status"))?,
            attempts: row.get::<_, i64>(9)? as u32,
            last_error: row.get(10)?,
            next_attempt_at: row.get(11)?,
        })
    }

    fn set_status(&self, id: &str, from: EventStatus, to: EventStatus) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_events SET status = ? WHERE id = ? AND status = ?",
            params![to.as_str(), id, from.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!(
                "No {} event with id {id}",
                from.as_str()
            )));
        }
        Ok(())
    }
}

impl EventQueue for SqliteEventQueue<'_> {
    fn enqueue(&self, event: &MutationEvent) -> Result<bool> {
        let payload = serde_json::to_string(&event.payload)?;
        let prior = event
            .prior
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO sync_events
             (id, kind, entity_kind, entity_id, payload, prior,
              created_at, origin_device, status, attempts, last_error, next_attempt_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                event.id,
                event.kind.as_str(),
                event.entity_kind.as_str(),
                event.entity_id,
                payload,
                prior,
                event.created_at,
                event.origin_device,
                event.status.as_str(),
                i64::from(event.attempts),
                event.last_error,
                event.next_attempt_at
            ],
        )?;
        Ok(rows > 0)
    }

    fn next_batch(&self, now: i64, max: usize) -> Result<Vec<MutationEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM sync_events e
             WHERE e.status = 'pending'
               AND e.next_attempt_at <= ?1
               AND NOT EXISTS (
                   SELECT 1 FROM sync_events f
                   WHERE f.entity_id = e.entity_id AND f.status = 'failed')
             ORDER BY e.entity_id, e.created_at, e.rowid
             LIMIT ?2"
        ))?;

        let events = stmt
            .query_map(params![now, max as i64], Self::parse_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    fn get(&self, id: &str) -> Result<Option<MutationEvent>> {
        let result = self.conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM sync_events WHERE id = ?"),
            params![id],
            Self::parse_event,
        );

        match result {
            Ok(event) => Ok(Some(event)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn oldest_unsynced_for(&self, entity_id: &str) -> Result<Option<MutationEvent>> {
        let result = self.conn.query_row(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM sync_events
                 WHERE entity_id = ? AND status != 'synced'
                 ORDER BY created_at, rowid
                 LIMIT 1"
            ),
            params![entity_id],
            Self::parse_event,
        );

        match result {
            Ok(event) => Ok(Some(event)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn mark_syncing(&self, id: &str) -> Result<()> {
        self.set_status(id, EventStatus::Pending, EventStatus::Syncing)
    }

    fn mark_synced(&self, id: &str) -> Result<()> {
        self.set_status(id, EventStatus::Syncing, EventStatus::Synced)
    }

    fn mark_failed(
        &self,
        id: &str,
        error: &str,
        max_retries: u32,
        backoff_base_secs: i64,
        now: i64,
    ) -> Result<EventStatus> {
        let attempts: i64 = self.conn.query_row(
            "SELECT attempts FROM sync_events WHERE id = ?",
            params![id],
            |row| row.get(0),
        )?;
        let attempts = attempts + 1;

        let status = if attempts > i64::from(max_retries) {
            EventStatus::Failed
        } else {
            EventStatus::Pending
        };
        // Doubling backoff: base, 2*base, 4*base, ...
        let delay_ms = backoff_base_secs
            .saturating_mul(1 << (attempts - 1).min(16))
            .saturating_mul(1000);

        // Stored error text is bounded; remote bodies can be arbitrarily long
        self.conn.execute(
            "UPDATE sync_events
             SET status = ?, attempts = ?, last_error = ?, next_attempt_at = ?
             WHERE id = ?",
            params![status.as_str(), attempts, compact_text(error), now + delay_ms, id],
        )?;

        if status == EventStatus::Failed {
            tracing::warn!(event_id = id, attempts, error, "event failed permanently");
        }
        Ok(status)
    }

    fn mark_conflicted(&self, id: &str, error: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_events SET status = 'failed', last_error = ? WHERE id = ?",
            params![compact_text(error), id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("No event with id {id}")));
        }
        Ok(())
    }

    fn reset_stuck(&self) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE sync_events SET status = 'pending' WHERE status = 'syncing'",
            [],
        )?;
        Ok(rows)
    }

    fn reset_failed(&self, id: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_events
             SET status = 'pending', attempts = 0, last_error = NULL, next_attempt_at = 0
             WHERE id = ? AND status = 'failed'",
            params![id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("No failed event with id {id}")));
        }
        Ok(())
    }

    fn cleanup(&self, older_than_days: i64, now: i64) -> Result<usize> {
        let cutoff = now - older_than_days * MILLIS_PER_DAY;
        let rows = self.conn.execute(
            "DELETE FROM sync_events WHERE status = 'synced' AND created_at < ?",
            params![cutoff],
        )?;
        Ok(rows)
    }

    fn pending_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_events WHERE status IN ('pending', 'syncing')",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn failed(&self) -> Result<Vec<MutationEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM sync_events
             WHERE status = 'failed'
             ORDER BY created_at"
        ))?;

        let events = stmt
            .query_map([], Self::parse_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }
}
