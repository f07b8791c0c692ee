//! Conflict record repository implementation

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{ConflictRecord, EntityKind, EntitySnapshot, Resolution};
use crate::util::MILLIS_PER_DAY;

/// Trait for conflict record storage operations
pub trait ConflictRepository {
    /// Insert a newly detected conflict unless an unresolved record already
    /// exists for the same `(entity_kind, entity_id)`; returns whether the
    /// record was inserted.
    fn insert_if_absent(&self, record: &ConflictRecord) -> Result<bool>;

    /// The unresolved conflict for an entity, if any
    fn open_for(&self, kind: EntityKind, entity_id: &str) -> Result<Option<ConflictRecord>>;

    /// Get a conflict by id
    fn get(&self, id: &str) -> Result<Option<ConflictRecord>>;

    /// All unresolved conflicts, oldest first
    fn unresolved(&self) -> Result<Vec<ConflictRecord>>;

    /// Stamp a resolution onto an open record. Resolved records are
    /// immutable: resolving twice is an error.
    fn mark_resolved(
        &self,
        id: &str,
        resolution: Resolution,
        resolved_by: &str,
        resolved_at: i64,
    ) -> Result<()>;

    /// Drop resolved records past the retention window; returns the number
    /// of purged records.
    fn purge_resolved(&self, older_than_days: i64, now: i64) -> Result<usize>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

const CONFLICT_COLUMNS: &str = "id, kind, entity_kind, entity_id,
     local_snapshot, remote_snapshot, base_snapshot,
     local_updated_at, remote_updated_at, detected_at,
     resolution, resolved_at, resolved_by";

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a conflict record from a database row
    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRecord> {
        let text_column = |idx: usize, name: &'static str| {
            rusqlite::Error::InvalidColumnType(idx, name.into(), rusqlite::types::Type::Text)
        };
        let snapshot_column = |idx: usize,
                               name: &'static str,
                               json: Option<String>|
         -> rusqlite::Result<Option<EntitySnapshot>> {
            json.map(|j| serde_json::from_str(&j))
                .transpose()
                .map_err(|_| text_column(idx, name))
        };

        let kind: String = row.get(1)?;
        let entity_kind: String = row.get(2)?;
        let resolution: Option<String> = row.get(10)?;
        Ok(ConflictRecord {
            id: row.get(0)?,
            kind: kind.parse().map_err(|_| text_column(1, "kind"))?,
            entity_kind: entity_kind
                .parse()
                .map_err(|_| text_column(2, "entity_kind"))?,
            entity_id: row.get(3)?,
            local: snapshot_column(4, "local_snapshot", row.get(4)?)?,
            remote: snapshot_column(5, "remote_snapshot", row.get(5)?)?,
            base: snapshot_column(6, "base_snapshot", row.get(6)?)?,
            local_updated_at: row.get(7)?,
            remote_updated_at: row.get(8)?,
            detected_at: row.get(9)?,
            resolution: resolution
                .map(|r| r.parse())
                .transpose()
                .map_err(|_| text_column(10, "resolution"))?,
            resolved_at: row.get(11)?,
            resolved_by: row.get(12)?,
        })
    }
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn insert_if_absent(&self, record: &ConflictRecord) -> Result<bool> {
        if self
            .open_for(record.entity_kind, &record.entity_id)?
            .is_some()
        {
            return Ok(false);
        }

        let local = record
            .local
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let remote = record
            .remote
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let base = record.base.as_ref().map(serde_json::to_string).transpose()?;

        self.conn.execute(
            "INSERT INTO conflicts
             (id, kind, entity_kind, entity_id,
              local_snapshot, remote_snapshot, base_snapshot,
              local_updated_at, remote_updated_at, detected_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.kind.as_str(),
                record.entity_kind.as_str(),
                record.entity_id,
                local,
                remote,
                base,
                record.local_updated_at,
                record.remote_updated_at,
                record.detected_at
            ],
        )?;
        tracing::info!(
            conflict_id = record.id,
            kind = record.kind.as_str(),
            entity_id = record.entity_id,
            "recorded sync conflict"
        );
        Ok(true)
    }

    fn open_for(&self, kind: EntityKind, entity_id: &str) -> Result<Option<ConflictRecord>> {
        let result = self.conn.query_row(
            &format!(
                "SELECT {CONFLICT_COLUMNS} FROM conflicts
                 WHERE entity_kind = ? AND entity_id = ? AND resolved_at IS NULL"
            ),
            params![kind.as_str(), entity_id],
            Self::parse_conflict,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &str) -> Result<Option<ConflictRecord>> {
        let result = self.conn.query_row(
            &format!("SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE id = ?"),
            params![id],
            Self::parse_conflict,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn unresolved(&self) -> Result<Vec<ConflictRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflicts
             WHERE resolved_at IS NULL
             ORDER BY detected_at"
        ))?;

        let records = stmt
            .query_map([], Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn mark_resolved(
        &self,
        id: &str,
        resolution: Resolution,
        resolved_by: &str,
        resolved_at: i64,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE conflicts
             SET resolution = ?, resolved_at = ?, resolved_by = ?
             WHERE id = ? AND resolved_at IS NULL",
            params![resolution.as_str(), resolved_at, resolved_by, id],
        )?;
        if rows == 0 {
            return Err(Error::InvalidInput(format!(
                "Conflict {id} is missing or already resolved"
            )));
        }
        Ok(())
    }

    fn purge_resolved(&self, older_than_days: i64, now: i64) -> Result<usize> {
        let cutoff = now - older_than_days * MILLIS_PER_DAY;
        let rows = self.conn.execute(
            "DELETE FROM conflicts WHERE resolved_at IS NOT NULL AND resolved_at < ?",
            params![cutoff],
        )?;
        Ok(rows)
    }
}
