//! Identifier virtualization.
//!
//! Entities created offline get a syntactically tagged identifier
//! (`offline:<kind>:<uuid>`) so every consumer can classify an id as offline
//! vs. real without a lookup. Once the remote service assigns a real id, a
//! mapping is persisted and every local reference to the offline form is
//! rewritten in one atomic transaction.

use regex::Regex;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{EntityKind, EntitySnapshot, IdentifierMapping};
use crate::util::MILLIS_PER_DAY;

/// Namespace marker real identifiers never produce
pub const OFFLINE_PREFIX: &str = "offline:";

/// Generate a collision-resistant, tagged offline identifier
#[must_use]
pub fn generate_offline_id(kind: EntityKind) -> String {
    format!("{OFFLINE_PREFIX}{}:{}", kind.as_str(), Uuid::now_v7())
}

/// Pure predicate on the offline tag
#[must_use]
pub fn is_offline_id(id: &str) -> bool {
    id.starts_with(OFFLINE_PREFIX)
}

/// Strict syntactic check for a well-formed offline identifier
#[must_use]
pub fn is_valid_offline_id(id: &str) -> bool {
    let re = Regex::new(
        r"^offline:(item|container|category|location):[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
    )
    .expect("Invalid regex");
    re.is_match(id)
}

/// Extract the generation timestamp (Unix ms) embedded in the offline id's
/// UUID v7 segment.
#[must_use]
pub fn offline_id_timestamp(id: &str) -> Option<i64> {
    let uuid: Uuid = id.rsplit(':').next()?.parse().ok()?;
    let (secs, nanos) = uuid.get_timestamp()?.to_unix();
    i64::try_from(secs)
        .ok()
        .map(|secs| secs * 1000 + i64::from(nanos) / 1_000_000)
}

/// Generates, resolves, and retires offline identifiers against the store
pub struct IdVirtualizer<'a> {
    conn: &'a Connection,
}

impl<'a> IdVirtualizer<'a> {
    /// Create a virtualizer over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Persist the offline→real binding and rewrite every local reference.
    ///
    /// Entity rows (primary key and foreign keys), unsynced queue events
    /// (entity id plus snapshot payloads), and open conflict rows are all
    /// rewritten in the same transaction as the mapping insert; a storage
    /// error rolls everything back. Calling again with the same pair is a
    /// no-op.
    pub fn create_mapping(
        &self,
        offline_id: &str,
        real_id: &str,
        entity_kind: EntityKind,
        now: i64,
    ) -> Result<IdentifierMapping> {
        if !is_valid_offline_id(offline_id) {
            return Err(Error::InvalidInput(format!(
                "Not an offline identifier: {offline_id}"
            )));
        }
        if is_offline_id(real_id) {
            return Err(Error::InvalidInput(format!(
                "Real identifier has offline form: {real_id}"
            )));
        }

        if let Some(existing) = self.get(offline_id)? {
            if existing.real_id == real_id {
                return Ok(existing);
            }
            return Err(Error::InvalidInput(format!(
                "Offline id {offline_id} is already mapped to {}",
                existing.real_id
            )));
        }

        let mapping = IdentifierMapping {
            offline_id: offline_id.to_string(),
            real_id: real_id.to_string(),
            entity_kind,
            created_at: offline_id_timestamp(offline_id).unwrap_or(now),
            confirmed_at: now,
        };

        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO id_mappings (offline_id, real_id, entity_kind, created_at, confirmed_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                mapping.offline_id,
                mapping.real_id,
                mapping.entity_kind.as_str(),
                mapping.created_at,
                mapping.confirmed_at
            ],
        )?;

        tx.execute(
            "UPDATE entities SET id = ?1 WHERE id = ?2",
            params![real_id, offline_id],
        )?;
        tx.execute(
            "UPDATE entities SET parent_id = ?1 WHERE parent_id = ?2",
            params![real_id, offline_id],
        )?;
        tx.execute(
            "UPDATE entities SET category_id = ?1 WHERE category_id = ?2",
            params![real_id, offline_id],
        )?;
        tx.execute(
            "UPDATE conflicts SET entity_id = ?1 WHERE entity_id = ?2 AND resolved_at IS NULL",
            params![real_id, offline_id],
        )?;

        // Unsynced events may reference the offline form in their entity id
        // or inside serialized snapshots; rewrite those in one sweep.
        let mut stmt = tx.prepare(
            "SELECT id, entity_id, payload, prior FROM sync_events
             WHERE status != 'synced'
               AND (entity_id = ?1
                    OR payload LIKE '%' || ?1 || '%'
                    OR COALESCE(prior, '') LIKE '%' || ?1 || '%')",
        )?;
        let rows = stmt
            .query_map(params![offline_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        for (event_id, entity_id, payload, prior) in rows {
            let entity_id = if entity_id == offline_id {
                real_id.to_string()
            } else {
                entity_id
            };
            let payload = rewrite_snapshot_json(&payload, offline_id, real_id)?;
            let prior = prior
                .map(|p| rewrite_snapshot_json(&p, offline_id, real_id))
                .transpose()?;
            tx.execute(
                "UPDATE sync_events SET entity_id = ?, payload = ?, prior = ? WHERE id = ?",
                params![entity_id, payload, prior, event_id],
            )?;
        }

        tx.commit()?;
        tracing::debug!(offline_id, real_id, "recorded identifier mapping");
        Ok(mapping)
    }

    /// Return the mapped real identifier, or the input unchanged.
    ///
    /// Safe to call speculatively on any identifier, offline or real.
    pub fn resolve_id(&self, id: &str) -> Result<String> {
        if !is_offline_id(id) {
            return Ok(id.to_string());
        }
        let result = self.conn.query_row(
            "SELECT real_id FROM id_mappings WHERE offline_id = ?",
            params![id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(real_id) => Ok(real_id),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(id.to_string()),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a mapping by its offline identifier
    pub fn get(&self, offline_id: &str) -> Result<Option<IdentifierMapping>> {
        let result = self.conn.query_row(
            "SELECT offline_id, real_id, entity_kind, created_at, confirmed_at
             FROM id_mappings WHERE offline_id = ?",
            params![offline_id],
            parse_mapping,
        );
        match result {
            Ok(mapping) => Ok(Some(mapping)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete mappings confirmed before the retention window, provided no
    /// unsynced event or entity row still references the offline form.
    /// Returns the number of deleted mappings.
    pub fn cleanup_old_mappings(&self, retention_days: i64, now: i64) -> Result<usize> {
        let cutoff = now - retention_days * MILLIS_PER_DAY;
        let deleted = self.conn.execute(
            "DELETE FROM id_mappings
             WHERE confirmed_at < ?1
               AND NOT EXISTS (
                   SELECT 1 FROM sync_events s
                   WHERE s.status != 'synced'
                     AND (s.entity_id = id_mappings.offline_id
                          OR s.payload LIKE '%' || id_mappings.offline_id || '%'
                          OR COALESCE(s.prior, '') LIKE '%' || id_mappings.offline_id || '%'))
               AND NOT EXISTS (
                   SELECT 1 FROM entities e
                   WHERE e.id = id_mappings.offline_id
                      OR e.parent_id = id_mappings.offline_id
                      OR e.category_id = id_mappings.offline_id)",
            params![cutoff],
        )?;
        if deleted > 0 {
            tracing::debug!(deleted, "cleaned up old identifier mappings");
        }
        Ok(deleted)
    }
}

/// Replace every reference to `offline_id` inside a serialized snapshot
fn rewrite_snapshot_json(json: &str, offline_id: &str, real_id: &str) -> Result<String> {
    let mut snapshot: EntitySnapshot = serde_json::from_str(json)?;
    let swap = |value: &mut String| {
        if value == offline_id {
            *value = real_id.to_string();
        }
    };
    swap(&mut snapshot.id);
    if let Some(parent_id) = snapshot.parent_id.as_mut() {
        swap(parent_id);
    }
    if let Some(category_id) = snapshot.category_id.as_mut() {
        swap(category_id);
    }
    Ok(serde_json::to_string(&snapshot)?)
}

fn parse_mapping(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdentifierMapping> {
    let kind: String = row.get(2)?;
    Ok(IdentifierMapping {
        offline_id: row.get(0)?,
        real_id: row.get(1)?,
        entity_kind: kind.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(2, "entity_kind".into(), rusqlite::types::Type::Text)
        })?,
        created_at: row.get(3)?,
        confirmed_at: row.get(4)?,
    })
}
