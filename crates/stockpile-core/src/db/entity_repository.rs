//! Entity cache repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::ids;
use crate::models::{CachedEntity, EntityKind, EntitySnapshot};

/// Trait for cached-entity storage operations
pub trait EntityRepository {
    /// Insert or replace a cached entity
    fn upsert(&self, entity: &CachedEntity) -> Result<()>;

    /// Get an entity by kind and id
    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<CachedEntity>>;

    /// Exact natural-key lookup (scanned code)
    fn get_by_code(&self, kind: EntityKind, code: &str) -> Result<Option<CachedEntity>>;

    /// List entities of a kind, most recently updated first
    fn list(&self, kind: EntityKind, limit: usize, offset: usize) -> Result<Vec<CachedEntity>>;

    /// Remove an entity row; returns whether a row existed
    fn delete(&self, kind: EntityKind, id: &str) -> Result<bool>;
}

/// `SQLite` implementation of `EntityRepository`
pub struct SqliteEntityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteEntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a cached entity from a database row
    fn parse_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedEntity> {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let sync_status: String = row.get(10)?;
        let text_column = |idx: usize, name: &'static str| {
            rusqlite::Error::InvalidColumnType(idx, name.into(), rusqlite::types::Type::Text)
        };
        let is_offline = ids::is_offline_id(&id);
        Ok(CachedEntity {
            snapshot: EntitySnapshot {
                id,
                kind: kind.parse().map_err(|_| text_column(1, "kind"))?,
                name: row.get(2)?,
                code: row.get(3)?,
                parent_id: row.get(4)?,
                category_id: row.get(5)?,
                quantity: row.get(6)?,
                price_cents: row.get(7)?,
                notes: row.get(8)?,
                updated_at: row.get(9)?,
            },
            sync_status: sync_status
                .parse()
                .map_err(|_| text_column(10, "sync_status"))?,
            is_offline,
        })
    }
}

const ENTITY_COLUMNS: &str = "id, kind, name, code, parent_id, category_id,
     quantity, price_cents, notes, updated_at, sync_status";

impl EntityRepository for SqliteEntityRepository<'_> {
    fn upsert(&self, entity: &CachedEntity) -> Result<()> {
        let s = &entity.snapshot;
        self.conn.execute(
            "INSERT OR REPLACE INTO entities
             (id, kind, name, code, parent_id, category_id,
              quantity, price_cents, notes, updated_at, sync_status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                s.id,
                s.kind.as_str(),
                s.name,
                s.code,
                s.parent_id,
                s.category_id,
                s.quantity,
                s.price_cents,
                s.notes,
                s.updated_at,
                entity.sync_status.as_str()
            ],
        )?;
        Ok(())
    }

    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<CachedEntity>> {
        let result = self.conn.query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE kind = ? AND id = ?"),
            params![kind.as_str(), id],
            Self::parse_entity,
        );

        match result {
            Ok(entity) => Ok(Some(entity)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_by_code(&self, kind: EntityKind, code: &str) -> Result<Option<CachedEntity>> {
        let result = self.conn.query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE kind = ? AND code = ?"),
            params![kind.as_str(), code],
            Self::parse_entity,
        );

        match result {
            Ok(entity) => Ok(Some(entity)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, kind: EntityKind, limit: usize, offset: usize) -> Result<Vec<CachedEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE kind = ?
             ORDER BY updated_at DESC
             LIMIT ? OFFSET ?"
        ))?;

        let entities = stmt
            .query_map(
                params![kind.as_str(), limit as i64, offset as i64],
                Self::parse_entity,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entities)
    }

    fn delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM entities WHERE kind = ? AND id = ?",
            params![kind.as_str(), id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::SyncStatus;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn entity(id: &str, kind: EntityKind, code: Option<&str>) -> CachedEntity {
        CachedEntity {
            snapshot: EntitySnapshot {
                id: id.to_string(),
                kind,
                name: format!("{kind} {id}"),
                code: code.map(ToString::to_string),
                parent_id: None,
                category_id: None,
                quantity: 3,
                price_cents: None,
                notes: None,
                updated_at: 100,
            },
            sync_status: SyncStatus::Synced,
            is_offline: false,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup();
        let repo = SqliteEntityRepository::new(db.connection());

        let stored = entity("e1", EntityKind::Item, Some("CODE-1"));
        repo.upsert(&stored).unwrap();

        let fetched = repo.get(EntityKind::Item, "e1").unwrap().unwrap();
        assert_eq!(fetched, stored);

        // Kind mismatch is a miss
        assert!(repo.get(EntityKind::Container, "e1").unwrap().is_none());
    }

    #[test]
    fn test_get_by_code() {
        let db = setup();
        let repo = SqliteEntityRepository::new(db.connection());

        repo.upsert(&entity("e1", EntityKind::Item, Some("CODE-1")))
            .unwrap();

        let hit = repo.get_by_code(EntityKind::Item, "CODE-1").unwrap();
        assert_eq!(hit.unwrap().snapshot.id, "e1");
        assert!(repo.get_by_code(EntityKind::Item, "CODE-2").unwrap().is_none());
    }

    #[test]
    fn test_code_unique_per_kind() {
        let db = setup();
        let repo = SqliteEntityRepository::new(db.connection());

        repo.upsert(&entity("e1", EntityKind::Item, Some("CODE-1")))
            .unwrap();
        // Same code under a different kind is allowed
        repo.upsert(&entity("e2", EntityKind::Container, Some("CODE-1")))
            .unwrap();
        // Same code under the same kind is rejected by the store
        assert!(repo
            .upsert(&entity("e3", EntityKind::Item, Some("CODE-1")))
            .is_err());
    }

    #[test]
    fn test_list_ordered_by_update() {
        let db = setup();
        let repo = SqliteEntityRepository::new(db.connection());

        let mut a = entity("e1", EntityKind::Item, None);
        a.snapshot.updated_at = 10;
        let mut b = entity("e2", EntityKind::Item, None);
        b.snapshot.updated_at = 20;
        repo.upsert(&a).unwrap();
        repo.upsert(&b).unwrap();

        let listed = repo.list(EntityKind::Item, 10, 0).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].snapshot.id, "e2");
    }

    #[test]
    fn test_delete() {
        let db = setup();
        let repo = SqliteEntityRepository::new(db.connection());

        repo.upsert(&entity("e1", EntityKind::Item, None)).unwrap();
        assert!(repo.delete(EntityKind::Item, "e1").unwrap());
        assert!(!repo.delete(EntityKind::Item, "e1").unwrap());
        assert!(repo.get(EntityKind::Item, "e1").unwrap().is_none());
    }

    #[test]
    fn test_offline_flag_follows_id_form() {
        let db = setup();
        let repo = SqliteEntityRepository::new(db.connection());

        let offline_id = crate::ids::generate_offline_id(EntityKind::Item);
        let mut stored = entity(&offline_id, EntityKind::Item, None);
        stored.is_offline = true;
        repo.upsert(&stored).unwrap();

        let fetched = repo.get(EntityKind::Item, &offline_id).unwrap().unwrap();
        assert!(fetched.is_offline);
    }
}
