//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| Ok(row.get::<_, i32>(0)? != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute(stmt, [])?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: entity cache and settings
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            // Schema version tracking
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // Local copies of items, containers, categories, and locations
            "CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                code TEXT,
                parent_id TEXT,
                category_id TEXT,
                quantity INTEGER NOT NULL DEFAULT 0,
                price_cents INTEGER,
                notes TEXT,
                updated_at INTEGER NOT NULL,
                sync_status TEXT NOT NULL
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_code
             ON entities(kind, code) WHERE code IS NOT NULL",
            "CREATE INDEX IF NOT EXISTS idx_entities_parent ON entities(parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_entities_category ON entities(category_id)",
            // Settings table (local only)
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ],
    )
}

/// Migration to version 2: event queue and identifier mappings
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "CREATE TABLE IF NOT EXISTS sync_events (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                entity_kind TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                prior TEXT,
                created_at INTEGER NOT NULL,
                origin_device TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                next_attempt_at INTEGER NOT NULL DEFAULT 0
            )",
            // Explicit ordering index: per-entity FIFO retrieval is a range
            // scan, not a table sweep.
            "CREATE INDEX IF NOT EXISTS idx_sync_events_entity
             ON sync_events(entity_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_sync_events_status ON sync_events(status)",
            "CREATE TABLE IF NOT EXISTS id_mappings (
                offline_id TEXT PRIMARY KEY,
                real_id TEXT NOT NULL,
                entity_kind TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                confirmed_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_id_mappings_real ON id_mappings(real_id)",
        ],
    )
}

/// Migration to version 3: conflict records
fn migrate_v3(conn: &Connection) -> Result<()> {
    apply(
        conn,
        3,
        &[
            "CREATE TABLE IF NOT EXISTS conflicts (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                entity_kind TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                local_snapshot TEXT,
                remote_snapshot TEXT,
                base_snapshot TEXT,
                local_updated_at INTEGER NOT NULL,
                remote_updated_at INTEGER NOT NULL,
                detected_at INTEGER NOT NULL,
                resolution TEXT,
                resolved_at INTEGER,
                resolved_by TEXT
            )",
            // At most one unresolved conflict per entity, enforced by the
            // store itself.
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_conflicts_open
             ON conflicts(entity_kind, entity_id) WHERE resolved_at IS NULL",
            "CREATE INDEX IF NOT EXISTS idx_conflicts_detected ON conflicts(detected_at DESC)",
        ],
    )
}
