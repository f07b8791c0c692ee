use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::Connection;
use serde::Serialize;
use stockpile_core::db::{
    ConflictRepository, Database, EntityRepository, SettingsRepository, SqliteConflictRepository,
    SqliteEntityRepository, SqliteSettingsRepository,
};
use stockpile_core::models::{ConflictRecord, EntitySnapshot, MergeSide, ScalarField};
use stockpile_core::remote::HttpRemoteService;
use stockpile_core::{CachedEntity, EntityKind};

use crate::error::CliError;

/// Enough of an identifier to be unique and resolvable as a prefix, without
/// drowning the listing. Covers `offline:<kind>:` plus the front of the UUID.
const SHORT_ID_CHARS: usize = 26;

#[derive(Debug, Serialize)]
pub struct EntityListItem {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub code: Option<String>,
    pub parent_id: Option<String>,
    pub category_id: Option<String>,
    pub quantity: i64,
    pub price_cents: Option<i64>,
    pub notes: Option<String>,
    pub sync_status: String,
    pub updated_at: i64,
    pub updated_at_iso: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("STOCKPILE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stockpile")
        .join("stockpile.db")
}

pub fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(path)?)
}

pub fn device_id(conn: &Connection) -> Result<String, CliError> {
    Ok(SqliteSettingsRepository::new(conn).device_id()?)
}

pub fn remote_from_env() -> Result<Option<HttpRemoteService>, CliError> {
    remote_from(
        env::var("STOCKPILE_REMOTE_URL").ok(),
        env::var("STOCKPILE_REMOTE_TOKEN").ok(),
    )
}

pub fn remote_from(
    url: Option<String>,
    token: Option<String>,
) -> Result<Option<HttpRemoteService>, CliError> {
    let Some(url) = url.filter(|url| !url.trim().is_empty()) else {
        return Ok(None);
    };
    tracing::info!(endpoint = url.as_str(), "remote configured from environment");
    HttpRemoteService::new(url, token)
        .map(Some)
        .map_err(|error| CliError::Remote(error.to_string()))
}

pub fn require_remote() -> Result<HttpRemoteService, CliError> {
    remote_from_env()?.ok_or(CliError::SyncNotConfigured)
}

/// Resolve an entity by exact ID, exact code, or unique ID prefix.
pub fn resolve_entity(
    conn: &Connection,
    kind: EntityKind,
    query: &str,
) -> Result<CachedEntity, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::EntityNotFound(query.to_string()));
    }

    let repo = SqliteEntityRepository::new(conn);
    if let Some(entity) = repo.get(kind, query)? {
        return Ok(entity);
    }
    if let Some(entity) = repo.get_by_code(kind, query)? {
        return Ok(entity);
    }

    let mut stmt = conn.prepare(
        "SELECT id FROM entities
         WHERE kind = ?1 AND id LIKE ?2
         ORDER BY updated_at DESC
         LIMIT 3",
    )?;
    let matching_ids = stmt
        .query_map(
            rusqlite::params![kind.as_str(), format!("{query}%")],
            |row| row.get::<_, String>(0),
        )?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    match matching_ids.len() {
        0 => Err(CliError::EntityNotFound(query.to_string())),
        1 => repo
            .get(kind, &matching_ids[0])?
            .ok_or_else(|| CliError::EntityNotFound(query.to_string())),
        _ => {
            let options = matching_ids
                .iter()
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousEntityId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Resolve a `--parent` argument to an entity ID. Parents are containers or
/// locations; containers are tried first.
pub fn resolve_parent(conn: &Connection, query: &str) -> Result<String, CliError> {
    match resolve_entity(conn, EntityKind::Container, query) {
        Ok(entity) => Ok(entity.snapshot.id),
        Err(CliError::EntityNotFound(_)) => {
            Ok(resolve_entity(conn, EntityKind::Location, query)?.snapshot.id)
        }
        Err(error) => Err(error),
    }
}

/// Resolve a `--category` argument to an entity ID
pub fn resolve_category(conn: &Connection, query: &str) -> Result<String, CliError> {
    Ok(resolve_entity(conn, EntityKind::Category, query)?.snapshot.id)
}

/// Resolve an unresolved conflict by exact ID or unique ID prefix
pub fn resolve_conflict(conn: &Connection, query: &str) -> Result<ConflictRecord, CliError> {
    let query = query.trim();
    let repo = SqliteConflictRepository::new(conn);
    if let Some(record) = repo.get(query)? {
        return Ok(record);
    }

    let matching = repo
        .unresolved()?
        .into_iter()
        .filter(|record| record.id.starts_with(query))
        .collect::<Vec<_>>();
    match matching.len() {
        0 => Err(CliError::ConflictNotFound(query.to_string())),
        1 => Ok(matching.into_iter().next().expect("one match")),
        _ => {
            let options = matching
                .iter()
                .map(|record| record.id.chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousConflictId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Parse repeated `--take field=side` selections for a merge resolution
pub fn parse_merge_takes(takes: &[String]) -> Result<BTreeMap<ScalarField, MergeSide>, CliError> {
    let mut selection = BTreeMap::new();
    for take in takes {
        let Some((field, side)) = take.split_once('=') else {
            return Err(CliError::InvalidMergeTake(format!(
                "'{take}' is not FIELD=SIDE"
            )));
        };
        let field = ScalarField::from_str(field.trim())
            .map_err(|error| CliError::InvalidMergeTake(error.to_string()))?;
        let side = match side.trim() {
            "local" => MergeSide::Local,
            "remote" => MergeSide::Remote,
            other => {
                return Err(CliError::InvalidMergeTake(format!(
                    "side must be 'local' or 'remote', got '{other}'"
                )))
            }
        };
        if selection.insert(field, side).is_some() {
            return Err(CliError::InvalidMergeTake(format!(
                "field '{field}' selected twice"
            )));
        }
    }
    Ok(selection)
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_CHARS).collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn entity_to_item(entity: &CachedEntity) -> EntityListItem {
    let snapshot = &entity.snapshot;
    EntityListItem {
        id: snapshot.id.clone(),
        kind: snapshot.kind.as_str().to_string(),
        name: snapshot.name.clone(),
        code: snapshot.code.clone(),
        parent_id: snapshot.parent_id.clone(),
        category_id: snapshot.category_id.clone(),
        quantity: snapshot.quantity,
        price_cents: snapshot.price_cents,
        notes: snapshot.notes.clone(),
        sync_status: entity.sync_status.as_str().to_string(),
        updated_at: snapshot.updated_at,
        updated_at_iso: format_timestamp(snapshot.updated_at),
    }
}

pub fn format_entity_lines(entities: &[CachedEntity]) -> Vec<String> {
    entities
        .iter()
        .map(|entity| {
            let snapshot = &entity.snapshot;
            let id = short_id(&snapshot.id);
            let code = snapshot.code.as_deref().unwrap_or("-");
            format!(
                "{id:<26}  {name:<28}  {code:<16}  qty={quantity:<6}  {status}",
                name = snapshot.name,
                quantity = snapshot.quantity,
                status = entity.sync_status.as_str(),
            )
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[ConflictRecord]) -> Vec<String> {
    conflicts
        .iter()
        .map(|record| {
            let fields = diverging_summary(record);
            format!(
                "{id:<13}  {kind:<13}  {entity_kind} {entity_id}  detected {detected}{fields}",
                id = record.id.chars().take(13).collect::<String>(),
                kind = record.kind.as_str(),
                entity_kind = record.entity_kind.as_str(),
                entity_id = short_id(&record.entity_id),
                detected = format_timestamp(record.detected_at),
            )
        })
        .collect()
}

fn diverging_summary(record: &ConflictRecord) -> String {
    let (Some(local), Some(remote)) = (&record.local, &record.remote) else {
        return String::new();
    };
    let fields = EntitySnapshot::diverging_fields(local, remote);
    if fields.is_empty() {
        return String::new();
    }
    let names = fields
        .iter()
        .map(ScalarField::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!("  fields: {names}")
}
