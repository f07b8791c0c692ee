use std::path::Path;

use serde::Serialize;
use stockpile_core::conflict::ConflictResolver;
use stockpile_core::db::{EventQueue, SqliteEventQueue};
use stockpile_core::models::{ConflictRecord, MutationEvent, ResolutionStrategy};
use stockpile_core::remote::MemoryRemoteService;
use stockpile_core::sync::SyncEngine;
use stockpile_core::CoreConfig;

use crate::cli::StrategyArg;
use crate::commands::common::{
    device_id, format_conflict_lines, format_timestamp, open_database, parse_merge_takes,
    require_remote, resolve_conflict, short_id,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct FailedEventItem {
    id: String,
    kind: String,
    entity_kind: String,
    entity_id: String,
    attempts: u32,
    last_error: Option<String>,
    created_at: i64,
}

#[derive(Debug, Serialize)]
struct StatusItem {
    pending: usize,
    failed: Vec<FailedEventItem>,
    conflicts: Vec<ConflictRecord>,
    last_sync_at: Option<i64>,
    forced_offline: bool,
}

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let remote = require_remote()?;
    let db = open_database(db_path)?;

    let engine = SyncEngine::new(db.connection(), &remote, CoreConfig::default());
    let summary = engine.sync_pass(true).await?;

    println!(
        "Sync finished: {} synced, {} failed, {} conflicts ({} auto-resolved), {} skipped",
        summary.synced, summary.failed, summary.conflicts, summary.auto_resolved, summary.skipped
    );
    if summary.conflicts > summary.auto_resolved {
        println!("Run `stockpile sync conflicts` to review open conflicts.");
    }
    Ok(())
}

pub fn run_sync_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    // The status surface never talks to the remote
    let placeholder = MemoryRemoteService::new();
    let report = SyncEngine::new(db.connection(), &placeholder, CoreConfig::default()).status()?;

    if as_json {
        let item = StatusItem {
            pending: report.pending,
            failed: report.failed.iter().map(failed_event_to_item).collect(),
            conflicts: report.conflicts,
            last_sync_at: report.last_sync_at,
            forced_offline: report.forced_offline,
        };
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("Pending events: {}", report.pending);
    println!("Failed events: {}", report.failed.len());
    for event in &report.failed {
        println!(
            "  {id:<13}  {kind:<7}  {entity_kind} {entity_id}  attempts={attempts}  {error}",
            id = event.id.chars().take(13).collect::<String>(),
            kind = event.kind.as_str(),
            entity_kind = event.entity_kind.as_str(),
            entity_id = short_id(&event.entity_id),
            attempts = event.attempts,
            error = event.last_error.as_deref().unwrap_or("-"),
        );
    }
    println!("Open conflicts: {}", report.conflicts.len());
    for line in format_conflict_lines(&report.conflicts) {
        println!("  {line}");
    }
    match report.last_sync_at {
        Some(at) => println!("Last sync: {}", format_timestamp(at)),
        None => println!("Last sync: never"),
    }
    println!(
        "Forced offline: {}",
        if report.forced_offline { "yes" } else { "no" }
    );
    Ok(())
}

pub fn run_sync_conflicts(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let placeholder = MemoryRemoteService::new();
    let report = SyncEngine::new(db.connection(), &placeholder, CoreConfig::default()).status()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report.conflicts)?);
        return Ok(());
    }

    if report.conflicts.is_empty() {
        println!("No open conflicts.");
        return Ok(());
    }
    for line in format_conflict_lines(&report.conflicts) {
        println!("{line}");
    }
    println!("Resolve with `stockpile sync resolve <id> <local|remote|merge>`.");
    Ok(())
}

pub fn run_sync_resolve(
    id: &str,
    strategy: StrategyArg,
    takes: &[String],
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conn = db.connection();
    let conflict = resolve_conflict(conn, id)?;

    let strategy = match strategy {
        StrategyArg::Local | StrategyArg::Remote if !takes.is_empty() => {
            return Err(CliError::InvalidMergeTake(
                "--take applies to the merge strategy only".to_string(),
            ))
        }
        StrategyArg::Local => ResolutionStrategy::Local,
        StrategyArg::Remote => ResolutionStrategy::Remote,
        StrategyArg::Merge => {
            let selection = parse_merge_takes(takes)?;
            if selection.is_empty() {
                return Err(CliError::InvalidMergeTake(
                    "merge requires at least one --take FIELD=SIDE".to_string(),
                ));
            }
            ResolutionStrategy::Merge(selection)
        }
    };

    let resolved_by = device_id(conn)?;
    let resolved = ConflictResolver::new(conn, resolved_by.clone()).resolve_manually(
        &conflict.id,
        &strategy,
        &resolved_by,
        stockpile_core::util::unix_timestamp_ms(),
    )?;

    let resolution = resolved
        .resolution
        .map_or("unresolved", |resolution| resolution.as_str());
    println!("Resolved {} as {resolution}", short_id(&resolved.id));
    println!("Run `stockpile sync` to push the outcome.");
    Ok(())
}

pub fn run_sync_retry(id: Option<&str>, all: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let queue = SqliteEventQueue::new(db.connection());

    if all {
        let failed = queue.failed()?;
        for event in &failed {
            queue.reset_failed(&event.id)?;
        }
        println!("Requeued {} failed events", failed.len());
        return Ok(());
    }

    let Some(query) = id else {
        return Err(CliError::MissingRetryTarget);
    };
    let matching = queue
        .failed()?
        .into_iter()
        .filter(|event| event.id.starts_with(query))
        .collect::<Vec<MutationEvent>>();
    match matching.len() {
        0 => Err(CliError::EntityNotFound(query.to_string())),
        1 => {
            queue.reset_failed(&matching[0].id)?;
            println!("Requeued {}", short_id(&matching[0].id));
            Ok(())
        }
        _ => {
            let options = matching
                .iter()
                .map(|event| event.id.chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousEntityId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

fn failed_event_to_item(event: &MutationEvent) -> FailedEventItem {
    FailedEventItem {
        id: event.id.clone(),
        kind: event.kind.as_str().to_string(),
        entity_kind: event.entity_kind.as_str().to_string(),
        entity_id: event.entity_id.clone(),
        attempts: event.attempts,
        last_error: event.last_error.clone(),
        created_at: event.created_at,
    }
}
