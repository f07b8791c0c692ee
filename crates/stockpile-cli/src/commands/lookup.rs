use std::path::Path;

use rusqlite::Connection;
use stockpile_core::db::{SettingsRepository, SqliteSettingsRepository};
use stockpile_core::lookup::{LookupSource, ReadPath};
use stockpile_core::remote::{MemoryRemoteService, RemoteService};
use stockpile_core::sync::Connectivity;
use stockpile_core::EntityKind;

use crate::commands::common::{entity_to_item, open_database, remote_from_env};
use crate::error::CliError;

pub async fn run_lookup(
    kind: EntityKind,
    code: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conn = db.connection();
    let forced_offline = SqliteSettingsRepository::new(conn).forced_offline()?;

    // Without a configured remote the read path is local-only
    match remote_from_env()? {
        Some(remote) => {
            let connectivity = Connectivity {
                online: true,
                forced_offline,
            };
            lookup_with(conn, &remote, kind, code, connectivity, as_json).await
        }
        None => {
            let connectivity = Connectivity {
                online: false,
                forced_offline,
            };
            lookup_with(conn, &MemoryRemoteService::new(), kind, code, connectivity, as_json).await
        }
    }
}

async fn lookup_with<R: RemoteService>(
    conn: &Connection,
    remote: &R,
    kind: EntityKind,
    code: &str,
    connectivity: Connectivity,
    as_json: bool,
) -> Result<(), CliError> {
    let Some(hit) = ReadPath::new(conn, remote)
        .lookup(kind, code, connectivity)
        .await?
    else {
        println!("No {kind} found for code {code}.");
        return Ok(());
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entity_to_item(&hit.entity))?);
        return Ok(());
    }

    let source = match hit.source {
        LookupSource::Local => "local",
        LookupSource::Remote => "remote",
    };
    let snapshot = &hit.entity.snapshot;
    println!("{} ({source})", snapshot.name);
    println!("  id: {}", snapshot.id);
    if let Some(code) = &snapshot.code {
        println!("  code: {code}");
    }
    if let Some(parent_id) = &snapshot.parent_id {
        println!("  parent: {parent_id}");
    }
    println!("  quantity: {}", snapshot.quantity);
    if let Some(price_cents) = snapshot.price_cents {
        println!("  price_cents: {price_cents}");
    }
    if let Some(notes) = &snapshot.notes {
        println!("  notes: {notes}");
    }
    Ok(())
}
