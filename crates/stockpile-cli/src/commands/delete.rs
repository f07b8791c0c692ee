use std::path::Path;

use stockpile_core::{EntityKind, Inventory};

use crate::commands::common::{device_id, open_database, resolve_entity, short_id};
use crate::error::CliError;

pub fn run_delete(kind: EntityKind, id: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conn = db.connection();
    let entity = resolve_entity(conn, kind, id)?;

    Inventory::new(conn, device_id(conn)?).delete(kind, &entity.snapshot.id)?;
    println!("{}", short_id(&entity.snapshot.id));
    Ok(())
}
