use std::path::Path;

use stockpile_core::{EntityKind, Inventory};

use crate::commands::common::{
    device_id, open_database, resolve_entity, resolve_parent, short_id,
};
use crate::error::CliError;

pub fn run_move(
    kind: EntityKind,
    id: &str,
    to: Option<String>,
    to_root: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conn = db.connection();
    let entity = resolve_entity(conn, kind, id)?;

    let new_parent_id = match (to, to_root) {
        (Some(target), false) => Some(resolve_parent(conn, &target)?),
        (None, true) => None,
        _ => return Err(CliError::MissingMoveTarget),
    };

    let moved =
        Inventory::new(conn, device_id(conn)?).relocate(kind, &entity.snapshot.id, new_parent_id)?;
    println!("{}", short_id(&moved.snapshot.id));
    Ok(())
}
