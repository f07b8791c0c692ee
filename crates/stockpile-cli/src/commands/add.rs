use std::path::Path;

use stockpile_core::{EntityDraft, EntityKind, Inventory};

use crate::commands::common::{
    device_id, open_database, resolve_category, resolve_parent, short_id,
};
use crate::error::CliError;

pub struct AddOptions {
    pub code: Option<String>,
    pub parent: Option<String>,
    pub category: Option<String>,
    pub quantity: i64,
    pub price_cents: Option<i64>,
    pub notes: Option<String>,
}

pub fn run_add(
    kind: EntityKind,
    name_parts: &[String],
    options: AddOptions,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = name_parts.join(" ");
    if name.trim().is_empty() {
        return Err(CliError::EmptyName);
    }

    let db = open_database(db_path)?;
    let conn = db.connection();

    let mut draft = EntityDraft::new(kind, name);
    draft.code = options.code;
    draft.quantity = options.quantity;
    draft.price_cents = options.price_cents;
    draft.notes = options.notes;
    if let Some(parent) = &options.parent {
        draft.parent_id = Some(resolve_parent(conn, parent)?);
    }
    if let Some(category) = &options.category {
        draft.category_id = Some(resolve_category(conn, category)?);
    }

    let entity = Inventory::new(conn, device_id(conn)?).create(draft)?;
    println!("{}", short_id(&entity.snapshot.id));
    Ok(())
}
