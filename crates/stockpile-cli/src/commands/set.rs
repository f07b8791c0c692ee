use std::path::Path;

use serde_json::Value;
use stockpile_core::models::ScalarField;
use stockpile_core::{EntityKind, Inventory};

use crate::commands::common::{
    device_id, open_database, resolve_category, resolve_entity, short_id,
};
use crate::error::CliError;

pub struct SetOptions {
    pub name: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<i64>,
    pub price_cents: Option<i64>,
    pub notes: Option<String>,
}

/// An empty string clears an optional text field
fn text_value(text: String) -> Value {
    if text.trim().is_empty() {
        Value::Null
    } else {
        Value::String(text)
    }
}

pub fn run_set(
    kind: EntityKind,
    id: &str,
    options: SetOptions,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conn = db.connection();
    let entity = resolve_entity(conn, kind, id)?;

    let mut changes: Vec<(ScalarField, Value)> = Vec::new();
    if let Some(name) = options.name {
        changes.push((ScalarField::Name, Value::String(name)));
    }
    if let Some(code) = options.code {
        changes.push((ScalarField::Code, text_value(code)));
    }
    if let Some(category) = options.category {
        let value = if category.trim().is_empty() {
            Value::Null
        } else {
            Value::String(resolve_category(conn, &category)?)
        };
        changes.push((ScalarField::CategoryId, value));
    }
    if let Some(quantity) = options.quantity {
        changes.push((ScalarField::Quantity, Value::from(quantity)));
    }
    if let Some(price_cents) = options.price_cents {
        changes.push((ScalarField::PriceCents, Value::from(price_cents)));
    }
    if let Some(notes) = options.notes {
        changes.push((ScalarField::Notes, text_value(notes)));
    }

    if changes.is_empty() {
        println!("{}", short_id(&entity.snapshot.id));
        return Ok(());
    }

    let updated =
        Inventory::new(conn, device_id(conn)?).update(kind, &entity.snapshot.id, &changes)?;
    println!("{}", short_id(&updated.snapshot.id));
    Ok(())
}
