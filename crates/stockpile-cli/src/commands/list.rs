use std::path::Path;

use stockpile_core::db::{EntityRepository, SqliteEntityRepository};
use stockpile_core::EntityKind;

use crate::commands::common::{
    entity_to_item, format_entity_lines, open_database, EntityListItem,
};
use crate::error::CliError;

pub fn run_list(
    kind: EntityKind,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let entities = SqliteEntityRepository::new(db.connection()).list(kind, limit, 0)?;

    if as_json {
        let items = entities
            .iter()
            .map(entity_to_item)
            .collect::<Vec<EntityListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if entities.is_empty() {
        println!("No {} recorded.", kind.plural());
        return Ok(());
    }
    for line in format_entity_lines(&entities) {
        println!("{line}");
    }
    Ok(())
}
