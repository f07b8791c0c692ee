use std::path::Path;

use stockpile_core::search::SearchIndex;
use stockpile_core::CoreConfig;

use crate::commands::common::{open_database, short_id};
use crate::error::CliError;

pub fn run_search(
    query: &str,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;

    // A fresh index is always rebuilt on the first query; the TTL only
    // matters if this process ever serves more than one.
    let mut index = SearchIndex::new(CoreConfig::default().search_ttl);
    let mut matches = index.search(db.connection(), query)?;
    matches.truncate(limit);

    if as_json {
        let items = matches
            .iter()
            .map(|hit| {
                serde_json::json!({
                    "id": hit.id,
                    "kind": hit.kind.as_str(),
                    "name": hit.name,
                    "code": hit.code,
                })
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for hit in &matches {
        let code = hit.code.as_deref().unwrap_or("-");
        println!(
            "{id:<26}  {kind:<9}  {name:<28}  {code}",
            id = short_id(&hit.id),
            kind = hit.kind.as_str(),
            name = hit.name,
        );
    }
    Ok(())
}
