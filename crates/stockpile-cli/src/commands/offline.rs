use std::path::Path;

use stockpile_core::db::{EventQueue, SettingsRepository, SqliteEventQueue, SqliteSettingsRepository};

use crate::commands::common::open_database;
use crate::error::CliError;

pub fn run_offline_set(forced: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    SqliteSettingsRepository::new(db.connection()).set_forced_offline(forced)?;

    if forced {
        println!("Forced offline. Writes keep queueing locally; sync passes are skipped.");
    } else {
        println!("Back to automatic connectivity. Run `stockpile sync` to push queued work.");
    }
    Ok(())
}

pub fn run_offline_status(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let forced = SqliteSettingsRepository::new(db.connection()).forced_offline()?;
    let pending = SqliteEventQueue::new(db.connection()).pending_count()?;

    println!(
        "Forced offline: {}",
        if forced { "yes" } else { "no" }
    );
    println!("Pending events: {pending}");
    Ok(())
}
