//! Stockpile CLI - Offline-first inventory tracking from the terminal
//!
//! Every write lands in the local store immediately; `stockpile sync`
//! reconciles with the remote backend when connectivity allows.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands, OfflineCommands, SyncCommands};
use crate::commands::common::resolve_db_path;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stockpile=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Add {
            kind,
            name,
            code,
            parent,
            category,
            quantity,
            price_cents,
            notes,
        } => {
            commands::add::run_add(
                kind.into(),
                &name,
                commands::add::AddOptions {
                    code,
                    parent,
                    category,
                    quantity,
                    price_cents,
                    notes,
                },
                &db_path,
            )?;
        }
        Commands::List { kind, limit, json } => {
            commands::list::run_list(kind.into(), limit, json, &db_path)?;
        }
        Commands::Set {
            kind,
            id,
            name,
            code,
            category,
            quantity,
            price_cents,
            notes,
        } => {
            commands::set::run_set(
                kind.into(),
                &id,
                commands::set::SetOptions {
                    name,
                    code,
                    category,
                    quantity,
                    price_cents,
                    notes,
                },
                &db_path,
            )?;
        }
        Commands::Move { kind, id, to, to_root } => {
            commands::relocate::run_move(kind.into(), &id, to, to_root, &db_path)?;
        }
        Commands::Delete { kind, id } => {
            commands::delete::run_delete(kind.into(), &id, &db_path)?;
        }
        Commands::Lookup { kind, code, json } => {
            commands::lookup::run_lookup(kind.into(), &code, json, &db_path).await?;
        }
        Commands::Search { query, limit, json } => {
            commands::search::run_search(&query, limit, json, &db_path)?;
        }
        Commands::Sync { command } => match command {
            None | Some(SyncCommands::Run) => commands::sync::run_sync(&db_path).await?,
            Some(SyncCommands::Status { json }) => {
                commands::sync::run_sync_status(json, &db_path)?;
            }
            Some(SyncCommands::Conflicts { json }) => {
                commands::sync::run_sync_conflicts(json, &db_path)?;
            }
            Some(SyncCommands::Resolve { id, strategy, take }) => {
                commands::sync::run_sync_resolve(&id, strategy, &take, &db_path)?;
            }
            Some(SyncCommands::Retry { id, all }) => {
                commands::sync::run_sync_retry(id.as_deref(), all, &db_path)?;
            }
        },
        Commands::Offline { command } => match command {
            OfflineCommands::On => commands::offline::run_offline_set(true, &db_path)?,
            OfflineCommands::Off => commands::offline::run_offline_set(false, &db_path)?,
            OfflineCommands::Status => commands::offline::run_offline_status(&db_path)?,
        },
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
