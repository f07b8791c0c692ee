use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stockpile_core::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No entity name provided")]
    EmptyName,
    #[error("Entity not found for id/code/prefix: {0}")]
    EntityNotFound(String),
    #[error("{0}")]
    AmbiguousEntityId(String),
    #[error("Conflict not found for id/prefix: {0}")]
    ConflictNotFound(String),
    #[error("{0}")]
    AmbiguousConflictId(String),
    #[error("Invalid merge selection: {0}")]
    InvalidMergeTake(String),
    #[error("Pass either --to <ID> or --to-root")]
    MissingMoveTarget,
    #[error("Pass an event id or --all")]
    MissingRetryTarget,
    #[error("Remote configuration error: {0}")]
    Remote(String),
    #[error(
        "Sync is not configured. Set STOCKPILE_REMOTE_URL (and optionally STOCKPILE_REMOTE_TOKEN) to enable `stockpile sync`."
    )]
    SyncNotConfigured,
}
