//! Error types for stockpile-core

use thiserror::Error;

/// Result type alias using stockpile-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stockpile-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local durable store failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity, event, mapping, or conflict not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed mutation payload, rejected before anything is enqueued
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transient network failure talking to the remote service
    #[error("Network error: {0}")]
    Network(String),

    /// Remote service rejected a write due to detected divergence
    #[error("Remote conflict: {0}")]
    RemoteConflict(String),
}
