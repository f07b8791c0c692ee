//! Local durable store for Stockpile

mod connection;
mod conflict_repository;
mod entity_repository;
mod event_queue;
mod migrations;
mod settings_repository;

pub use connection::Database;
pub use conflict_repository::{ConflictRepository, SqliteConflictRepository};
pub use entity_repository::{EntityRepository, SqliteEntityRepository};
pub use event_queue::{EventQueue, SqliteEventQueue};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
