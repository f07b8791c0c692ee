//! Settings repository implementation

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;

/// Trait for persisted sync settings
pub trait SettingsRepository {
    /// Stable identifier of this device, created on first access
    fn device_id(&self) -> Result<String>;

    /// Whether the user forced the app offline. Takes precedence over the
    /// actual network signal.
    fn forced_offline(&self) -> Result<bool>;

    /// Set or clear the forced-offline override
    fn set_forced_offline(&self, forced: bool) -> Result<()>;

    /// When the last successful sync pass finished (Unix ms)
    fn last_sync_at(&self) -> Result<Option<i64>>;

    /// Record the completion time of a sync pass
    fn set_last_sync_at(&self, at: i64) -> Result<()>;
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM settings WHERE key = ?",
            params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn device_id(&self) -> Result<String> {
        if let Some(id) = self.get_setting("device_id")? {
            return Ok(id);
        }
        let id = Uuid::now_v7().to_string();
        self.set_setting("device_id", &id)?;
        Ok(id)
    }

    fn forced_offline(&self) -> Result<bool> {
        Ok(self
            .get_setting("forced_offline")?
            .is_some_and(|value| value == "true"))
    }

    fn set_forced_offline(&self, forced: bool) -> Result<()> {
        self.set_setting("forced_offline", if forced { "true" } else { "false" })
    }

    fn last_sync_at(&self) -> Result<Option<i64>> {
        Ok(self
            .get_setting("last_sync_at")?
            .and_then(|value| value.parse().ok()))
    }

    fn set_last_sync_at(&self, at: i64) -> Result<()> {
        self.set_setting("last_sync_at", &at.to_string())
    }
}
