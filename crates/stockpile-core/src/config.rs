//! Runtime configuration for the sync core.

use std::time::Duration;

/// Tunables for the sync engine, retention cleanup, and the text index.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Hard cap on automatic retry attempts before an event goes terminal
    pub max_retries: u32,
    /// Maximum number of events pulled per queue batch
    pub batch_size: usize,
    /// Retention window for synced events and confirmed id mappings
    pub retention_days: i64,
    /// Base delay for attempt-count backoff (doubled per attempt)
    pub backoff_base_secs: i64,
    /// Time-to-live before the fuzzy text index is rebuilt from the store
    pub search_ttl: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            batch_size: 50,
            retention_days: 7,
            backoff_base_secs: 30,
            search_ttl: Duration::from_secs(300),
        }
    }
}

impl CoreConfig {
    /// Set the maximum number of automatic retries
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the queue batch size for a sync pass
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the retention window in days
    #[must_use]
    pub const fn with_retention_days(mut self, retention_days: i64) -> Self {
        self.retention_days = retention_days;
        self
    }

    /// Set the backoff base delay in seconds
    #[must_use]
    pub const fn with_backoff_base_secs(mut self, backoff_base_secs: i64) -> Self {
        self.backoff_base_secs = backoff_base_secs;
        self
    }

    /// Set the text index time-to-live
    #[must_use]
    pub const fn with_search_ttl(mut self, search_ttl: Duration) -> Self {
        self.search_ttl = search_ttl;
        self
    }
}
