use std::time::Duration;

use super::retry::RetryPolicy;
use crate::catalog::ProcessCatalog;

/// Store construction knobs: where the database lives and how patient the
/// write path is.
///
/// The database URL resolves from the `DATABASE_URL` environment variable
/// (via `.env` when present), falling back to a local SQLite file, the same
/// resolution the deployment scripts rely on. URLs beginning with
/// `postgres` select the client/server backend.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Database URL, e.g. `sqlite://battery_mes.db` or `postgres://…`.
    pub database_url: String,
    /// Expected-check catalog injected into the completion deriver.
    pub catalog: ProcessCatalog,
    /// SQLite busy timeout / pool acquire bound.
    pub busy_timeout: Duration,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Backoff policy for governed mutations.
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StoreConfig {
    /// `DATABASE_URL` from the environment (loading `.env` when present),
    /// else the local line-station file. Only consulted when no explicit URL
    /// was given.
    fn env_database_url() -> String {
        dotenvy::dotenv().ok();
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://battery_mes.db".to_string())
    }

    /// Creates a config for the given URL (or the environment's when `None`)
    /// with the standard line catalog.
    #[must_use]
    pub fn new(database_url: Option<String>) -> Self {
        Self {
            database_url: database_url.unwrap_or_else(Self::env_database_url),
            catalog: ProcessCatalog::standard_line(),
            busy_timeout: Duration::from_secs(30),
            max_connections: 5,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: ProcessCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the busy timeout.
    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// True when the URL selects the Postgres backend.
    #[must_use]
    pub fn is_postgres(&self) -> bool {
        self.database_url.starts_with("postgres")
    }
}
