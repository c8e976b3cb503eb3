//! Database connection pool management.

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{PgPool, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::repositories::{PgAuditLogStore, SqliteAuditLogStore};
use crate::store::{AuditLogStore, Backend, StoreError};

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// SQLite only: how long a writer waits for the database lock.
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Configuration with pool defaults for the given URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
            busy_timeout_ms: 5_000,
        }
    }

    /// Backend selected by the URL scheme.
    pub fn backend(&self) -> Result<Backend, StoreError> {
        Backend::from_url(&self.url)
    }
}

/// Creates a PostgreSQL connection pool with the given configuration.
pub async fn create_pg_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
}

/// Creates a SQLite connection pool in WAL mode.
///
/// WAL lets the verifier hold a read snapshot while the writer commits.
pub async fn create_sqlite_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(options)
        .await
}

/// Connects the store matching the URL scheme.
pub async fn connect_store(config: &DatabaseConfig) -> Result<Arc<dyn AuditLogStore>, StoreError> {
    let store: Arc<dyn AuditLogStore> = match config.backend()? {
        Backend::Postgres => Arc::new(PgAuditLogStore::new(create_pg_pool(config).await?)),
        Backend::Sqlite => Arc::new(SqliteAuditLogStore::new(create_sqlite_pool(config).await?)),
    };

    tracing::info!(backend = %store.backend(), "Connected audit log store");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_config() {
        let config = DatabaseConfig::with_url("postgres://localhost/audit");
        assert_eq!(config.backend().unwrap(), Backend::Postgres);

        let config = DatabaseConfig::with_url("sqlite://data/audit.db");
        assert_eq!(config.backend().unwrap(), Backend::Sqlite);

        let config = DatabaseConfig::with_url("mysql://localhost/audit");
        assert!(matches!(
            config.backend(),
            Err(StoreError::UnsupportedUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_pool_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("audit.db").display());
        let pool = create_sqlite_pool(&DatabaseConfig::with_url(url))
            .await
            .unwrap();

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
