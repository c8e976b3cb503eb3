//! Common test utilities for integration tests.
//!
//! Tests run against throwaway SQLite databases. PostgreSQL helpers are used
//! only when `TEST_DATABASE_URL` is set.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use audit_chain_service::config::AuditConfig;
use domain::models::{AuditEvent, AuditLogEntry, AuditStatus, ListAuditLogsQuery};
use persistence::db::{create_sqlite_pool, DatabaseConfig};
use persistence::repositories::SqliteAuditLogStore;
use persistence::store::EntryVisitor;
use persistence::{
    AuditLogStore, Backend, EnforcerTriggers, PoolStats, ScanCompletion, StoreError,
};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

/// A SQLite database in a temporary directory.
pub struct TestDb {
    pub store: Arc<dyn AuditLogStore>,
    pub pool: SqlitePool,
    pub url: String,
    _dir: TempDir,
}

impl TestDb {
    /// Fresh database with the pre-chaining schema and no rows.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let url = format!("sqlite://{}", dir.path().join("audit.db").display());
        let pool = sqlite_pool(&url).await;

        let store: Arc<dyn AuditLogStore> = Arc::new(SqliteAuditLogStore::new(pool.clone()));
        store
            .run_migrations()
            .await
            .expect("Failed to run migrations");

        Self {
            store,
            pool,
            url,
            _dir: dir,
        }
    }

    /// Fresh database with the chain column in place but no enforcer.
    pub async fn chained() -> Self {
        let db = Self::new().await;
        db.store
            .backfill_chain()
            .await
            .expect("Failed to add chain column");
        db
    }

    /// A second, independent store over the same file (another process).
    pub async fn second_store(&self) -> Arc<dyn AuditLogStore> {
        let pool = sqlite_pool(&self.url).await;
        Arc::new(SqliteAuditLogStore::new(pool))
    }

    /// Insert a row the way pre-chaining code did: no `previous_hash`.
    pub async fn insert_legacy(&self, action: &str, timestamp: &str, email: &str) {
        sqlx::query(
            "INSERT INTO audit_logs (timestamp, actor_id, actor_email, action, status, metadata) \
             VALUES ($1, $2, $3, $4, 'success', $5)",
        )
        .bind(timestamp)
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(action)
        .bind(r#"{"source":"legacy","batch":1}"#)
        .execute(&self.pool)
        .await
        .expect("Failed to insert legacy row");
    }

    pub async fn append(&self, action: &str) -> AuditLogEntry {
        self.store
            .append_chained(&event(action))
            .await
            .expect("Failed to append")
    }

    pub async fn all_entries(&self) -> Vec<AuditLogEntry> {
        collect_entries(self.store.as_ref()).await
    }

    /// Direct SQL, bypassing the store.
    pub async fn exec(&self, sql: &str) -> Result<u64, sqlx::Error> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
    }
}

async fn sqlite_pool(url: &str) -> SqlitePool {
    let mut config = DatabaseConfig::with_url(url);
    config.max_connections = 8;
    create_sqlite_pool(&config)
        .await
        .expect("Failed to open SQLite database")
}

pub async fn collect_entries(store: &dyn AuditLogStore) -> Vec<AuditLogEntry> {
    let mut entries = Vec::new();
    let mut visit = |entry: AuditLogEntry| {
        entries.push(entry);
        ControlFlow::Continue(())
    };
    let completion = store
        .scan_ordered(100, &mut visit)
        .await
        .expect("Failed to scan");
    assert_eq!(completion, ScanCompletion::Finished);
    entries
}

/// A valid event with a typical set of fields.
pub fn event(action: &str) -> AuditEvent {
    let mut event = AuditEvent::new(action, AuditStatus::Success);
    event.actor_id = Some(Uuid::new_v4());
    event.actor_email = Some("clinician@example.org".to_string());
    event.actor_role = Some("clinician".to_string());
    event.resource_type = Some("patient".to_string());
    event.resource_id = Some("p-1001".to_string());
    event.ip_address = Some("10.1.2.3".to_string());
    event.request_method = Some("GET".to_string());
    event.request_path = Some("/patients/p-1001".to_string());
    event.metadata = Some(serde_json::json!({ "fields": ["dob", "mrn"], "reason": "care" }));
    event
}

pub fn audit_config(queue_capacity: usize, enqueue_timeout_ms: u64) -> AuditConfig {
    AuditConfig {
        queue_capacity,
        enqueue_timeout_ms,
        verify_batch_size: 3,
        integrity_check_interval_mins: 60,
        shutdown_timeout_secs: 5,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Store wrapper that can fail or hold appends.
pub struct HookedStore {
    inner: Arc<dyn AuditLogStore>,
    fail_action: Option<String>,
    gate: Option<Arc<Semaphore>>,
    pub entered: Arc<Notify>,
}

impl HookedStore {
    pub fn new(inner: Arc<dyn AuditLogStore>) -> Self {
        Self {
            inner,
            fail_action: None,
            gate: None,
            entered: Arc::new(Notify::new()),
        }
    }

    /// Appends of `action` fail with a database error.
    pub fn failing_on(mut self, action: &str) -> Self {
        self.fail_action = Some(action.to_string());
        self
    }

    /// Appends wait for a permit on `gate`.
    pub fn gated_by(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl AuditLogStore for HookedStore {
    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        self.inner.run_migrations().await
    }

    async fn append_chained(&self, event: &AuditEvent) -> Result<AuditLogEntry, StoreError> {
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.fail_action.as_deref() == Some(event.action.as_str()) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.append_chained(event).await
    }

    async fn tail(&self) -> Result<Option<AuditLogEntry>, StoreError> {
        self.inner.tail().await
    }

    async fn scan_ordered(
        &self,
        batch_size: u32,
        visitor: &mut EntryVisitor<'_>,
    ) -> Result<ScanCompletion, StoreError> {
        self.inner.scan_ordered(batch_size, visitor).await
    }

    async fn list(
        &self,
        query: &ListAuditLogsQuery,
    ) -> Result<(Vec<AuditLogEntry>, i64), StoreError> {
        self.inner.list(query).await
    }

    async fn count(&self) -> Result<i64, StoreError> {
        self.inner.count().await
    }

    async fn detach_actor(&self, actor_id: Uuid) -> Result<u64, StoreError> {
        self.inner.detach_actor(actor_id).await
    }

    async fn has_chain_column(&self) -> Result<bool, StoreError> {
        self.inner.has_chain_column().await
    }

    async fn count_unchained(&self) -> Result<i64, StoreError> {
        self.inner.count_unchained().await
    }

    async fn backfill_chain(&self) -> Result<u64, StoreError> {
        self.inner.backfill_chain().await
    }

    async fn install_enforcer(&self) -> Result<(), StoreError> {
        self.inner.install_enforcer().await
    }

    async fn enforcer_triggers(&self) -> Result<EnforcerTriggers, StoreError> {
        self.inner.enforcer_triggers().await
    }

    fn pool_stats(&self) -> PoolStats {
        self.inner.pool_stats()
    }
}
