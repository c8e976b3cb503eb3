//! Storage abstraction for the audit chain.
//!
//! Both backends implement [`AuditLogStore`]. Every write that extends the
//! chain goes through [`AuditLogStore::append_chained`], which reads the tail,
//! derives the seed and inserts under one storage-level lock.

use async_trait::async_trait;
use domain::models::{AuditEvent, AuditLogEntry, ListAuditLogsQuery};
use std::ops::ControlFlow;
use thiserror::Error;
use uuid::Uuid;

/// Trigger rejecting DELETE on `audit_logs`.
pub const DELETE_TRIGGER: &str = "audit_logs_no_delete";

/// Trigger rejecting UPDATE on `audit_logs` (except nulling `actor_id`).
pub const UPDATE_TRIGGER: &str = "audit_logs_no_update";

/// SQLSTATE raised by the enforcer triggers (`integrity_constraint_violation`).
const IMMUTABILITY_SQLSTATE: &str = "23000";

/// Marker present in every enforcer error message.
const IMMUTABILITY_MARKER: &str = "append-only";

/// Present when the trigger could name the rejected row.
const ENTRY_ID_MARKER: &str = "of entry ";

/// Storage layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A DELETE or UPDATE was rejected by the enforcer triggers.
    #[error("immutability violation: {0}")]
    ImmutabilityViolation(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped to the domain model.
    #[error("invalid audit log row {id}: {reason}")]
    InvalidRow { id: i64, reason: String },

    #[error("unsupported database url '{0}' (expected postgres:// or sqlite:)")]
    UnsupportedUrl(String),
}

impl StoreError {
    pub fn is_immutability_violation(&self) -> bool {
        matches!(self, StoreError::ImmutabilityViolation(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let by_code = db_err.code().as_deref() == Some(IMMUTABILITY_SQLSTATE);
            if by_code || db_err.message().contains(IMMUTABILITY_MARKER) {
                return StoreError::ImmutabilityViolation(violation_message(db_err.message()));
            }
        }
        StoreError::Database(err)
    }
}

/// Enforcer message, noting when the engine could not name the entry.
///
/// SQLite triggers can only raise literal text, so their rejections carry no
/// id; TRUNCATE is statement-level and has none to report.
fn violation_message(message: &str) -> String {
    if message.contains(ENTRY_ID_MARKER) || message.contains("TRUNCATE") {
        message.to_string()
    } else {
        format!(
            "{} (entry id not reported by the storage engine; see the rejected statement's target rows)",
            message
        )
    }
}

/// Storage engine behind a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    /// Select the backend from a database URL scheme.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Backend::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Backend::Sqlite)
        } else {
            Err(StoreError::UnsupportedUrl(url.to_string()))
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Postgres => f.write_str("postgres"),
            Backend::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// How an ordered scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCompletion {
    /// Every row was visited.
    Finished,
    /// The visitor asked to stop early.
    Stopped,
}

/// Which enforcer triggers are currently installed and enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnforcerTriggers {
    pub delete_installed: bool,
    pub update_installed: bool,
}

impl EnforcerTriggers {
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            delete_installed: names.iter().any(|n| n.as_ref() == DELETE_TRIGGER),
            update_installed: names.iter().any(|n| n.as_ref() == UPDATE_TRIGGER),
        }
    }

    pub fn any_installed(&self) -> bool {
        self.delete_installed || self.update_installed
    }
}

/// Connection pool snapshot for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

/// Row visitor used by [`AuditLogStore::scan_ordered`].
pub type EntryVisitor<'a> = dyn FnMut(AuditLogEntry) -> ControlFlow<()> + Send + 'a;

/// Persistent, append-only audit log.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    fn backend(&self) -> Backend;

    /// Apply embedded schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    /// Append `event` chained to the current tail.
    ///
    /// Reading the tail, computing the seed and inserting happen under one
    /// storage lock, so concurrent appenders (in any process) observe a
    /// linear history.
    async fn append_chained(&self, event: &AuditEvent) -> Result<AuditLogEntry, StoreError>;

    /// Entry with the highest `id`.
    async fn tail(&self) -> Result<Option<AuditLogEntry>, StoreError>;

    /// Visit every entry in ascending `id` order from a single snapshot.
    async fn scan_ordered(
        &self,
        batch_size: u32,
        visitor: &mut EntryVisitor<'_>,
    ) -> Result<ScanCompletion, StoreError>;

    /// Filtered page of entries (newest first) and the total match count.
    async fn list(&self, query: &ListAuditLogsQuery)
        -> Result<(Vec<AuditLogEntry>, i64), StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    /// Null `actor_id` on every entry of a deleted principal.
    async fn detach_actor(&self, actor_id: Uuid) -> Result<u64, StoreError>;

    /// Whether the `previous_hash` column exists.
    async fn has_chain_column(&self) -> Result<bool, StoreError>;

    /// Rows with no `previous_hash`; every row while the column does not exist.
    async fn count_unchained(&self) -> Result<i64, StoreError>;

    /// Add the chain column and link every existing row.
    ///
    /// Returns the number of rows linked, or 0 without touching anything when
    /// the column already exists.
    async fn backfill_chain(&self) -> Result<u64, StoreError>;

    /// Install the enforcer triggers. Idempotent.
    async fn install_enforcer(&self) -> Result<(), StoreError>;

    async fn enforcer_triggers(&self) -> Result<EnforcerTriggers, StoreError>;

    fn pool_stats(&self) -> PoolStats;
}
