//! SQLite audit log store.
//!
//! Writes run in `BEGIN IMMEDIATE` transactions, which take the database
//! write lock before the tail is read; concurrent writers wait on the busy
//! timeout instead of forking the chain. Reads rely on the WAL snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{AuditEvent, AuditLogEntry, ListAuditLogsQuery};
use domain::services::{chain_seed, ChainLinker};
use shared::pagination::PageRequest;
use sqlx::pool::PoolConnection;
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use super::audit_log::{
    bind_event, bind_query_filters, entity_to_domain, list_statements, AuditLogFilter,
    BACKFILL_BATCH_SIZE, CREATE_PREVIOUS_HASH_INDEX, CURSOR_START, DETACH_ACTOR, INSERT_CHAINED,
    SELECT_BATCH_AFTER, SELECT_TAIL, UPDATE_PREVIOUS_HASH,
};
use crate::entities::AuditLogEntity;
use crate::metrics::QueryTimer;
use crate::store::{
    AuditLogStore, Backend, EnforcerTriggers, EntryVisitor, PoolStats, ScanCompletion, StoreError,
};

const ENFORCER_SQL: &str = include_str!("../sql/sqlite_enforcer.sql");

/// Text form of stored timestamps; fixed width so it sorts chronologically.
pub fn sqlite_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Store for audit log entries in SQLite.
#[derive(Clone)]
pub struct SqliteAuditLogStore {
    pool: SqlitePool,
}

impl SqliteAuditLogStore {
    /// Create a new store instance.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Acquire a connection holding the database write lock.
    async fn begin_immediate(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }
}

/// Commit on success, roll back on failure, and hand back `result`.
async fn finish<T>(
    conn: &mut SqliteConnection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT").execute(conn).await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(conn).await {
                warn!(error = %rollback_err, "Failed to roll back audit log transaction");
            }
            Err(err)
        }
    }
}

async fn fetch_tail(conn: &mut SqliteConnection) -> Result<Option<AuditLogEntry>, StoreError> {
    let entity = sqlx::query_as::<_, AuditLogEntity>(SELECT_TAIL)
        .fetch_optional(conn)
        .await?;
    entity.map(entity_to_domain).transpose()
}

async fn fetch_batch_after(
    conn: &mut SqliteConnection,
    cursor: i64,
    limit: i64,
) -> Result<Vec<AuditLogEntity>, sqlx::Error> {
    sqlx::query_as::<_, AuditLogEntity>(SELECT_BATCH_AFTER)
        .bind(cursor)
        .bind(limit)
        .fetch_all(conn)
        .await
}

async fn chain_column_exists(conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('audit_logs') WHERE name = 'previous_hash'",
    )
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

async fn append_locked(
    conn: &mut SqliteConnection,
    event: &AuditEvent,
) -> Result<AuditLogEntry, StoreError> {
    let tail = fetch_tail(&mut *conn).await?;
    let seed = chain_seed(tail.as_ref());

    let entity = bind_event!(
        sqlx::query_as::<_, AuditLogEntity>(INSERT_CHAINED),
        event,
        seed
    )
    .fetch_one(&mut *conn)
    .await?;

    entity_to_domain(entity)
}

async fn backfill_locked(conn: &mut SqliteConnection) -> Result<u64, StoreError> {
    if chain_column_exists(&mut *conn).await? {
        return Ok(0);
    }

    sqlx::query("ALTER TABLE audit_logs ADD COLUMN previous_hash TEXT")
        .execute(&mut *conn)
        .await?;

    let mut linker = ChainLinker::new();
    let mut linked = 0u64;
    let mut cursor = CURSOR_START;
    loop {
        let batch = fetch_batch_after(&mut *conn, cursor, BACKFILL_BATCH_SIZE).await?;
        let exhausted = (batch.len() as i64) < BACKFILL_BATCH_SIZE;

        for entity in batch {
            cursor = entity.id;
            let entry = entity_to_domain(entity)?;
            let previous_hash = linker.link(&entry);
            sqlx::query(UPDATE_PREVIOUS_HASH)
                .bind(previous_hash)
                .bind(entry.id)
                .execute(&mut *conn)
                .await?;
            linked += 1;
        }

        if exhausted {
            break;
        }
    }

    sqlx::query(CREATE_PREVIOUS_HASH_INDEX)
        .execute(&mut *conn)
        .await?;

    Ok(linked)
}

#[async_trait]
impl AuditLogStore for SqliteAuditLogStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("src/migrations/sqlite")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_chained(&self, event: &AuditEvent) -> Result<AuditLogEntry, StoreError> {
        let timer = QueryTimer::new("append_chained");
        let mut conn = self.begin_immediate().await?;
        let result = append_locked(&mut conn, event).await;
        let entry = finish(&mut conn, result).await?;
        timer.record();
        Ok(entry)
    }

    async fn tail(&self) -> Result<Option<AuditLogEntry>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_tail(&mut conn).await
    }

    async fn scan_ordered(
        &self,
        batch_size: u32,
        visitor: &mut EntryVisitor<'_>,
    ) -> Result<ScanCompletion, StoreError> {
        let limit = i64::from(batch_size.max(1));
        // Deferred transaction: the first SELECT pins the WAL snapshot.
        let mut tx = self.pool.begin().await?;

        let mut cursor = CURSOR_START;
        loop {
            let timer = QueryTimer::new("scan_batch");
            let batch = fetch_batch_after(&mut tx, cursor, limit).await?;
            timer.record();

            let exhausted = (batch.len() as i64) < limit;
            for entity in batch {
                cursor = entity.id;
                if visitor(entity_to_domain(entity)?).is_break() {
                    tx.rollback().await?;
                    return Ok(ScanCompletion::Stopped);
                }
            }

            if exhausted {
                break;
            }
        }

        tx.commit().await?;
        Ok(ScanCompletion::Finished)
    }

    async fn list(
        &self,
        query: &ListAuditLogsQuery,
    ) -> Result<(Vec<AuditLogEntry>, i64), StoreError> {
        let timer = QueryTimer::new("list_audit_logs");
        let page = PageRequest::new(query.page, query.limit);
        let filter = AuditLogFilter::from_query(query, sqlite_timestamp);
        let (list_sql, count_sql) = list_statements(&filter);

        let count_builder = sqlx::query_scalar::<_, i64>(&count_sql);
        let total: i64 = bind_query_filters!(count_builder, &filter)
            .fetch_one(&self.pool)
            .await?;

        let list_builder = sqlx::query_as::<_, AuditLogEntity>(&list_sql);
        let entities = bind_query_filters!(list_builder, &filter)
            .bind(i64::from(page.limit))
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        timer.record();

        let entries = entities
            .into_iter()
            .map(entity_to_domain)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((entries, total))
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn detach_actor(&self, actor_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(DETACH_ACTOR)
            .bind(actor_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn has_chain_column(&self) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(chain_column_exists(&mut conn).await?)
    }

    async fn count_unchained(&self) -> Result<i64, StoreError> {
        if !self.has_chain_column().await? {
            return self.count().await;
        }

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE previous_hash IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn backfill_chain(&self) -> Result<u64, StoreError> {
        let mut conn = self.begin_immediate().await?;
        let result = backfill_locked(&mut conn).await;
        let linked = finish(&mut conn, result).await?;

        if linked == 0 {
            info!("Audit chain backfill had nothing to link");
        } else {
            info!(rows = linked, "Audit chain backfill completed");
        }
        Ok(linked)
    }

    async fn install_enforcer(&self) -> Result<(), StoreError> {
        let mut conn = self.begin_immediate().await?;
        let result = (&mut *conn)
            .execute(ENFORCER_SQL)
            .await
            .map(|_| ())
            .map_err(StoreError::from);
        finish(&mut conn, result).await
    }

    async fn enforcer_triggers(&self) -> Result<EnforcerTriggers, StoreError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'trigger' AND tbl_name = 'audit_logs'",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(EnforcerTriggers::from_names(&names))
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }
}
