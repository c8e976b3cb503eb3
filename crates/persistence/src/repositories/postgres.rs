//! PostgreSQL audit log store.
//!
//! Appends and the backfill serialize on a transaction-scoped advisory lock,
//! so every service process sharing the database extends one linear chain.
//! Verification reads from a `REPEATABLE READ` snapshot and never blocks
//! writers.

use async_trait::async_trait;
use domain::models::{AuditEvent, AuditLogEntry, ListAuditLogsQuery};
use domain::services::{chain_seed, ChainLinker};
use shared::pagination::PageRequest;
use sqlx::{Executor, PgConnection, PgPool};
use tracing::info;
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

const ENFORCER_SQL: &str = include_str!("../sql/postgres_enforcer.sql");

/// Advisory lock key guarding the chain tail ("audit_lg").
const CHAIN_LOCK_KEY: i64 = 0x6175_6469_745f_6c67;

/// Store for audit log entries in PostgreSQL.
#[derive(Clone)]
pub struct PgAuditLogStore {
    pool: PgPool,
}

impl PgAuditLogStore {
    /// Create a new store instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn lock_chain(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(CHAIN_LOCK_KEY)
        .execute(conn)
        .await?;
    Ok(())
}

async fn fetch_tail(conn: &mut PgConnection) -> Result<Option<AuditLogEntry>, StoreError> {
    let entity = sqlx::query_as::<_, AuditLogEntity>(SELECT_TAIL)
        .fetch_optional(conn)
        .await?;
    entity.map(entity_to_domain).transpose()
}

async fn fetch_batch_after(
    conn: &mut PgConnection,
    cursor: i64,
    limit: i64,
) -> Result<Vec<AuditLogEntity>, sqlx::Error> {
    sqlx::query_as::<_, AuditLogEntity>(SELECT_BATCH_AFTER)
        .bind(cursor)
        .bind(limit)
        .fetch_all(conn)
        .await
}

async fn chain_column_exists(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.columns
            WHERE table_schema = current_schema()
              AND table_name = 'audit_logs'
              AND column_name = 'previous_hash'
        )
        "#,
    )
    .fetch_one(conn)
    .await
}

#[async_trait]
impl AuditLogStore for PgAuditLogStore {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("src/migrations/postgres")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_chained(&self, event: &AuditEvent) -> Result<AuditLogEntry, StoreError> {
        let timer = QueryTimer::new("append_chained");
        let mut tx = self.pool.begin().await?;

        lock_chain(&mut tx).await?;
        let tail = fetch_tail(&mut tx).await?;
        let seed = chain_seed(tail.as_ref());

        let entity = bind_event!(
            sqlx::query_as::<_, AuditLogEntity>(INSERT_CHAINED),
            event,
            seed
        )
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();

        entity_to_domain(entity)
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
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

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
        let filter = AuditLogFilter::from_query(query, |ts| ts);
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
        let mut tx = self.pool.begin().await?;
        lock_chain(&mut tx).await?;

        if chain_column_exists(&mut tx).await? {
            tx.rollback().await?;
            info!("Audit chain column already present, backfill skipped");
            return Ok(0);
        }

        sqlx::query("ALTER TABLE audit_logs ADD COLUMN previous_hash VARCHAR(64)")
            .execute(&mut *tx)
            .await?;

        let mut linker = ChainLinker::new();
        let mut linked = 0u64;
        let mut cursor = CURSOR_START;
        loop {
            let batch = fetch_batch_after(&mut tx, cursor, BACKFILL_BATCH_SIZE).await?;
            let exhausted = (batch.len() as i64) < BACKFILL_BATCH_SIZE;

            for entity in batch {
                cursor = entity.id;
                let entry = entity_to_domain(entity)?;
                let previous_hash = linker.link(&entry);
                sqlx::query(UPDATE_PREVIOUS_HASH)
                    .bind(previous_hash)
                    .bind(entry.id)
                    .execute(&mut *tx)
                    .await?;
                linked += 1;
            }

            if exhausted {
                break;
            }
        }

        sqlx::query(CREATE_PREVIOUS_HASH_INDEX)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(rows = linked, "Audit chain backfill completed");
        Ok(linked)
    }

    async fn install_enforcer(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        (&mut *tx).execute(ENFORCER_SQL).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn enforcer_triggers(&self) -> Result<EnforcerTriggers, StoreError> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT t.tgname::text
            FROM pg_trigger t
            WHERE t.tgrelid = to_regclass('audit_logs')
              AND NOT t.tgisinternal
              AND t.tgenabled <> 'D'
            "#,
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
