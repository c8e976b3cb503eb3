//! Background job to record connection pool metrics.

use std::sync::Arc;

use persistence::AuditLogStore;
use tokio_util::sync::CancellationToken;

use super::scheduler::{Job, JobFrequency};

/// Records pool size and idle connections every 10 seconds.
pub struct PoolMetricsJob {
    store: Arc<dyn AuditLogStore>,
}

impl PoolMetricsJob {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(10)
    }

    async fn execute(&self, _cancel: &CancellationToken) -> Result<(), String> {
        let backend = self.store.backend().to_string();
        persistence::metrics::record_pool_metrics(&backend, self.store.pool_stats());
        Ok(())
    }
}
