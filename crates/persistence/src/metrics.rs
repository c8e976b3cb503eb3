//! Database metrics collection.
//!
//! Provides functions for recording database-related metrics.

use metrics::{gauge, histogram};
use std::time::Instant;

use crate::store::PoolStats;

/// Record database query duration.
pub fn record_query_duration(query_name: &str, duration_secs: f64) {
    histogram!(
        "database_query_duration_seconds",
        "query" => query_name.to_string()
    )
    .record(duration_secs);
}

/// Record database connection pool metrics.
///
/// Call this function periodically to track pool health.
pub fn record_pool_metrics(backend: &str, stats: PoolStats) {
    let size = stats.size as usize;
    let active = size.saturating_sub(stats.idle);

    gauge!("database_connections_active", "backend" => backend.to_string()).set(active as f64);
    gauge!("database_connections_idle", "backend" => backend.to_string()).set(stats.idle as f64);
    gauge!("database_connections_total", "backend" => backend.to_string()).set(size as f64);
}

/// A helper to time database operations and record metrics.
///
/// Usage:
/// ```ignore
/// let timer = QueryTimer::new("append_chained");
/// let result = sqlx::query_as::<_, AuditLogEntity>(...).fetch_one(&mut *tx).await;
/// timer.record();
/// result
/// ```
pub struct QueryTimer {
    query_name: &'static str,
    start: Instant,
}

impl QueryTimer {
    /// Create a new timer for the given query name.
    pub fn new(query_name: &'static str) -> Self {
        Self {
            query_name,
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration to metrics.
    pub fn record(self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_query_duration(self.query_name, duration);
    }
}
