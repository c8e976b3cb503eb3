//! Background job scheduler and job implementations.

mod integrity_check;
mod pool_metrics;
mod scheduler;

pub use integrity_check::IntegrityCheckJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
