//! Scheduled verification of the audit chain.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::scheduler::{Job, JobFrequency};
use crate::services::IntegrityService;

/// Re-verifies the whole chain and checks the enforcer is still installed.
///
/// Tampering is reported through the verifier's `error!` logs and gauges;
/// only an unreadable chain or a missing enforcer fails the job.
pub struct IntegrityCheckJob {
    service: IntegrityService,
    interval_mins: u64,
}

impl IntegrityCheckJob {
    pub fn new(service: IntegrityService, interval_mins: u64) -> Self {
        Self {
            service,
            interval_mins: interval_mins.max(1),
        }
    }
}

#[async_trait::async_trait]
impl Job for IntegrityCheckJob {
    fn name(&self) -> &'static str {
        "audit_integrity_check"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_mins)
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<(), String> {
        let outcome = self.service.verify_integrity_with_cancel(cancel).await;
        let report = match outcome.report() {
            Some(report) => report,
            None => return Err(outcome.message().to_string()),
        };

        if let Some(head_hash) = report.head_hash.as_deref() {
            info!(
                head_hash,
                total = report.total_logs,
                "Audit chain checkpoint"
            );
        }

        let status = self
            .service
            .immutability_status()
            .await
            .map_err(|e| e.to_string())?;
        if !status.is_fully_protected {
            error!(message = %status.message, "Audit log immutability enforcer missing");
            return Err(status.message);
        }

        Ok(())
    }
}
