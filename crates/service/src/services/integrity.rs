//! Chain verification and immutability status.

use std::ops::ControlFlow;
use std::sync::Arc;

use domain::models::{
    AuditLogEntry, ChainVerificationReport, ImmutabilityStatus, VerificationFailure,
    VerificationOutcome,
};
use domain::services::ChainVerifier;
use persistence::{AuditLogStore, ScanCompletion, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::metrics::{record_immutability, record_verification};

const CANCELLED: &str = "verification cancelled";

/// Verifies the audit chain and reports on storage-level protection.
#[derive(Clone)]
pub struct IntegrityService {
    store: Arc<dyn AuditLogStore>,
    batch_size: u32,
}

impl IntegrityService {
    pub fn new(store: Arc<dyn AuditLogStore>, batch_size: u32) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Walk the whole chain from a single snapshot.
    ///
    /// Storage errors are returned as [`VerificationOutcome::Failed`], never raised.
    pub async fn verify_integrity(&self) -> VerificationOutcome {
        self.verify_integrity_with_cancel(&CancellationToken::new())
            .await
    }

    /// As [`verify_integrity`](Self::verify_integrity), stopping early once
    /// `cancel` fires. A cancelled run yields a failure, not a partial report.
    pub async fn verify_integrity_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> VerificationOutcome {
        let mut verifier = ChainVerifier::new();

        let scan = {
            let mut visit = |entry: AuditLogEntry| {
                if cancel.is_cancelled() {
                    return ControlFlow::Break(());
                }
                verifier.observe(entry);
                ControlFlow::Continue(())
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Ok(ScanCompletion::Stopped),
                result = self.store.scan_ordered(self.batch_size, &mut visit) => result,
            }
        };

        match scan {
            Ok(ScanCompletion::Finished) => {
                let report = verifier.finish();
                log_report(&report);
                VerificationOutcome::Completed(report)
            }
            Ok(ScanCompletion::Stopped) => {
                warn!(observed = verifier.observed(), "Audit chain verification cancelled");
                failed(CANCELLED)
            }
            Err(e) => {
                error!(error = %e, "Audit chain verification failed");
                failed(e.to_string())
            }
        }
    }

    /// Whether the delete and update protections are installed.
    pub async fn immutability_status(&self) -> Result<ImmutabilityStatus, StoreError> {
        immutability_status(self.store.as_ref()).await
    }
}

/// Inspect the storage triggers backing the immutability enforcer.
pub async fn immutability_status(
    store: &dyn AuditLogStore,
) -> Result<ImmutabilityStatus, StoreError> {
    let triggers = store.enforcer_triggers().await?;
    let status = ImmutabilityStatus::new(triggers.delete_installed, triggers.update_installed);
    record_immutability(status.is_fully_protected);
    Ok(status)
}

fn failed(error: impl Into<String>) -> VerificationOutcome {
    record_verification("failed", 0, 0);
    VerificationOutcome::Failed(VerificationFailure::new(error))
}

fn log_report(report: &ChainVerificationReport) {
    let tampered = report.tampered_entries.len();
    if report.is_valid {
        record_verification("valid", report.total_logs, tampered);
        info!(
            total = report.total_logs,
            head_hash = report.head_hash.as_deref().unwrap_or(""),
            "{}",
            report.message
        );
    } else {
        record_verification("tampered", report.total_logs, tampered);
        for entry in &report.tampered_entries {
            error!(
                id = entry.id,
                action = %entry.action,
                issue = %entry.issue,
                "Audit chain entry flagged"
            );
        }
        error!(total = report.total_logs, tampered, "{}", report.message);
    }
}
