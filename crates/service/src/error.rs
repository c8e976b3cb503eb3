//! Service-level errors.

use persistence::StoreError;
use thiserror::Error;

/// Errors returned by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Audit writer is no longer running")]
    WriterClosed,

    #[error("Metrics exporter error: {0}")]
    Metrics(String),
}

impl ServiceError {
    /// True when storage rejected a mutation of an existing entry.
    pub fn is_immutability_violation(&self) -> bool {
        matches!(self, ServiceError::Store(err) if err.is_immutability_violation())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    e.message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
            })
            .collect();

        let message = if messages.len() == 1 {
            messages[0].clone()
        } else {
            format!("{} validation errors", messages.len())
        };

        ServiceError::Validation(message)
    }
}

/// Errors that halt the two-phase startup.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Chaining is missing but the enforcer would reject the backfill's writes.
    #[error(
        "immutability enforcer is installed but the chain column is missing; \
         drop the audit_logs triggers, then restart to backfill"
    )]
    EnforcerAlreadyActive,

    #[error("{count} audit log entries have no previous_hash; refusing to install the immutability enforcer")]
    UnchainedEntries { count: i64 },

    #[error("immutability enforcer did not take effect: {0}")]
    EnforcerIncomplete(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
