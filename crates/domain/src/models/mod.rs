//! Domain models for the audit chain.

pub mod audit_log;
pub mod integrity;

pub use audit_log::{
    AuditAction, AuditEvent, AuditLogEntry, AuditLogPage, AuditStatus, ListAuditLogsQuery,
};
pub use integrity::{
    ChainVerificationReport, ImmutabilityStatus, ProtectionState, TamperIssue, TamperedEntry,
    VerificationFailure, VerificationOutcome,
};
