//! Service layer: the append engine, verification and queries.

pub mod audit_logs;
pub mod audit_writer;
pub mod integrity;

pub use audit_logs::AuditLogService;
pub use audit_writer::{spawn_audit_writer, AuditLogger, AuditWriterHandle};
pub use integrity::{immutability_status, IntegrityService};
