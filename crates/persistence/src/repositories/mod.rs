//! Audit log store implementations.

pub mod audit_log;
pub mod postgres;
pub mod sqlite;

pub use postgres::PgAuditLogStore;
pub use sqlite::{sqlite_timestamp, SqliteAuditLogStore};
