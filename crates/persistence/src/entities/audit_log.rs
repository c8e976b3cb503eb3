//! Audit log entity.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for audit logs.
///
/// Column types decode on both backends: PostgreSQL stores `timestamp` as
/// TIMESTAMPTZ and `metadata` as JSONB, SQLite as RFC 3339 text and JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogEntity {
    /// Position in the chain.
    pub id: i64,

    /// Timestamp assigned by the database at insert.
    pub timestamp: DateTime<Utc>,

    /// ID of the principal; nulled when the principal is deleted.
    pub actor_id: Option<Uuid>,

    pub actor_email: Option<String>,

    pub actor_role: Option<String>,

    /// Action performed (format: resource.operation).
    pub action: String,

    pub resource_type: Option<String>,

    pub resource_id: Option<String>,

    pub ip_address: Option<String>,

    pub user_agent: Option<String>,

    pub request_method: Option<String>,

    pub request_path: Option<String>,

    /// One of `success`, `failure`, `error`.
    pub status: String,

    pub error_code: Option<String>,

    pub error_message: Option<String>,

    /// Arbitrary producer payload.
    pub metadata: Option<serde_json::Value>,

    /// Chain link to the predecessor.
    pub previous_hash: Option<String>,
}
