//! Audit log domain models.
//!
//! An [`AuditLogEntry`] is one row of the append-only log. Producers never
//! build entries directly: they submit an [`AuditEvent`] and the storage
//! layer assigns `id`, `timestamp` and the chain link `previous_hash`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use shared::pagination::Pagination;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
    Error,
}

impl AuditStatus {
    /// Stored and hashed representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
            AuditStatus::Error => "error",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditStatus::Success),
            "failure" => Ok(AuditStatus::Failure),
            "error" => Ok(AuditStatus::Error),
            _ => Err(format!("Unknown audit status: {}", s)),
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known actions emitted by the clinical platform.
///
/// Producers may log any dotted action string; these are the ones the
/// platform itself relies on in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Authentication
    AuthLogin,
    AuthLoginFailed,
    AuthLogout,

    // Protected health information
    PhiRead,
    PhiCreate,
    PhiUpdate,

    // Data handling
    DataExport,
    DataClassify,

    // Access control
    PrivilegeChange,

    // Multidisciplinary team meetings
    MdtSchedule,

    // Lifecycle of the audit service itself
    SystemStartup,
    SystemShutdown,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AuthLogin => "auth.login",
            AuditAction::AuthLoginFailed => "auth.login_failed",
            AuditAction::AuthLogout => "auth.logout",
            AuditAction::PhiRead => "phi.read",
            AuditAction::PhiCreate => "phi.create",
            AuditAction::PhiUpdate => "phi.update",
            AuditAction::DataExport => "data.export",
            AuditAction::DataClassify => "data.classify",
            AuditAction::PrivilegeChange => "privilege.change",
            AuditAction::MdtSchedule => "mdt.schedule",
            AuditAction::SystemStartup => "system.startup",
            AuditAction::SystemShutdown => "system.shutdown",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth.login" => Ok(AuditAction::AuthLogin),
            "auth.login_failed" => Ok(AuditAction::AuthLoginFailed),
            "auth.logout" => Ok(AuditAction::AuthLogout),
            "phi.read" => Ok(AuditAction::PhiRead),
            "phi.create" => Ok(AuditAction::PhiCreate),
            "phi.update" => Ok(AuditAction::PhiUpdate),
            "data.export" => Ok(AuditAction::DataExport),
            "data.classify" => Ok(AuditAction::DataClassify),
            "privilege.change" => Ok(AuditAction::PrivilegeChange),
            "mdt.schedule" => Ok(AuditAction::MdtSchedule),
            "system.startup" => Ok(AuditAction::SystemStartup),
            "system.shutdown" => Ok(AuditAction::SystemShutdown),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        action.as_str().to_string()
    }
}

/// A persisted, immutable audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// Assigned by storage; defines the total order of the log.
    pub id: i64,
    /// Assigned by storage at insert time.
    pub timestamp: DateTime<Utc>,
    /// Nulled when the referenced principal is deleted.
    pub actor_id: Option<Uuid>,
    pub actor_email: Option<String>,
    pub actor_role: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
    pub status: AuditStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<JsonValue>,
    /// Chain link to the predecessor; `None` only for rows that predate chaining.
    pub previous_hash: Option<String>,
}

/// Event submitted by a producer to be appended to the log.
///
/// The `validate` rules describe the format producers are expected to
/// follow. Storage accepts any value, so an event that fails them is still
/// recorded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub actor_id: Option<Uuid>,

    #[validate(length(max = 255, message = "actorEmail must be at most 255 characters"))]
    pub actor_email: Option<String>,

    #[validate(length(max = 100, message = "actorRole must be at most 100 characters"))]
    pub actor_role: Option<String>,

    #[validate(
        length(min = 1, max = 100, message = "action must be 1-100 characters"),
        custom(function = "shared::validation::validate_action_name")
    )]
    pub action: String,

    #[validate(length(max = 100, message = "resourceType must be at most 100 characters"))]
    pub resource_type: Option<String>,

    #[validate(length(max = 255, message = "resourceId must be at most 255 characters"))]
    pub resource_id: Option<String>,

    #[validate(custom(function = "shared::validation::validate_ip_address"))]
    pub ip_address: Option<String>,

    pub user_agent: Option<String>,

    #[validate(custom(function = "shared::validation::validate_request_method"))]
    pub request_method: Option<String>,

    pub request_path: Option<String>,

    pub status: AuditStatus,

    #[validate(length(max = 100, message = "errorCode must be at most 100 characters"))]
    pub error_code: Option<String>,

    pub error_message: Option<String>,

    pub metadata: Option<JsonValue>,
}

impl AuditEvent {
    /// Create an event with only the required fields set.
    pub fn new(action: impl Into<String>, status: AuditStatus) -> Self {
        Self {
            actor_id: None,
            actor_email: None,
            actor_role: None,
            action: action.into(),
            resource_type: None,
            resource_id: None,
            ip_address: None,
            user_agent: None,
            request_method: None,
            request_path: None,
            status,
            error_code: None,
            error_message: None,
            metadata: None,
        }
    }
}

/// Filters for listing audit log entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_date_range"))]
pub struct ListAuditLogsQuery {
    pub actor_id: Option<Uuid>,

    pub from: Option<DateTime<Utc>>,

    pub to: Option<DateTime<Utc>>,

    /// Substring match on the action name.
    #[validate(length(min = 1, max = 100, message = "action filter must be 1-100 characters"))]
    pub action: Option<String>,

    #[validate(length(min = 1, max = 100, message = "resourceType must be 1-100 characters"))]
    pub resource_type: Option<String>,

    pub status: Option<AuditStatus>,

    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<u32>,

    /// Page size; out-of-range values are clamped to 1..=100.
    pub limit: Option<u32>,
}

fn validate_date_range(query: &ListAuditLogsQuery) -> Result<(), ValidationError> {
    match (query.from, query.to) {
        (Some(from), Some(to)) if from > to => {
            let mut err = ValidationError::new("date_range");
            err.message = Some("'from' must not be after 'to'".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

/// One page of audit log entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogPage {
    pub entries: Vec<AuditLogEntry>,
    pub pagination: Pagination,
}
