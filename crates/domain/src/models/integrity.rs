//! Integrity reports produced by the chain verifier and the immutability check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::audit_log::AuditLogEntry;

/// Why an entry was flagged by the chain verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TamperIssue {
    /// Stored `previous_hash` is absent (row predates chaining and was never backfilled).
    MissingHash,
    /// Stored `previous_hash` is present but does not match the recomputed link.
    ChainBroken,
    /// The first entry carries a non-empty `previous_hash`.
    UnexpectedGenesisHash,
}

impl TamperIssue {
    pub fn description(&self) -> &'static str {
        match self {
            TamperIssue::MissingHash => "missing hash (pre-migration)",
            TamperIssue::ChainBroken => "hash chain broken - possible tampering",
            TamperIssue::UnexpectedGenesisHash => "first entry must have an empty previous hash",
        }
    }
}

impl std::fmt::Display for TamperIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

impl Serialize for TamperIssue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One flagged entry in a verification report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TamperedEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub expected_previous_hash: String,
    pub stored_previous_hash: Option<String>,
    pub issue: TamperIssue,
}

impl TamperedEntry {
    pub fn new(entry: &AuditLogEntry, expected: impl Into<String>, issue: TamperIssue) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp,
            action: entry.action.clone(),
            expected_previous_hash: expected.into(),
            stored_previous_hash: entry.previous_hash.clone(),
            issue,
        }
    }
}

/// Result of a completed chain scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerificationReport {
    pub is_valid: bool,
    pub total_logs: u64,
    pub verified_logs: u64,
    pub tampered_entries: Vec<TamperedEntry>,
    /// Seed the next append will chain against; suitable for external checkpointing.
    pub head_hash: Option<String>,
    pub message: String,
}

/// Verification could not run to completion (storage error or cancellation).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationFailure {
    pub is_valid: bool,
    pub error: String,
    pub message: String,
}

impl VerificationFailure {
    pub fn new(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            is_valid: false,
            message: format!("Failed to verify audit log integrity: {}", error),
            error,
        }
    }
}

/// Either a finished report (which may itself be invalid) or an operational failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VerificationOutcome {
    Completed(ChainVerificationReport),
    Failed(VerificationFailure),
}

impl VerificationOutcome {
    pub fn is_valid(&self) -> bool {
        match self {
            VerificationOutcome::Completed(report) => report.is_valid,
            VerificationOutcome::Failed(_) => false,
        }
    }

    pub fn report(&self) -> Option<&ChainVerificationReport> {
        match self {
            VerificationOutcome::Completed(report) => Some(report),
            VerificationOutcome::Failed(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            VerificationOutcome::Completed(report) => &report.message,
            VerificationOutcome::Failed(failure) => &failure.message,
        }
    }
}

/// Whether a storage-level protection is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectionState {
    Active,
    Missing,
}

impl From<bool> for ProtectionState {
    fn from(installed: bool) -> Self {
        if installed {
            ProtectionState::Active
        } else {
            ProtectionState::Missing
        }
    }
}

impl std::fmt::Display for ProtectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtectionState::Active => f.write_str("ACTIVE"),
            ProtectionState::Missing => f.write_str("MISSING"),
        }
    }
}

/// Status of the storage-level immutability enforcer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmutabilityStatus {
    pub delete_protection: ProtectionState,
    pub update_protection: ProtectionState,
    pub is_fully_protected: bool,
    pub message: String,
}

impl ImmutabilityStatus {
    pub fn new(delete_installed: bool, update_installed: bool) -> Self {
        let is_fully_protected = delete_installed && update_installed;
        let message = if is_fully_protected {
            "Audit log is protected against deletion and modification".to_string()
        } else {
            let mut missing = Vec::new();
            if !delete_installed {
                missing.push("delete");
            }
            if !update_installed {
                missing.push("update");
            }
            format!(
                "Audit log immutability is incomplete: {} protection missing",
                missing.join(" and ")
            )
        };

        Self {
            delete_protection: delete_installed.into(),
            update_protection: update_installed.into(),
            is_fully_protected,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tamper_issue_serializes_as_description() {
        let json = serde_json::to_value(TamperIssue::ChainBroken).unwrap();
        assert_eq!(json, "hash chain broken - possible tampering");
        let json = serde_json::to_value(TamperIssue::MissingHash).unwrap();
        assert_eq!(json, "missing hash (pre-migration)");
    }

    #[test]
    fn test_immutability_status_fully_protected() {
        let status = ImmutabilityStatus::new(true, true);
        assert!(status.is_fully_protected);
        assert_eq!(status.delete_protection, ProtectionState::Active);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["deleteProtection"], "ACTIVE");
        assert_eq!(json["updateProtection"], "ACTIVE");
        assert_eq!(json["isFullyProtected"], true);
    }

    #[test]
    fn test_immutability_status_partial() {
        let status = ImmutabilityStatus::new(true, false);
        assert!(!status.is_fully_protected);
        assert_eq!(status.update_protection, ProtectionState::Missing);
        assert!(status.message.contains("update protection missing"));

        let status = ImmutabilityStatus::new(false, false);
        assert!(status.message.contains("delete and update"));
    }

    #[test]
    fn test_verification_failure_shape() {
        let outcome = VerificationOutcome::Failed(VerificationFailure::new("connection refused"));
        assert!(!outcome.is_valid());
        assert!(outcome.report().is_none());

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["error"], "connection refused");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("Failed to verify"));
        assert!(json.get("tamperedEntries").is_none());
    }
}
