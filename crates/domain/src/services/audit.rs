//! Audit event construction for producers.
//!
//! Provides a fluent builder and helper functions so that controllers can
//! describe what happened without touching storage concerns.

use crate::models::{AuditAction, AuditEvent, AuditStatus};
use serde_json::{json, Value as JsonValue};
use std::net::IpAddr;
use uuid::Uuid;

/// Builder for audit events with a fluent API.
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    /// Create a builder for an action performed by an authenticated principal.
    pub fn user_action(actor_id: Uuid, action: impl Into<String>) -> Self {
        let mut event = AuditEvent::new(action, AuditStatus::Success);
        event.actor_id = Some(actor_id);
        Self { event }
    }

    /// Create a builder for an action with no authenticated principal.
    pub fn system_action(action: impl Into<String>) -> Self {
        Self {
            event: AuditEvent::new(action, AuditStatus::Success),
        }
    }

    /// Set the actor's email.
    pub fn with_actor_email(mut self, email: impl Into<String>) -> Self {
        self.event.actor_email = Some(email.into());
        self
    }

    /// Set the actor's role at the time of the action.
    pub fn with_actor_role(mut self, role: impl Into<String>) -> Self {
        self.event.actor_role = Some(role.into());
        self
    }

    /// Set the resource being acted upon.
    pub fn on_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.event.resource_type = Some(resource_type.into());
        self.event.resource_id = Some(resource_id.into());
        self
    }

    /// Set just the resource type (when no ID is available).
    pub fn on_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.event.resource_type = Some(resource_type.into());
        self
    }

    /// Set the HTTP method and path of the originating request.
    pub fn with_request(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.event.request_method = Some(method.into());
        self.event.request_path = Some(path.into());
        self
    }

    /// Set the client IP address.
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.event.ip_address = Some(ip.to_string());
        self
    }

    /// Set the user agent string.
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.event.user_agent = Some(ua.into());
        self
    }

    /// Mark the action as rejected (e.g. bad credentials, forbidden).
    pub fn failed(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.event.status = AuditStatus::Failure;
        self.event.error_code = Some(code.into());
        self.event.error_message = Some(message.into());
        self
    }

    /// Mark the action as aborted by an unexpected error.
    pub fn errored(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.event.status = AuditStatus::Error;
        self.event.error_code = Some(code.into());
        self.event.error_message = Some(message.into());
        self
    }

    /// Add a metadata key. Non-object metadata is replaced.
    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        match self.event.metadata.as_mut() {
            Some(JsonValue::Object(map)) => {
                map.insert(key.into(), value);
            }
            _ => {
                let mut map = serde_json::Map::new();
                map.insert(key.into(), value);
                self.event.metadata = Some(JsonValue::Object(map));
            }
        }
        self
    }

    pub fn build(self) -> AuditEvent {
        self.event
    }
}

/// Convenience functions for the events the clinical platform emits.
pub mod audit_helpers {
    use super::*;

    /// Successful sign-in.
    pub fn login_succeeded(actor_id: Uuid, email: &str, role: &str, ip: IpAddr) -> AuditEvent {
        AuditEventBuilder::user_action(actor_id, AuditAction::AuthLogin)
            .with_actor_email(email)
            .with_actor_role(role)
            .with_ip(ip)
            .build()
    }

    /// Rejected sign-in; the principal is unknown so only the attempted email is kept.
    pub fn login_failed(attempted_email: &str, ip: IpAddr, reason: &str) -> AuditEvent {
        AuditEventBuilder::system_action(AuditAction::AuthLoginFailed)
            .with_actor_email(attempted_email)
            .with_ip(ip)
            .failed("INVALID_CREDENTIALS", reason)
            .build()
    }

    pub fn logout(actor_id: Uuid, email: &str) -> AuditEvent {
        AuditEventBuilder::user_action(actor_id, AuditAction::AuthLogout)
            .with_actor_email(email)
            .build()
    }

    /// Read access to a patient's protected health information.
    pub fn phi_read(actor_id: Uuid, email: &str, role: &str, patient_id: &str) -> AuditEvent {
        AuditEventBuilder::user_action(actor_id, AuditAction::PhiRead)
            .with_actor_email(email)
            .with_actor_role(role)
            .on_resource("patient", patient_id)
            .build()
    }

    /// Modification of a patient record, listing the fields touched.
    pub fn phi_updated(
        actor_id: Uuid,
        email: &str,
        role: &str,
        patient_id: &str,
        fields: &[&str],
    ) -> AuditEvent {
        AuditEventBuilder::user_action(actor_id, AuditAction::PhiUpdate)
            .with_actor_email(email)
            .with_actor_role(role)
            .on_resource("patient", patient_id)
            .with_metadata("fields", json!(fields))
            .build()
    }

    /// Bulk export of records.
    pub fn data_exported(
        actor_id: Uuid,
        email: &str,
        role: &str,
        resource_type: &str,
        format: &str,
        record_count: u64,
    ) -> AuditEvent {
        AuditEventBuilder::user_action(actor_id, AuditAction::DataExport)
            .with_actor_email(email)
            .with_actor_role(role)
            .on_resource_type(resource_type)
            .with_metadata("format", json!(format))
            .with_metadata("recordCount", json!(record_count))
            .build()
    }

    /// Change of a resource's data classification level.
    pub fn data_classified(
        actor_id: Uuid,
        email: &str,
        resource_type: &str,
        resource_id: &str,
        old_level: &str,
        new_level: &str,
    ) -> AuditEvent {
        AuditEventBuilder::user_action(actor_id, AuditAction::DataClassify)
            .with_actor_email(email)
            .on_resource(resource_type, resource_id)
            .with_metadata("from", json!(old_level))
            .with_metadata("to", json!(new_level))
            .build()
    }

    /// Role change of another principal.
    pub fn privilege_changed(
        actor_id: Uuid,
        email: &str,
        target_user_id: Uuid,
        old_role: &str,
        new_role: &str,
    ) -> AuditEvent {
        AuditEventBuilder::user_action(actor_id, AuditAction::PrivilegeChange)
            .with_actor_email(email)
            .on_resource("user", target_user_id.to_string())
            .with_metadata("from", json!(old_role))
            .with_metadata("to", json!(new_role))
            .build()
    }

    pub fn mdt_scheduled(actor_id: Uuid, email: &str, meeting_id: &str) -> AuditEvent {
        AuditEventBuilder::user_action(actor_id, AuditAction::MdtSchedule)
            .with_actor_email(email)
            .on_resource("mdt_meeting", meeting_id)
            .build()
    }

    /// Lifecycle events of the audit service itself.
    pub fn system_started(version: &str) -> AuditEvent {
        AuditEventBuilder::system_action(AuditAction::SystemStartup)
            .with_metadata("version", json!(version))
            .build()
    }

    pub fn system_stopped(version: &str) -> AuditEvent {
        AuditEventBuilder::system_action(AuditAction::SystemShutdown)
            .with_metadata("version", json!(version))
            .build()
    }
}
