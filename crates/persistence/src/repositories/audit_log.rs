//! Pieces shared by the PostgreSQL and SQLite audit log stores.
//!
//! Both backends accept `$N` placeholders, so the SQL text is common; only
//! the bound timestamp representation differs.

use chrono::{DateTime, Utc};
use domain::models::{AuditLogEntry, AuditStatus, ListAuditLogsQuery};
use uuid::Uuid;

use crate::entities::AuditLogEntity;
use crate::store::StoreError;

/// Column list matching [`AuditLogEntity`], usable inside `concat!`.
macro_rules! audit_log_columns {
    () => {
        "id, timestamp, actor_id, actor_email, actor_role, action, resource_type, \
         resource_id, ip_address, user_agent, request_method, request_path, status, \
         error_code, error_message, metadata, previous_hash"
    };
}
pub(crate) use audit_log_columns;

pub(crate) const SELECT_TAIL: &str = concat!(
    "SELECT ",
    audit_log_columns!(),
    " FROM audit_logs ORDER BY id DESC LIMIT 1"
);

/// Keyset page: `$1` is the last id seen, `$2` the batch size.
pub(crate) const SELECT_BATCH_AFTER: &str = concat!(
    "SELECT ",
    audit_log_columns!(),
    " FROM audit_logs WHERE id > $1 ORDER BY id ASC LIMIT $2"
);

pub(crate) const INSERT_CHAINED: &str = concat!(
    "INSERT INTO audit_logs (actor_id, actor_email, actor_role, action, resource_type, \
     resource_id, ip_address, user_agent, request_method, request_path, status, \
     error_code, error_message, metadata, previous_hash) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
     RETURNING ",
    audit_log_columns!()
);

pub(crate) const UPDATE_PREVIOUS_HASH: &str =
    "UPDATE audit_logs SET previous_hash = $1 WHERE id = $2";

pub(crate) const DETACH_ACTOR: &str = "UPDATE audit_logs SET actor_id = NULL WHERE actor_id = $1";

pub(crate) const CREATE_PREVIOUS_HASH_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_previous_hash ON audit_logs (previous_hash)";

/// Rows linked per round trip during backfill.
pub(crate) const BACKFILL_BATCH_SIZE: i64 = 500;

/// Keyset cursor before the first row.
pub(crate) const CURSOR_START: i64 = i64::MIN;

/// Macro to bind an [`AuditEvent`](domain::models::AuditEvent) and its chain
/// seed to the `INSERT_CHAINED` statement.
macro_rules! bind_event {
    ($builder:expr, $event:expr, $seed:expr) => {{
        let event = $event;
        $builder
            .bind(event.actor_id)
            .bind(&event.actor_email)
            .bind(&event.actor_role)
            .bind(&event.action)
            .bind(&event.resource_type)
            .bind(&event.resource_id)
            .bind(&event.ip_address)
            .bind(&event.user_agent)
            .bind(&event.request_method)
            .bind(&event.request_path)
            .bind(event.status.as_str())
            .bind(&event.error_code)
            .bind(&event.error_message)
            .bind(&event.metadata)
            .bind($seed)
    }};
}
pub(crate) use bind_event;

/// Filter values prepared for binding; `Ts` is the backend's timestamp form.
pub(crate) struct AuditLogFilter<Ts> {
    pub actor_id: Option<Uuid>,
    pub from: Option<Ts>,
    pub to: Option<Ts>,
    pub action_pattern: Option<String>,
    pub resource_type: Option<String>,
    pub status: Option<&'static str>,
}

impl<Ts> AuditLogFilter<Ts> {
    pub(crate) fn from_query(
        query: &ListAuditLogsQuery,
        timestamp: impl Fn(DateTime<Utc>) -> Ts,
    ) -> Self {
        Self {
            actor_id: query.actor_id,
            from: query.from.map(&timestamp),
            to: query.to.map(&timestamp),
            action_pattern: query
                .action
                .as_deref()
                .map(|action| format!("%{}%", escape_like(action))),
            resource_type: query.resource_type.clone(),
            status: query.status.map(|s| s.as_str()),
        }
    }

    /// WHERE clause and the number of placeholders it uses.
    pub(crate) fn where_clause(&self) -> (String, usize) {
        let mut conditions = Vec::new();
        let mut param_count = 0;

        if self.actor_id.is_some() {
            param_count += 1;
            conditions.push(format!("actor_id = ${}", param_count));
        }

        if self.from.is_some() {
            param_count += 1;
            conditions.push(format!("timestamp >= ${}", param_count));
        }

        if self.to.is_some() {
            param_count += 1;
            conditions.push(format!("timestamp <= ${}", param_count));
        }

        if self.action_pattern.is_some() {
            param_count += 1;
            conditions.push(format!("action LIKE ${} ESCAPE '\\'", param_count));
        }

        if self.resource_type.is_some() {
            param_count += 1;
            conditions.push(format!("resource_type = ${}", param_count));
        }

        if self.status.is_some() {
            param_count += 1;
            conditions.push(format!("status = ${}", param_count));
        }

        if conditions.is_empty() {
            ("1 = 1".to_string(), 0)
        } else {
            (conditions.join(" AND "), param_count)
        }
    }
}

/// Macro to bind [`AuditLogFilter`] values in the order `where_clause` numbers them.
macro_rules! bind_query_filters {
    ($builder:expr, $filter:expr) => {{
        let filter = $filter;
        let mut b = $builder;
        if let Some(actor_id) = filter.actor_id {
            b = b.bind(actor_id);
        }
        if let Some(ref from) = filter.from {
            b = b.bind(from);
        }
        if let Some(ref to) = filter.to {
            b = b.bind(to);
        }
        if let Some(ref pattern) = filter.action_pattern {
            b = b.bind(pattern);
        }
        if let Some(ref resource_type) = filter.resource_type {
            b = b.bind(resource_type);
        }
        if let Some(status) = filter.status {
            b = b.bind(status);
        }
        b
    }};
}
pub(crate) use bind_query_filters;

/// List and count statements for a filter.
pub(crate) fn list_statements<Ts>(filter: &AuditLogFilter<Ts>) -> (String, String) {
    let (where_clause, param_count) = filter.where_clause();

    let count = format!("SELECT COUNT(*) FROM audit_logs WHERE {}", where_clause);
    let list = format!(
        concat!(
            "SELECT ",
            audit_log_columns!(),
            " FROM audit_logs WHERE {} ORDER BY timestamp DESC, id DESC LIMIT ${} OFFSET ${}"
        ),
        where_clause,
        param_count + 1,
        param_count + 2
    );

    (list, count)
}

/// Escape LIKE wildcards so the filter is a literal substring match.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Convert entity to domain model.
pub(crate) fn entity_to_domain(entity: AuditLogEntity) -> Result<AuditLogEntry, StoreError> {
    let status = entity
        .status
        .parse::<AuditStatus>()
        .map_err(|reason| StoreError::InvalidRow {
            id: entity.id,
            reason,
        })?;

    Ok(AuditLogEntry {
        id: entity.id,
        timestamp: entity.timestamp,
        actor_id: entity.actor_id,
        actor_email: entity.actor_email,
        actor_role: entity.actor_role,
        action: entity.action,
        resource_type: entity.resource_type,
        resource_id: entity.resource_id,
        ip_address: entity.ip_address,
        user_agent: entity.user_agent,
        request_method: entity.request_method,
        request_path: entity.request_path,
        status,
        error_code: entity.error_code,
        error_message: entity.error_message,
        metadata: entity.metadata,
        previous_hash: entity.previous_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(status: &str) -> AuditLogEntity {
        AuditLogEntity {
            id: 9,
            timestamp: Utc::now(),
            actor_id: None,
            actor_email: None,
            actor_role: None,
            action: "auth.login".to_string(),
            resource_type: None,
            resource_id: None,
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
            request_method: None,
            request_path: None,
            status: status.to_string(),
            error_code: None,
            error_message: None,
            metadata: None,
            previous_hash: Some("abc".to_string()),
        }
    }

    #[test]
    fn test_entity_to_domain_conversion() {
        let entry = entity_to_domain(entity("failure")).unwrap();
        assert_eq!(entry.id, 9);
        assert_eq!(entry.status, AuditStatus::Failure);
        assert_eq!(entry.previous_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn test_entity_with_unknown_status_is_rejected() {
        let err = entity_to_domain(entity("pending")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow { id: 9, .. }));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("phi.read"), "phi.read");
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_where_clause_without_filters() {
        let filter = AuditLogFilter::from_query(&ListAuditLogsQuery::default(), |ts| ts);
        assert_eq!(filter.where_clause(), ("1 = 1".to_string(), 0));
    }

    #[test]
    fn test_where_clause_numbers_placeholders_in_bind_order() {
        let query = ListAuditLogsQuery {
            actor_id: Some(Uuid::new_v4()),
            to: Some(Utc::now()),
            action: Some("phi".to_string()),
            status: Some(AuditStatus::Error),
            ..Default::default()
        };
        let filter = AuditLogFilter::from_query(&query, |ts| ts);
        let (clause, count) = filter.where_clause();

        assert_eq!(count, 4);
        assert_eq!(
            clause,
            "actor_id = $1 AND timestamp <= $2 AND action LIKE $3 ESCAPE '\\' AND status = $4"
        );
        assert_eq!(filter.action_pattern.as_deref(), Some("%phi%"));
        assert_eq!(filter.status, Some("error"));
    }

    #[test]
    fn test_list_statements_append_paging_placeholders() {
        let query = ListAuditLogsQuery {
            resource_type: Some("patient".to_string()),
            ..Default::default()
        };
        let filter = AuditLogFilter::from_query(&query, |ts| ts);
        let (list, count) = list_statements(&filter);

        assert!(count.ends_with("WHERE resource_type = $1"));
        assert!(list.contains("ORDER BY timestamp DESC, id DESC LIMIT $2 OFFSET $3"));
        assert!(list.contains("previous_hash FROM audit_logs"));
    }
}
