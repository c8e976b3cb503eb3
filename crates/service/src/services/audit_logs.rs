//! Read access to the audit log and the one permitted mutation.

use std::sync::Arc;

use domain::models::{AuditLogPage, ListAuditLogsQuery};
use persistence::AuditLogStore;
use shared::pagination::{PageRequest, Pagination};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::error::ServiceError;

#[derive(Clone)]
pub struct AuditLogService {
    store: Arc<dyn AuditLogStore>,
}

impl AuditLogService {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }

    /// Filtered page of entries, newest first.
    pub async fn list(&self, query: &ListAuditLogsQuery) -> Result<AuditLogPage, ServiceError> {
        query.validate()?;

        let page = PageRequest::new(query.page, query.limit);
        let (entries, total) = self.store.list(query).await?;

        Ok(AuditLogPage {
            entries,
            pagination: Pagination::new(page, total),
        })
    }

    pub async fn count(&self) -> Result<i64, ServiceError> {
        Ok(self.store.count().await?)
    }

    /// Clear `actor_id` on every entry of a deleted principal.
    ///
    /// `actor_id` is not part of the hash, so the chain stays valid.
    pub async fn detach_actor(&self, actor_id: Uuid) -> Result<u64, ServiceError> {
        let detached = self.store.detach_actor(actor_id).await?;
        info!(actor_id = %actor_id, entries = detached, "Detached actor from audit log");
        Ok(detached)
    }
}
