//! Two-phase startup: chain every existing row, then lock the table.
//!
//! The enforcer rejects the UPDATEs the backfill issues, so the order is
//! fixed. Each phase is its own type and installation is only reachable
//! from [`BackfilledChain`].

use std::sync::Arc;

use domain::models::ImmutabilityStatus;
use persistence::AuditLogStore;
use tracing::{info, warn};

use crate::error::BootstrapError;
use crate::services::immutability_status;

/// Store whose schema is migrated but whose chain may be incomplete.
pub struct ChainBootstrap {
    store: Arc<dyn AuditLogStore>,
}

impl ChainBootstrap {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }

    /// Apply pending schema migrations.
    pub async fn migrate(self) -> Result<Self, BootstrapError> {
        info!(backend = %self.store.backend(), "Running database migrations...");
        self.store.run_migrations().await?;
        info!("Migrations completed");
        Ok(self)
    }

    /// Add the chain column and link every existing row. Idempotent.
    pub async fn backfill(self) -> Result<BackfilledChain, BootstrapError> {
        if !self.store.has_chain_column().await? {
            let triggers = self.store.enforcer_triggers().await?;
            if triggers.any_installed() {
                return Err(BootstrapError::EnforcerAlreadyActive);
            }
        }

        let linked = self.store.backfill_chain().await?;
        Ok(BackfilledChain {
            store: self.store,
            linked,
        })
    }
}

/// Every row was chained by this run or an earlier one.
pub struct BackfilledChain {
    store: Arc<dyn AuditLogStore>,
    linked: u64,
}

impl BackfilledChain {
    /// Rows linked by this run; zero when the chain already existed.
    pub fn linked(&self) -> u64 {
        self.linked
    }

    /// Install the DELETE/UPDATE triggers. Idempotent.
    pub async fn install_enforcer(self) -> Result<ProtectedChain, BootstrapError> {
        let unchained = self.store.count_unchained().await?;
        if unchained > 0 {
            return Err(BootstrapError::UnchainedEntries { count: unchained });
        }

        self.store.install_enforcer().await?;

        let status = immutability_status(self.store.as_ref()).await?;
        if !status.is_fully_protected {
            warn!(message = %status.message, "Enforcer installation incomplete");
            return Err(BootstrapError::EnforcerIncomplete(status.message));
        }

        info!("Audit log immutability enforcer active");
        Ok(ProtectedChain {
            store: self.store,
            linked: self.linked,
            status,
        })
    }
}

/// Chained and protected; ready for the append engine.
pub struct ProtectedChain {
    store: Arc<dyn AuditLogStore>,
    linked: u64,
    status: ImmutabilityStatus,
}

impl ProtectedChain {
    pub fn store(&self) -> &Arc<dyn AuditLogStore> {
        &self.store
    }

    pub fn linked(&self) -> u64 {
        self.linked
    }

    pub fn status(&self) -> &ImmutabilityStatus {
        &self.status
    }

    pub fn into_store(self) -> Arc<dyn AuditLogStore> {
        self.store
    }
}

/// Migrate, backfill and install the enforcer, in that order.
pub async fn bootstrap(store: Arc<dyn AuditLogStore>) -> Result<ProtectedChain, BootstrapError> {
    let chain = ChainBootstrap::new(store).migrate().await?.backfill().await?;
    if chain.linked() > 0 {
        info!(rows = chain.linked(), "Existing audit entries chained");
    }
    chain.install_enforcer().await
}
