//! Rollback coordinator.
//!
//! Undoes a recorded migration using nothing but the persisted state:
//! the main schema first, then every recorded tenant from newest to
//! oldest. Each tenant undo is its own durability checkpoint, so an
//! interrupted rollback resumes exactly where it stopped.

use migration_state::{MigrationState, TenantRecord};
use neon_branch::EndpointType;
use tracing::{debug, instrument};

use crate::config::MigrationConfig;
use crate::error::{MigratorError, Result};
use crate::obs::{emit_branch_kept, emit_rollback_finished, emit_tenant_restored};
use crate::orchestrator::Services;

/// What a completed rollback did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// Tenants pointed back at their restored branch
    pub tenants_restored: usize,
    /// Migration branches removed, in removal order
    pub branches_deleted: Vec<String>,
    /// Migration branches left alone because the registry changed concurrently
    pub branches_kept: Vec<String>,
}

/// Restores the registry and branch provider to the state preceding a
/// recorded migration.
pub struct RollbackCoordinator<'a> {
    config: &'a MigrationConfig,
    services: Services<'a>,
}

impl<'a> RollbackCoordinator<'a> {
    pub fn new(config: &'a MigrationConfig, services: Services<'a>) -> Self {
        Self { config, services }
    }

    /// Roll back `state` completely.
    ///
    /// The first failing step aborts the whole rollback; the tenants not yet
    /// undone stay recorded for a later rollback-mode invocation.
    #[instrument(skip_all, fields(tenants = state.tenants.len()))]
    pub async fn rollback(&self, mut state: MigrationState) -> Result<RollbackReport> {
        let exit_code = self
            .services
            .runner
            .run(
                &self.config.rollback_command,
                &self.config.tenant_schema_connection_url,
            )
            .await;
        if exit_code != 0 {
            return Err(MigratorError::MainRollbackFailed { exit_code });
        }
        debug!("main schema rolled back");

        let mut report = RollbackReport::default();
        while let Some(tenant) = state.latest().cloned() {
            self.restore_tenant(&tenant, &mut report).await?;

            state.pop_latest();
            self.services.store.write(&state)?;
            report.tenants_restored += 1;
        }

        self.services.store.delete()?;
        emit_rollback_finished(report.tenants_restored);
        Ok(report)
    }

    async fn restore_tenant(
        &self,
        tenant: &TenantRecord,
        report: &mut RollbackReport,
    ) -> Result<()> {
        let restore_branch = tenant.restore_branch();

        let host = self
            .services
            .provider
            .create_endpoint(restore_branch, EndpointType::ReadWrite)
            .await?;
        let connection_url = self.config.credentials.connection_url(&host)?;

        // The branch column is overwritten with NULL and read back in the same
        // statement; anything else observed there was written by another actor.
        let observed = self
            .services
            .registry
            .restore_tenant(&tenant.id, &connection_url)
            .await?;

        match observed.as_deref() {
            Some(observed) if !observed.is_empty() && observed != restore_branch => {
                emit_branch_kept(&tenant.id, &tenant.branch, observed);
                report.branches_kept.push(tenant.branch.clone());
            }
            _ => {
                self.services.provider.delete_branch(&tenant.branch).await?;
                report.branches_deleted.push(tenant.branch.clone());
            }
        }

        emit_tenant_restored(&tenant.id, restore_branch, &tenant.branch);
        Ok(())
    }
}
