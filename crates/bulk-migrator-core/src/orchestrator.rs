//! Migration orchestrator: the top-level state machine of one run.
//!
//! ```text
//! INIT ─┬─ rollback mode ──────────────► ROLLBACK_ONLY
//!       ├─ dirty state ─► DIRTY_RESUME ─┐
//!       └─ clean state ─────────────────┴► MIGRATING_MAIN ─► MIGRATING_TENANTS
//!                                                   │                │
//!                                       exit code ◄─┘      ┌─────────┴─────────┐
//!                                                       SUCCESS         ROLLING_BACK
//!                                                                     ┌──────┴──────┐
//!                                                                   DONE    FAILED_ROLLBACK
//! ```
//!
//! Every branch created is persisted before anything else is attempted
//! for that tenant. The only exception to "on error, roll back" is a
//! failure to persist state: once the record cannot be trusted no further
//! external action is taken.

use futures::TryStreamExt;
use migration_state::{LoadMode, MigrationState, StateStore, TenantRecord};
use neon_branch::{BranchProvider, EndpointType};
use tracing::{debug, error, instrument};

use crate::config::MigrationConfig;
use crate::error::{MigratorError, Result};
use crate::obs::{
    emit_dirty_resume, emit_main_schema_failed, emit_main_schema_migrated,
    emit_migration_succeeded, emit_rollback_started, emit_run_started, emit_tenant_branched,
    emit_tenant_migrated, RunSpan,
};
use crate::registry::Registry;
use crate::rollback::RollbackCoordinator;
use crate::runner::CommandRunner;

/// The external collaborators a run drives.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub store: &'a dyn StateStore,
    pub provider: &'a dyn BranchProvider,
    pub registry: &'a dyn Registry,
    pub runner: &'a dyn CommandRunner,
}

impl<'a> Services<'a> {
    pub fn new(
        store: &'a dyn StateStore,
        provider: &'a dyn BranchProvider,
        registry: &'a dyn Registry,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            store,
            provider,
            registry,
            runner,
        }
    }
}

/// How a run ended when it did not hit a fatal error.
#[derive(Debug)]
pub enum MigrationOutcome {
    /// Main schema and every tenant migrated.
    Migrated { tenants: usize },
    /// Rollback mode undid the recorded run.
    RolledBack { tenants: usize },
    /// The main schema migration failed; no tenant was touched.
    MainSchemaFailed { exit_code: i32 },
    /// A tenant phase failure was fully rolled back.
    TenantMigrationRolledBack { error: MigratorError, tenants: usize },
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            MigrationOutcome::Migrated { .. } | MigrationOutcome::RolledBack { .. }
        )
    }

    /// Process exit code that reports this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrationOutcome::Migrated { .. } | MigrationOutcome::RolledBack { .. } => 0,
            MigrationOutcome::MainSchemaFailed { exit_code } if *exit_code != 0 => *exit_code,
            MigrationOutcome::MainSchemaFailed { .. } => 1,
            MigrationOutcome::TenantMigrationRolledBack { error, .. } => error.exit_code(),
        }
    }
}

/// Drives one invocation of the migrator.
pub struct MigrationOrchestrator<'a> {
    config: &'a MigrationConfig,
    services: Services<'a>,
}

impl<'a> MigrationOrchestrator<'a> {
    pub fn new(config: &'a MigrationConfig, services: Services<'a>) -> Self {
        Self { config, services }
    }

    fn coordinator(&self) -> RollbackCoordinator<'a> {
        RollbackCoordinator::new(self.config, self.services)
    }

    /// Run the state machine to completion.
    ///
    /// `Ok` covers success and handled failures; `Err` means operator
    /// intervention is needed.
    pub async fn run(&self) -> Result<MigrationOutcome> {
        let mode = if self.config.rollback_mode {
            "rollback"
        } else {
            "migrate"
        };
        let _span = RunSpan::enter(mode);
        emit_run_started(mode, &self.config.state_path);

        // INIT
        self.services
            .registry
            .health_check()
            .await
            .map_err(MigratorError::Connectivity)?;

        if self.config.rollback_mode {
            let state = self.services.store.load(LoadMode::Rollback)?;
            emit_rollback_started(state.tenants.len(), None);
            let report = self.coordinator().rollback(state).await?;
            return Ok(MigrationOutcome::RolledBack {
                tenants: report.tenants_restored,
            });
        }

        let state = self.services.store.load(LoadMode::Migrate)?;
        if state.is_dirty() {
            emit_dirty_resume(state.tenants.len());
            self.coordinator().rollback(state).await?;
        }
        let mut state = MigrationState::new();

        // MIGRATING_MAIN
        let exit_code = self
            .services
            .runner
            .run(
                &self.config.migrate_command,
                &self.config.tenant_schema_connection_url,
            )
            .await;
        if exit_code != 0 {
            let rollback_exit_code = self
                .services
                .runner
                .run(
                    &self.config.rollback_command,
                    &self.config.tenant_schema_connection_url,
                )
                .await;
            emit_main_schema_failed(exit_code, rollback_exit_code);
            return Ok(MigrationOutcome::MainSchemaFailed { exit_code });
        }
        emit_main_schema_migrated();

        // MIGRATING_TENANTS
        match self.migrate_tenants(&mut state).await {
            Ok(tenants) => {
                state.mark_success();
                self.services.store.write(&state)?;
                emit_migration_succeeded(tenants);
                Ok(MigrationOutcome::Migrated { tenants })
            }
            Err(err) if err.is_durability_failure() => Err(err),
            Err(err) => {
                emit_rollback_started(state.tenants.len(), Some(&err));
                match self.coordinator().rollback(state).await {
                    Ok(report) => Ok(MigrationOutcome::TenantMigrationRolledBack {
                        error: err,
                        tenants: report.tenants_restored,
                    }),
                    Err(rollback) => {
                        error!(error = %rollback, "failed to rollback migrations");
                        Err(MigratorError::RollbackFailed {
                            original: Box::new(err),
                            rollback: Box::new(rollback),
                        })
                    }
                }
            }
        }
    }

    /// Branch, record, and migrate every registry row in order.
    #[instrument(skip_all)]
    async fn migrate_tenants(&self, state: &mut MigrationState) -> Result<usize> {
        let mut rows = self.services.registry.tenants().await?;
        let mut migrated = 0;

        while let Some(row) = rows.try_next().await? {
            let branch = self.services.provider.create_branch(&row.branch).await?;

            state.record(TenantRecord::new(
                row.id.clone(),
                branch.clone(),
                row.branch.clone(),
            ));
            self.services.store.write(state)?;
            emit_tenant_branched(&row.id, &row.branch, &branch);

            let host = self
                .services
                .provider
                .create_endpoint(&branch, EndpointType::ReadWrite)
                .await?;
            let connection_url = self.config.credentials.connection_url(&host)?;
            debug!(tenant = %row.id, %host, "migrating tenant branch");

            let exit_code = self
                .services
                .runner
                .run(&self.config.migrate_command, &connection_url)
                .await;
            if exit_code != 0 {
                return Err(MigratorError::MigrationFailed {
                    tenant: row.id,
                    exit_code,
                });
            }

            emit_tenant_migrated(&row.id, &branch);
            migrated += 1;
        }

        Ok(migrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration_state::TenantId;

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(MigrationOutcome::Migrated { tenants: 3 }.exit_code(), 0);
        assert_eq!(MigrationOutcome::RolledBack { tenants: 0 }.exit_code(), 0);
        assert_eq!(
            MigrationOutcome::MainSchemaFailed { exit_code: 42 }.exit_code(),
            42
        );

        let handled = MigrationOutcome::TenantMigrationRolledBack {
            error: MigratorError::MigrationFailed {
                tenant: TenantId::Int(2),
                exit_code: 3,
            },
            tenants: 2,
        };
        assert_eq!(handled.exit_code(), 3);
        assert!(!handled.is_success());

        let handled = MigrationOutcome::TenantMigrationRolledBack {
            error: MigratorError::Config("x".into()),
            tenants: 0,
        };
        assert_eq!(handled.exit_code(), 1);
    }

    #[test]
    fn test_negative_main_schema_code_is_kept() {
        // Signal deaths are already mapped to 1 by the runner; any other
        // non-zero code is reported as-is.
        assert_eq!(
            MigrationOutcome::MainSchemaFailed { exit_code: -1 }.exit_code(),
            -1
        );
    }
}
