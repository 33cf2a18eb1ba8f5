//! Structured observability hooks for migration and rollback progress.
//!
//! This module provides:
//! - A run-scoped tracing span via the `RunSpan` RAII guard
//! - Emission functions for each phase transition of a run
//!
//! Every event carries an `event` field so log pipelines can filter on it.

use migration_state::TenantId;
use tracing::{error, info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("migrate");
/// // Now all tracing calls are associated with mode = "migrate"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run mode.
    pub fn enter(mode: &str) -> Self {
        let span = tracing::info_span!("migrator.run", mode = %mode);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a run started with the given state file.
pub fn emit_run_started(mode: &str, state_path: &std::path::Path) {
    info!(event = "run.started", mode = %mode, state_path = %state_path.display());
}

/// Emit event: the previous run left an unfinished state behind.
pub fn emit_dirty_resume(tenants: usize) {
    warn!(
        event = "run.dirty_resume",
        tenants = tenants,
        "last migration was dirty, rolling that back before doing anything"
    );
}

/// Emit event: the shared tenant schema migrated.
pub fn emit_main_schema_migrated() {
    info!(
        event = "main_schema.migrated",
        "main schema migrated, starting to migrate tenant branches"
    );
}

/// Emit event: the shared tenant schema failed to migrate.
pub fn emit_main_schema_failed(exit_code: i32, rollback_exit_code: i32) {
    error!(
        event = "main_schema.failed",
        exit_code = exit_code,
        rollback_exit_code = rollback_exit_code,
        "main schema migration failed"
    );
}

/// Emit event: a migration branch was created and recorded for a tenant.
pub fn emit_tenant_branched(tenant: &TenantId, parent: &str, branch: &str) {
    info!(event = "tenant.branched", tenant = %tenant, parent = %parent, branch = %branch);
}

/// Emit event: a tenant's migrate command succeeded.
pub fn emit_tenant_migrated(tenant: &TenantId, branch: &str) {
    info!(event = "tenant.migrated", tenant = %tenant, branch = %branch);
}

/// Emit event: every tenant migrated.
pub fn emit_migration_succeeded(tenants: usize) {
    info!(event = "migration.succeeded", tenants = tenants, "{} tenants migrated", tenants);
}

/// Emit event: a rollback started, with the error that triggered it if any.
pub fn emit_rollback_started(tenants: usize, cause: Option<&dyn std::fmt::Display>) {
    match cause {
        Some(cause) => warn!(
            event = "rollback.started",
            tenants = tenants,
            cause = %cause,
            "something went wrong, performing rollback"
        ),
        None => info!(event = "rollback.started", tenants = tenants),
    }
}

/// Emit event: a tenant was pointed back at its restored branch.
pub fn emit_tenant_restored(tenant: &TenantId, restored_branch: &str, removed_branch: &str) {
    info!(
        event = "rollback.tenant_restored",
        tenant = %tenant,
        restored_branch = %restored_branch,
        removed_branch = %removed_branch,
    );
}

/// Emit event: the migration branch was kept because the registry changed underneath.
pub fn emit_branch_kept(tenant: &TenantId, branch: &str, observed: &str) {
    warn!(
        event = "rollback.branch_kept",
        tenant = %tenant,
        branch = %branch,
        observed_branch = %observed,
        "registry branch changed concurrently, keeping migration branch"
    );
}

/// Emit event: rollback finished and the state file is gone.
pub fn emit_rollback_finished(tenants: usize) {
    info!(event = "rollback.finished", tenants = tenants, "rollback successful");
}

/// Emit event: a failure that needs an operator (error level).
pub fn emit_fatal(error: &dyn std::fmt::Display) {
    error!(event = "run.fatal", error = %error);
}
