//! In-memory fakes for the registry and command runner (testing only)
//!
//! Together with `migration_state::fakes::MemoryStateStore` and
//! `neon_branch::fakes::MemoryBranchProvider` these let a whole run be
//! driven without a database, a Neon project, or a shell.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use migration_state::fakes::MemoryStateStore;
use migration_state::TenantId;
use neon_branch::{NeonConfig, RoleCredentials};

use crate::config::{MigrationConfig, RegistryConfig};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::{Registry, TenantRow, TenantStream};
use crate::runner::CommandRunner;

/// Configuration wired to the fakes in this module.
pub fn sample_config() -> MigrationConfig {
    MigrationConfig {
        main_connection_url: "postgresql://admin:pw@main.neon.test/main".to_string(),
        registry: RegistryConfig::new("tenants", "id", "branch", "conn"),
        migrate_command: "migrate".to_string(),
        rollback_command: "rollback".to_string(),
        tenant_schema_connection_url: "postgresql://admin:pw@schema.neon.test/tenant"
            .to_string(),
        credentials: RoleCredentials::new("app", "secret", "tenant"),
        neon: NeonConfig::new("key", "proj"),
        state_path: PathBuf::from("state.msgpack"),
        rollback_mode: false,
    }
}

/// Connection URL `sample_config` produces for an endpoint on `branch`
/// served by `MemoryBranchProvider`.
pub fn tenant_url(branch: &str) -> String {
    format!("postgresql://app:secret@{}.neon.test/tenant", branch)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One row held by the fake registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRow {
    pub id: TenantId,
    pub branch: Option<String>,
    pub connection: String,
}

#[derive(Debug, Default)]
struct RegistryInner {
    rows: Vec<RegistryRow>,
    concurrent: HashMap<TenantId, String>,
    restores: Vec<(TenantId, String)>,
    fail_health: bool,
    fail_select: bool,
    fail_row_at: Option<usize>,
    fail_restore_of: Option<TenantId>,
}

/// In-memory registry. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(self, id: impl Into<TenantId>, branch: Option<&str>, connection: &str) -> Self {
        self.inner.lock().unwrap().rows.push(RegistryRow {
            id: id.into(),
            branch: branch.map(str::to_string),
            connection: connection.to_string(),
        });
        self
    }

    /// Simulate another actor writing `branch` into the tenant's row right
    /// after the migrator restores it.
    pub fn with_concurrent_branch(self, id: TenantId, branch: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .concurrent
            .insert(id, branch.to_string());
        self
    }

    pub fn fail_health_check(self) -> Self {
        self.inner.lock().unwrap().fail_health = true;
        self
    }

    pub fn fail_select(self) -> Self {
        self.inner.lock().unwrap().fail_select = true;
        self
    }

    /// Yield a query error in place of the row at `index`.
    pub fn fail_row_at(self, index: usize) -> Self {
        self.inner.lock().unwrap().fail_row_at = Some(index);
        self
    }

    pub fn fail_restore_of(self, id: impl Into<TenantId>) -> Self {
        self.inner.lock().unwrap().fail_restore_of = Some(id.into());
        self
    }

    /// Every successful restore as `(tenant, connection_url)`, in order.
    pub fn restores(&self) -> Vec<(TenantId, String)> {
        self.inner.lock().unwrap().restores.clone()
    }

    pub fn row(&self, id: &TenantId) -> Option<RegistryRow> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|r| &r.id == id)
            .cloned()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn health_check(&self) -> RegistryResult<()> {
        if self.inner.lock().unwrap().fail_health {
            return Err(RegistryError::HealthCheck("injected failure".to_string()));
        }
        Ok(())
    }

    async fn tenants(&self) -> RegistryResult<TenantStream<'_>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_select {
            return Err(RegistryError::Query("injected failure".to_string()));
        }

        let items: Vec<RegistryResult<TenantRow>> = inner
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                if inner.fail_row_at == Some(index) {
                    return Err(RegistryError::Query("injected row failure".to_string()));
                }
                let branch = row.branch.clone().ok_or_else(|| {
                    RegistryError::Decode(format!("tenant {} has no current branch", row.id))
                })?;
                Ok(TenantRow {
                    id: row.id.clone(),
                    branch,
                    connection: row.connection.clone(),
                })
            })
            .collect();

        Ok(futures::stream::iter(items).boxed())
    }

    async fn restore_tenant(
        &self,
        id: &TenantId,
        connection_url: &str,
    ) -> RegistryResult<Option<String>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_restore_of.as_ref() == Some(id) {
            return Err(RegistryError::Query("injected failure".to_string()));
        }

        let concurrent = inner.concurrent.get(id).cloned();
        let row = inner
            .rows
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| RegistryError::TenantNotFound(id.to_string()))?;
        row.branch = concurrent;
        row.connection = connection_url.to_string();
        let observed = row.branch.clone();

        inner.restores.push((id.clone(), connection_url.to_string()));
        Ok(observed)
    }
}

// ---------------------------------------------------------------------------
// Command runner
// ---------------------------------------------------------------------------

/// One command execution observed by the fake runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command: String,
    pub connection_url: String,
    /// Tenants persisted in the observed store when the command started
    pub persisted_tenants: Option<usize>,
}

#[derive(Debug, Default)]
struct RunnerInner {
    exit_codes: HashMap<(String, String), i32>,
    state_store: Option<MemoryStateStore>,
    invocations: Vec<CommandInvocation>,
}

/// Command runner answering from a script. Unscripted commands exit 0.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCommandRunner {
    inner: Arc<Mutex<RunnerInner>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with `code` whenever `command` runs against `connection_url`.
    pub fn exit_with(self, command: &str, connection_url: &str, code: i32) -> Self {
        self.inner
            .lock()
            .unwrap()
            .exit_codes
            .insert((command.to_string(), connection_url.to_string()), code);
        self
    }

    /// Record how many tenants `store` holds each time a command starts.
    pub fn observing_store(self, store: MemoryStateStore) -> Self {
        self.inner.lock().unwrap().state_store = Some(store);
        self
    }

    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.inner.lock().unwrap().invocations.clone()
    }

    /// Commands run, in order.
    pub fn commands(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.command).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, command: &str, connection_url: &str) -> i32 {
        let mut inner = self.inner.lock().unwrap();
        let persisted_tenants = inner.state_store.as_ref().map(|s| s.persisted_tenants());
        inner.invocations.push(CommandInvocation {
            command: command.to_string(),
            connection_url: connection_url.to_string(),
            persisted_tenants,
        });
        inner
            .exit_codes
            .get(&(command.to_string(), connection_url.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_registry_streams_rows_in_insertion_order() {
        let registry = MemoryRegistry::new()
            .with_row(2, Some("b0"), "c2")
            .with_row(1, Some("b0"), "c1");

        let rows: Vec<TenantRow> = registry.tenants().await.unwrap().try_collect().await.unwrap();
        assert_eq!(
            rows,
            vec![TenantRow::new(2, "b0", "c2"), TenantRow::new(1, "b0", "c1")]
        );
    }

    #[tokio::test]
    async fn test_registry_null_branch_is_a_decode_error() {
        let registry = MemoryRegistry::new().with_row(1, None, "c1");
        let result: RegistryResult<Vec<TenantRow>> =
            registry.tenants().await.unwrap().try_collect().await;
        assert!(matches!(result, Err(RegistryError::Decode(_))));
    }

    #[tokio::test]
    async fn test_restore_writes_sentinel_and_returns_it() {
        let registry = MemoryRegistry::new().with_row("acme", Some("b1"), "old");
        let id = TenantId::from("acme");

        let observed = registry.restore_tenant(&id, "new-url").await.unwrap();
        assert_eq!(observed, None);

        let row = registry.row(&id).unwrap();
        assert_eq!(row.branch, None);
        assert_eq!(row.connection, "new-url");
        assert_eq!(registry.restores(), vec![(id, "new-url".to_string())]);
    }

    #[tokio::test]
    async fn test_restore_unknown_tenant() {
        let registry = MemoryRegistry::new();
        let err = registry
            .restore_tenant(&TenantId::Int(9), "url")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::TenantNotFound(_)));
    }

    #[tokio::test]
    async fn test_runner_script_and_observed_store() {
        let store = MemoryStateStore::new();
        let runner = ScriptedCommandRunner::new()
            .exit_with("migrate", "u2", 3)
            .observing_store(store);

        assert_eq!(runner.run("migrate", "u1").await, 0);
        assert_eq!(runner.run("migrate", "u2").await, 3);
        assert_eq!(runner.commands(), vec!["migrate", "migrate"]);
        assert_eq!(runner.invocations()[0].persisted_tenants, Some(0));
    }

    #[test]
    fn test_tenant_url_matches_credentials() {
        let config = sample_config();
        let host = neon_branch::fakes::MemoryBranchProvider::host_for("b1");
        assert_eq!(
            config.credentials.connection_url(&host).unwrap(),
            tenant_url("b1")
        );
    }
}
