use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant identifier as stored in the registry's id column.
///
/// The registry may key tenants by integer, text, or UUID. The value is
/// carried through the state file unchanged and bound back into queries
/// as the same kind, so no precision is ever lost to a coercion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantId {
    Int(i64),
    Text(String),
    Uuid(Uuid),
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantId::Int(v) => write!(f, "{}", v),
            TenantId::Text(v) => write!(f, "{}", v),
            TenantId::Uuid(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for TenantId {
    fn from(v: i64) -> Self {
        TenantId::Int(v)
    }
}

impl From<&str> for TenantId {
    fn from(v: &str) -> Self {
        TenantId::Text(v.to_string())
    }
}

impl From<String> for TenantId {
    fn from(v: String) -> Self {
        TenantId::Text(v)
    }
}

impl From<Uuid> for TenantId {
    fn from(v: Uuid) -> Self {
        TenantId::Uuid(v)
    }
}

/// A tenant whose migration branch has been created.
///
/// Recorded before the migration command runs, so its presence only means
/// the branch exists, not that the tenant finished migrating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Registry identifier of the tenant
    pub id: TenantId,
    /// Branch created for this tenant by the current run
    pub branch: String,
    /// Branch the registry pointed at when `branch` was created
    #[serde(default)]
    pub parent_branch: String,
}

impl TenantRecord {
    pub fn new(
        id: impl Into<TenantId>,
        branch: impl Into<String>,
        parent_branch: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            branch: branch.into(),
            parent_branch: parent_branch.into(),
        }
    }

    /// Branch the tenant is returned to on rollback.
    ///
    /// Records written without a parent fall back to `branch`.
    pub fn restore_branch(&self) -> &str {
        if self.parent_branch.is_empty() {
            &self.branch
        } else {
            &self.parent_branch
        }
    }
}

/// Persisted progress of one bulk migration run.
///
/// `tenants` is append-only while migrating and shrinks from the tail while
/// rolling back. `success` is set once, after every tenant migrated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    pub success: bool,
    pub tenants: Vec<TenantRecord>,
}

impl MigrationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A previous run stopped partway through and left branches behind.
    pub fn is_dirty(&self) -> bool {
        !self.success && !self.tenants.is_empty()
    }

    /// Append a tenant whose branch was just created.
    pub fn record(&mut self, tenant: TenantRecord) {
        self.tenants.push(tenant);
    }

    /// The most recently recorded tenant.
    pub fn latest(&self) -> Option<&TenantRecord> {
        self.tenants.last()
    }

    /// Drop the most recently recorded tenant.
    pub fn pop_latest(&mut self) -> Option<TenantRecord> {
        self.tenants.pop()
    }

    pub fn mark_success(&mut self) {
        self.success = true;
    }
}
