//! Tenant registry contract.
//!
//! The registry is a table in the main database mapping each tenant to its
//! current branch and connection string. The migrator only ever reads all
//! rows, and rewrites one row at a time while rolling back.

use async_trait::async_trait;
use futures::stream::BoxStream;
use migration_state::TenantId;

use crate::error::RegistryResult;

/// One registry row as read at the start of the tenant phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRow {
    pub id: TenantId,
    /// Branch the tenant currently runs on
    pub branch: String,
    /// Connection string currently stored for the tenant
    pub connection: String,
}

impl TenantRow {
    pub fn new(id: impl Into<TenantId>, branch: &str, connection: &str) -> Self {
        TenantRow {
            id: id.into(),
            branch: branch.to_string(),
            connection: connection.to_string(),
        }
    }
}

/// Stream of registry rows in the registry's own iteration order
pub type TenantStream<'a> = BoxStream<'a, RegistryResult<TenantRow>>;

/// Registry table in the main database.
///
/// Guarantees:
/// - `tenants` yields every row exactly once, in a stable order for the
///   lifetime of the stream.
/// - `restore_tenant` writes the sentinel (`NULL`) into the branch column
///   and `connection_url` into the connection column of exactly one row,
///   returning the branch column as it reads after that write.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Verify the main database answers queries.
    async fn health_check(&self) -> RegistryResult<()>;

    /// Stream every tenant row.
    async fn tenants(&self) -> RegistryResult<TenantStream<'_>>;

    /// Point a tenant back at `connection_url`, returning the branch
    /// column observed after the write.
    async fn restore_tenant(
        &self,
        id: &TenantId,
        connection_url: &str,
    ) -> RegistryResult<Option<String>>;
}
