//! Neon-Branch: Branch Provisioning for the Bulk Migrator
//!
//! This crate is the migrator's view of the branch-capable database
//! service. It creates a branch per tenant before migrating, attaches
//! read-write endpoints so branches can accept connections, and deletes
//! branches when a migration is undone.
//!
//! ## Layer 1 - Branch Provider
//!
//! Focus: One request per call, no retries, errors surfaced verbatim.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod client;
pub mod connection;
pub mod error;
pub mod fakes;

pub use client::{NeonClient, NeonConfig, DEFAULT_API_URL};
pub use connection::RoleCredentials;
pub use error::NeonError;

/// Result type for branch provider operations
pub type Result<T> = std::result::Result<T, NeonError>;

/// Kind of compute endpoint attached to a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    ReadWrite,
    ReadOnly,
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointType::ReadWrite => write!(f, "read_write"),
            EndpointType::ReadOnly => write!(f, "read_only"),
        }
    }
}

/// Remote service that owns tenant branches.
///
/// Guarantees:
/// - `create_branch(parent)` returns the id of a new branch forked from `parent`.
/// - `create_endpoint(branch, kind)` returns a host that accepts connections
///   for `branch`.
/// - `delete_branch(branch)` removes the branch; it is never retried.
#[async_trait]
pub trait BranchProvider: Send + Sync {
    /// Fork a new branch from `parent_branch_id`, returning the new id.
    async fn create_branch(&self, parent_branch_id: &str) -> Result<String>;

    /// Attach a compute endpoint to `branch_id`, returning its host.
    async fn create_endpoint(&self, branch_id: &str, kind: EndpointType) -> Result<String>;

    /// Delete `branch_id`.
    async fn delete_branch(&self, branch_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_type_wire_names() {
        assert_eq!(
            serde_json::to_value(EndpointType::ReadWrite).unwrap(),
            serde_json::json!("read_write")
        );
        assert_eq!(EndpointType::ReadOnly.to_string(), "read_only");
    }
}
