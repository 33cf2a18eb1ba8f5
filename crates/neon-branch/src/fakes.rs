//! In-memory fake for the branch provider (testing only)
//!
//! `MemoryBranchProvider` keeps a set of live branches and a log of every
//! call it received, in order, so tests can assert exactly which branches
//! were created and deleted and in what sequence.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::NeonError;
use crate::{BranchProvider, EndpointType, Result};

/// One call observed by the fake provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CreateBranch { parent: String, created: String },
    CreateEndpoint { branch: String, host: String },
    DeleteBranch { branch: String },
}

#[derive(Debug, Default)]
struct Inner {
    branches: BTreeSet<String>,
    next_ids: VecDeque<String>,
    counter: usize,
    calls: Vec<ProviderCall>,
    fail_create_for: HashSet<String>,
    fail_endpoint_for: HashSet<String>,
    fail_delete_for: HashSet<String>,
}

/// In-memory branch provider. Clones share the same branches and log.
#[derive(Debug, Clone, Default)]
pub struct MemoryBranchProvider {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBranchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed branches that already exist on the provider.
    pub fn with_branches<I, S>(self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.branches.extend(branches.into_iter().map(Into::into));
        }
        self
    }

    /// Ids handed out by the next `create_branch` calls, in order.
    pub fn with_next_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.next_ids.extend(ids.into_iter().map(Into::into));
        }
        self
    }

    /// Make `create_branch` fail when forking from `parent`.
    pub fn fail_create_from(self, parent: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .fail_create_for
            .insert(parent.to_string());
        self
    }

    /// Make `create_endpoint` fail for `branch`.
    pub fn fail_endpoint_for(self, branch: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .fail_endpoint_for
            .insert(branch.to_string());
        self
    }

    /// Make `delete_branch` fail for `branch`.
    pub fn fail_delete_of(self, branch: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .fail_delete_for
            .insert(branch.to_string());
        self
    }

    /// Every call received, oldest first.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Branches deleted, in deletion order.
    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProviderCall::DeleteBranch { branch } => Some(branch),
                _ => None,
            })
            .collect()
    }

    /// Branches created, in creation order.
    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProviderCall::CreateBranch { created, .. } => Some(created),
                _ => None,
            })
            .collect()
    }

    pub fn exists(&self, branch: &str) -> bool {
        self.inner.lock().unwrap().branches.contains(branch)
    }

    pub fn branches(&self) -> Vec<String> {
        self.inner.lock().unwrap().branches.iter().cloned().collect()
    }

    /// Host the fake assigns to an endpoint on `branch`.
    pub fn host_for(branch: &str) -> String {
        format!("{}.neon.test", branch)
    }
}

#[async_trait]
impl BranchProvider for MemoryBranchProvider {
    async fn create_branch(&self, parent_branch_id: &str) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_create_for.contains(parent_branch_id) {
            return Err(NeonError::Api {
                operation: "create_branch",
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        let created = match inner.next_ids.pop_front() {
            Some(id) => id,
            None => {
                inner.counter += 1;
                format!("br-fake-{}", inner.counter)
            }
        };
        inner.branches.insert(created.clone());
        inner.calls.push(ProviderCall::CreateBranch {
            parent: parent_branch_id.to_string(),
            created: created.clone(),
        });
        Ok(created)
    }

    async fn create_endpoint(&self, branch_id: &str, _kind: EndpointType) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_endpoint_for.contains(branch_id) {
            return Err(NeonError::Api {
                operation: "create_endpoint",
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        let host = Self::host_for(branch_id);
        inner.calls.push(ProviderCall::CreateEndpoint {
            branch: branch_id.to_string(),
            host: host.clone(),
        });
        Ok(host)
    }

    async fn delete_branch(&self, branch_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_delete_for.contains(branch_id) {
            return Err(NeonError::Api {
                operation: "delete_branch",
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        if !inner.branches.remove(branch_id) {
            return Err(NeonError::BranchNotFound(branch_id.to_string()));
        }
        inner.calls.push(ProviderCall::DeleteBranch {
            branch: branch_id.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_uses_scripted_ids_then_counter() {
        let provider = MemoryBranchProvider::new().with_next_ids(["b1"]);
        assert_eq!(provider.create_branch("b0").await.unwrap(), "b1");
        assert_eq!(provider.create_branch("b0").await.unwrap(), "br-fake-1");
        assert!(provider.exists("b1"));
        assert_eq!(provider.created(), vec!["b1", "br-fake-1"]);
    }

    #[tokio::test]
    async fn test_delete_unknown_branch_fails() {
        let provider = MemoryBranchProvider::new();
        let err = provider.delete_branch("nope").await.unwrap_err();
        assert!(matches!(err, NeonError::BranchNotFound(_)));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let provider = MemoryBranchProvider::new()
            .with_branches(["b1"])
            .fail_create_from("b0")
            .fail_endpoint_for("b1")
            .fail_delete_of("b1");

        assert!(provider.create_branch("b0").await.is_err());
        assert!(provider
            .create_endpoint("b1", EndpointType::ReadWrite)
            .await
            .is_err());
        assert!(provider.delete_branch("b1").await.is_err());
        assert!(provider.exists("b1"));
    }

    #[tokio::test]
    async fn test_endpoint_host_is_derived_from_branch() {
        let provider = MemoryBranchProvider::new();
        let host = provider
            .create_endpoint("br-x", EndpointType::ReadWrite)
            .await
            .unwrap();
        assert_eq!(host, "br-x.neon.test");
    }
}
