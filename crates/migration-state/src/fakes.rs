//! In-memory fake for the state store (testing only)
//!
//! `MemoryStateStore` satisfies the `StateStore` contract and additionally
//! keeps every successful write, so tests can check the exact sequence of
//! durability checkpoints a run produced.

use std::sync::{Arc, Mutex};

use crate::error::StateError;
use crate::schema::MigrationState;
use crate::storage_traits::{LoadMode, StateStore};
use crate::Result;

#[derive(Debug, Default)]
struct Inner {
    current: Option<MigrationState>,
    writes: Vec<MigrationState>,
    deletes: usize,
    fail_write_after: Option<usize>,
}

/// In-memory state store. Clones share the same underlying record.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `state`, as if left by a previous run.
    pub fn with_state(state: MigrationState) -> Self {
        let store = Self::new();
        store.inner.lock().unwrap().current = Some(state);
        store
    }

    /// Fail every write after the first `n` succeed.
    pub fn fail_writes_after(self, n: usize) -> Self {
        self.inner.lock().unwrap().fail_write_after = Some(n);
        self
    }

    /// The currently persisted state, if any.
    pub fn current(&self) -> Option<MigrationState> {
        self.inner.lock().unwrap().current.clone()
    }

    /// Every state successfully written, oldest first.
    pub fn writes(&self) -> Vec<MigrationState> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Number of persisted tenants right now (0 when absent).
    pub fn persisted_tenants(&self) -> usize {
        self.current().map(|s| s.tenants.len()).unwrap_or(0)
    }

    pub fn delete_count(&self) -> usize {
        self.inner.lock().unwrap().deletes
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, mode: LoadMode) -> Result<MigrationState> {
        let inner = self.inner.lock().unwrap();
        match (&inner.current, mode) {
            (Some(state), _) => Ok(state.clone()),
            (None, LoadMode::Migrate) => Ok(MigrationState::new()),
            (None, LoadMode::Rollback) => Err(StateError::NotFound {
                path: "<memory>".into(),
            }),
        }
    }

    fn write(&self, state: &MigrationState) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(limit) = inner.fail_write_after {
            if inner.writes.len() >= limit {
                return Err(StateError::Persist {
                    path: "<memory>".into(),
                    source: std::io::Error::other("injected write failure"),
                });
            }
        }
        inner.current = Some(state.clone());
        inner.writes.push(state.clone());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.current = None;
        inner.deletes += 1;
        Ok(())
    }
}
