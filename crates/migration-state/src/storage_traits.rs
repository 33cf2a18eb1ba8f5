//! Storage trait for migration state.
//!
//! `StateStore` is the only way the migrator reads or changes its durable
//! record. Every `write` is a durability checkpoint: when it returns `Ok`
//! the new state survives a crash, and when it fails the previous state
//! is still intact on disk.
//!
//! An in-memory fake is provided for testing via the `fakes` module.

use crate::schema::MigrationState;
use crate::Result;

/// How a missing state file is interpreted on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// A normal run: no file means a fresh, empty state.
    Migrate,
    /// An explicit rollback: no file means there is nothing to undo.
    Rollback,
}

/// Durable record of an in-progress migration.
///
/// Guarantees:
/// - `load` after `write(s)` returns exactly `s`.
/// - `write` replaces the whole record atomically.
/// - `load(LoadMode::Rollback)` fails with `StateError::NotFound` when
///   nothing was ever persisted.
/// - An undecodable record fails with `StateError::Corrupted` and is
///   never overwritten by `load`.
pub trait StateStore: Send + Sync {
    /// Read the persisted state.
    fn load(&self, mode: LoadMode) -> Result<MigrationState>;

    /// Persist the full state, replacing whatever was recorded before.
    fn write(&self, state: &MigrationState) -> Result<()>;

    /// Remove the record. Removing an absent record is not an error.
    fn delete(&self) -> Result<()>;
}
