//! Trait contract tests for StateStore.
//!
//! These tests verify the behavioral contract of the state store against
//! both the file-backed store and the in-memory fake. Any conforming
//! implementation must pass these.

use migration_state::fakes::MemoryStateStore;
use migration_state::{
    FileStateStore, LoadMode, MigrationState, StateError, StateStore, TenantId, TenantRecord,
};
use tempfile::TempDir;
use uuid::Uuid;

fn file_store() -> (TempDir, FileStateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path().join("state.msgpack"));
    (dir, store)
}

fn sample_states() -> Vec<MigrationState> {
    let mixed = MigrationState {
        success: false,
        tenants: vec![
            TenantRecord::new(1, "br-1", "br-0"),
            TenantRecord::new(i64::MAX, "br-max", "br-0"),
            TenantRecord::new("tenant-acme", "br-acme", "br-acme-main"),
            TenantRecord::new(
                Uuid::parse_str("6f1c1a52-8f57-4c36-9a0b-1e0f2b0c9d11").unwrap(),
                "br-uuid",
                "",
            ),
        ],
    };
    let finished = MigrationState {
        success: true,
        tenants: vec![TenantRecord::new(-7, "br-neg", "br-root")],
    };
    vec![MigrationState::new(), mixed, finished]
}

fn assert_round_trips(store: &dyn StateStore) {
    for state in sample_states() {
        store.write(&state).unwrap();
        assert_eq!(store.load(LoadMode::Migrate).unwrap(), state);
        assert_eq!(store.load(LoadMode::Rollback).unwrap(), state);
    }
}

fn assert_rollback_requires_state(store: &dyn StateStore) {
    let err = store.load(LoadMode::Rollback).unwrap_err();
    assert!(matches!(err, StateError::NotFound { .. }));
    assert_eq!(
        store.load(LoadMode::Migrate).unwrap(),
        MigrationState::new()
    );
}

fn assert_delete_forgets_state(store: &dyn StateStore) {
    let mut state = MigrationState::new();
    state.record(TenantRecord::new(1, "b1", "b0"));
    store.write(&state).unwrap();

    store.delete().unwrap();
    assert!(store.load(LoadMode::Rollback).is_err());
    store.delete().unwrap();
}

// ===========================================================================
// FileStateStore
// ===========================================================================

#[test]
fn file_store_round_trips_every_id_kind() {
    let (_dir, store) = file_store();
    assert_round_trips(&store);
}

#[test]
fn file_store_rollback_requires_state() {
    let (_dir, store) = file_store();
    assert_rollback_requires_state(&store);
}

#[test]
fn file_store_delete_forgets_state() {
    let (_dir, store) = file_store();
    assert_delete_forgets_state(&store);
    assert!(!store.exists());
}

#[test]
fn file_store_preserves_id_kinds_exactly() {
    let (_dir, store) = file_store();
    let mut state = MigrationState::new();
    state.record(TenantRecord::new(TenantId::Text("42".into()), "b1", "b0"));
    state.record(TenantRecord::new(TenantId::Int(42), "b2", "b0"));
    store.write(&state).unwrap();

    let loaded = store.load(LoadMode::Rollback).unwrap();
    assert_eq!(loaded.tenants[0].id, TenantId::Text("42".into()));
    assert_eq!(loaded.tenants[1].id, TenantId::Int(42));
}

#[test]
fn file_store_truncated_file_is_corrupted() {
    let (_dir, store) = file_store();
    let mut state = MigrationState::new();
    state.record(TenantRecord::new("acme", "br-acme", "br-main"));
    store.write(&state).unwrap();

    let bytes = std::fs::read(store.path()).unwrap();
    std::fs::write(store.path(), &bytes[..bytes.len() / 2]).unwrap();

    let err = store.load(LoadMode::Migrate).unwrap_err();
    assert!(matches!(err, StateError::Corrupted { .. }));
}

#[test]
fn file_store_is_shared_across_instances() {
    let (_dir, store) = file_store();
    let mut state = MigrationState::new();
    state.record(TenantRecord::new(9, "b9", "b0"));
    store.write(&state).unwrap();

    let reopened = FileStateStore::new(store.path());
    assert_eq!(reopened.load(LoadMode::Rollback).unwrap(), state);
}

// ===========================================================================
// MemoryStateStore
// ===========================================================================

#[test]
fn memory_store_round_trips_every_id_kind() {
    assert_round_trips(&MemoryStateStore::new());
}

#[test]
fn memory_store_rollback_requires_state() {
    assert_rollback_requires_state(&MemoryStateStore::new());
}

#[test]
fn memory_store_delete_forgets_state() {
    let store = MemoryStateStore::new();
    assert_delete_forgets_state(&store);
    assert_eq!(store.delete_count(), 2);
}

#[test]
fn memory_store_records_write_history() {
    let store = MemoryStateStore::new();
    let mut state = MigrationState::new();
    for i in 1..=3 {
        state.record(TenantRecord::new(i, format!("b{}", i), "b0"));
        store.write(&state).unwrap();
    }

    let lens: Vec<usize> = store.writes().iter().map(|s| s.tenants.len()).collect();
    assert_eq!(lens, vec![1, 2, 3]);
    assert_eq!(store.persisted_tenants(), 3);
}

#[test]
fn memory_store_injected_failure_keeps_previous_state() {
    let store = MemoryStateStore::new().fail_writes_after(1);
    let mut state = MigrationState::new();
    state.record(TenantRecord::new(1, "b1", "b0"));
    store.write(&state).unwrap();

    state.record(TenantRecord::new(2, "b2", "b0"));
    let err = store.write(&state).unwrap_err();
    assert!(err.is_durability_failure());
    assert_eq!(store.persisted_tenants(), 1);
}
