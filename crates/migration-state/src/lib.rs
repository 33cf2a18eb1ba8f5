//! Migration-State: Durable Run Record for the Neon Bulk Migrator
//!
//! This crate owns the on-disk record of an in-progress bulk migration.
//! Every branch the migrator creates is written here before any further
//! risk is taken, so a crashed or failed run can always be unwound.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Durability, atomic replacement, and exact round-tripping.
//!
//! ## Key Components
//!
//! - `MigrationState`: The ordered list of tenants whose branch was created
//! - `TenantId`: Registry identifier preserved verbatim (int, text, uuid)
//! - `StateStore`: load / write / delete contract
//! - `FileStateStore`: MessagePack file replaced atomically via rename

mod error;
pub mod fakes;
mod file_store;
mod schema;
pub mod storage_traits;

pub use error::StateError;
pub use file_store::{FileStateStore, DEFAULT_STATE_FILE};
pub use schema::{MigrationState, TenantId, TenantRecord};
pub use storage_traits::{LoadMode, StateStore};

/// Result type for migration-state operations
pub type Result<T> = std::result::Result<T, StateError>;
