//! Bulk Migrator Core Library
//!
//! Migrates every tenant branch of a Neon project with an arbitrary
//! migrate command, and rolls the whole batch back when any tenant fails.
//!
//! ## Key Components
//!
//! - `MigrationOrchestrator`: the run state machine (resume, migrate, roll back)
//! - `RollbackCoordinator`: undoes a recorded run newest-first
//! - `Registry` / `PgRegistry`: the tenant table in the main database
//! - `CommandRunner` / `ShellCommandRunner`: runs the user's scripts

pub mod config;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod orchestrator;
pub mod pg_registry;
pub mod registry;
pub mod rollback;
pub mod runner;
pub mod telemetry;

pub use config::{MigrationConfig, RegistryConfig};
pub use error::{MigratorError, RegistryError, RegistryResult, Result};
pub use orchestrator::{MigrationOrchestrator, MigrationOutcome, Services};
pub use pg_registry::PgRegistry;
pub use registry::{Registry, TenantRow, TenantStream};
pub use rollback::{RollbackCoordinator, RollbackReport};
pub use runner::{detect_shell, CommandRunner, ShellCommandRunner, CONNECTION_URL_ENV};
pub use telemetry::init_tracing;

pub use migration_state::{
    FileStateStore, LoadMode, MigrationState, StateError, StateStore, TenantId, TenantRecord,
};
pub use neon_branch::{
    BranchProvider, EndpointType, NeonClient, NeonConfig, RoleCredentials,
    DEFAULT_API_URL as DEFAULT_NEON_API_URL,
};
