//! Error taxonomy for the bulk migrator.

use migration_state::{StateError, TenantId};
use neon_branch::NeonError;

/// Errors produced by the tenant registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to connect to the main database: {0}")]
    Connect(String),

    #[error("main database health check failed: {0}")]
    HealthCheck(String),

    #[error("registry query failed: {0}")]
    Query(String),

    #[error("registry row could not be decoded: {0}")]
    Decode(String),

    #[error("registry has no row for tenant {0}")]
    TenantNotFound(String),
}

/// Bulk migrator errors.
#[derive(Debug, thiserror::Error)]
pub enum MigratorError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot reach the main database: {0}")]
    Connectivity(#[source] RegistryError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("migration of tenant {tenant} finished with status code {exit_code}")]
    MigrationFailed { tenant: TenantId, exit_code: i32 },

    #[error("failed to rollback main schema: rollback command exited with status code {exit_code}")]
    MainRollbackFailed { exit_code: i32 },

    #[error("branch provider request failed: {0}")]
    Provider(#[from] NeonError),

    #[error("registry operation failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("{original}; rollback failed as well: {rollback}")]
    RollbackFailed {
        original: Box<MigratorError>,
        rollback: Box<MigratorError>,
    },
}

impl MigratorError {
    /// The state record could not be made durable. Nothing else may be
    /// attempted once this happens, including rollback.
    pub fn is_durability_failure(&self) -> bool {
        matches!(self, MigratorError::State(e) if e.is_durability_failure())
    }

    /// Process exit code that reports this error.
    ///
    /// A failed tenant migration reports the command's own status; anything
    /// else is a generic failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            MigratorError::MigrationFailed { exit_code, .. } if *exit_code != 0 => *exit_code,
            _ => 1,
        }
    }
}

/// Result type for bulk migrator operations.
pub type Result<T> = std::result::Result<T, MigratorError>;

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_migration_failed_carries_exit_code() {
        let err = MigratorError::MigrationFailed {
            tenant: TenantId::Int(2),
            exit_code: 3,
        };
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("status code 3"));
    }

    #[test]
    fn test_other_errors_exit_one() {
        let err = MigratorError::MainRollbackFailed { exit_code: 7 };
        assert_eq!(err.exit_code(), 1);

        let err = MigratorError::RollbackFailed {
            original: Box::new(MigratorError::MigrationFailed {
                tenant: TenantId::Int(2),
                exit_code: 3,
            }),
            rollback: Box::new(MigratorError::MainRollbackFailed { exit_code: 7 }),
        };
        assert_eq!(err.exit_code(), 1);
        let msg = err.to_string();
        assert!(msg.contains("status code 3"));
        assert!(msg.contains("status code 7"));
    }

    #[test]
    fn test_durability_failure_detection() {
        let err = MigratorError::State(StateError::Persist {
            path: PathBuf::from("state.msgpack"),
            source: std::io::Error::other("read-only file system"),
        });
        assert!(err.is_durability_failure());

        let err = MigratorError::State(StateError::NotFound {
            path: PathBuf::from("state.msgpack"),
        });
        assert!(!err.is_durability_failure());
        assert!(!MigratorError::Config("x".into()).is_durability_failure());
    }
}
