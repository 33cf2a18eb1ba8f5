//! Immutable run configuration.
//!
//! Built once at startup (the CLI maps flags and environment variables onto
//! it) and passed by reference to everything that needs it.

use std::path::PathBuf;

use migration_state::DEFAULT_STATE_FILE;
use neon_branch::{NeonConfig, RoleCredentials};

use crate::error::{MigratorError, Result};

/// Where the registry lives inside the main database.
///
/// Values are raw SQL fragments spliced into the statements verbatim, so
/// column expressions such as `data->>'branch'` work for reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub table_name: String,
    pub id_column: String,
    pub branch_column: String,
    pub connection_column: String,
}

impl RegistryConfig {
    pub fn new(
        table_name: &str,
        id_column: &str,
        branch_column: &str,
        connection_column: &str,
    ) -> Self {
        RegistryConfig {
            table_name: table_name.to_string(),
            id_column: id_column.to_string(),
            branch_column: branch_column.to_string(),
            connection_column: connection_column.to_string(),
        }
    }

    /// `SELECT id, branch, connection FROM table`
    pub fn select_sql(&self) -> String {
        format!(
            "SELECT {}, {}, {} FROM {}",
            self.id_column, self.branch_column, self.connection_column, self.table_name
        )
    }

    /// `UPDATE table SET branch = $1, connection = $2 WHERE id = $3 RETURNING branch`
    pub fn restore_sql(&self) -> String {
        format!(
            "UPDATE {} SET {} = $1, {} = $2 WHERE {} = $3 RETURNING {}",
            self.table_name,
            self.branch_column,
            self.connection_column,
            self.id_column,
            self.branch_column
        )
    }
}

/// Everything one invocation of the migrator needs to know.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Main database holding the registry table
    pub main_connection_url: String,
    pub registry: RegistryConfig,
    /// Shell command that applies the migration to `$CONNECTION_URL`
    pub migrate_command: String,
    /// Shell command that reverts the migration on `$CONNECTION_URL`
    pub rollback_command: String,
    /// Database holding the shared tenant schema
    pub tenant_schema_connection_url: String,
    /// Role and database used to reach tenant branches
    pub credentials: RoleCredentials,
    pub neon: NeonConfig,
    pub state_path: PathBuf,
    /// Only undo the last recorded run
    pub rollback_mode: bool,
}

impl MigrationConfig {
    /// Reject configurations with required values left empty.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("main connection URL", &self.main_connection_url),
            ("table name", &self.registry.table_name),
            ("table id column", &self.registry.id_column),
            ("table branch column", &self.registry.branch_column),
            ("table connection column", &self.registry.connection_column),
            ("migrate command", &self.migrate_command),
            ("rollback command", &self.rollback_command),
            (
                "tenant schema connection URL",
                &self.tenant_schema_connection_url,
            ),
            ("Neon role name", &self.credentials.role_name),
            ("Neon role password", &self.credentials.role_password),
            ("Neon database name", &self.credentials.database_name),
            ("Neon API key", &self.neon.api_key),
            ("Neon project id", &self.neon.project_id),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MigratorError::Config(format!(
                "missing required values: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn default_state_path() -> PathBuf {
        PathBuf::from(DEFAULT_STATE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::sample_config;

    #[test]
    fn test_select_sql() {
        let registry = RegistryConfig::new("tenants", "id", "branch_id", "data->>'url'");
        assert_eq!(
            registry.select_sql(),
            "SELECT id, branch_id, data->>'url' FROM tenants"
        );
    }

    #[test]
    fn test_restore_sql_writes_and_returns_branch() {
        let registry = RegistryConfig::new("tenants", "id", "branch_id", "conn");
        assert_eq!(
            registry.restore_sql(),
            "UPDATE tenants SET branch_id = $1, conn = $2 WHERE id = $3 RETURNING branch_id"
        );
    }

    #[test]
    fn test_sample_config_is_valid() {
        sample_config().validate().unwrap();
    }

    #[test]
    fn test_validate_lists_every_missing_value() {
        let mut config = sample_config();
        config.migrate_command = String::new();
        config.credentials.role_password = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("migrate command"), "{}", err);
        assert!(err.contains("Neon role password"), "{}", err);
        assert!(!err.contains("rollback command"), "{}", err);
    }

    #[test]
    fn test_default_state_path() {
        assert_eq!(
            MigrationConfig::default_state_path(),
            PathBuf::from("state.msgpack")
        );
    }
}
