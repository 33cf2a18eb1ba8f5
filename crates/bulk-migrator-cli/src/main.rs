//! Neon Bulk Migrator CLI
//!
//! The `neon-bulk-migrator` command migrates the shared tenant schema and
//! then every tenant branch listed in the registry table. If any tenant
//! fails, every tenant touched so far is rolled back.
//!
//! ## Modes
//!
//! - default: migrate (automatically undoing a crashed previous run first)
//! - `--rollback-mode`: undo the run recorded in the state file

use std::path::PathBuf;

use anyhow::{Context, Result};
use bulk_migrator_core::obs::emit_fatal;
use bulk_migrator_core::{
    FileStateStore, MigrationConfig, MigrationOrchestrator, MigrationOutcome, MigratorError,
    NeonClient, NeonConfig, PgRegistry, RegistryConfig, RoleCredentials, Services,
    ShellCommandRunner, DEFAULT_NEON_API_URL,
};
use clap::Parser;
use tracing::{debug, error, Level};

#[derive(Parser, Debug)]
#[command(name = "neon-bulk-migrator")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Migrate every tenant branch of a Neon project, rolling back on failure",
    long_about = None
)]
struct Cli {
    /// Connection URL of the main database holding the registry table
    #[arg(long, env = "MIGRATOR_MAIN_CONNECTION_URL", hide_env_values = true)]
    main_connection_url: String,

    /// Registry table listing every tenant
    #[arg(long, env = "MIGRATOR_TABLE_NAME")]
    table_name: String,

    /// Registry column holding the tenant connection URL. Taken as raw SQL,
    /// so a JSON expression such as `data->'url'` or `data->>'url'` works
    #[arg(long, env = "MIGRATOR_TABLE_CONNECTION_COLUMN")]
    table_connection_column: String,

    /// Registry column holding the tenant branch id
    #[arg(long, env = "MIGRATOR_TABLE_BRANCH_COLUMN")]
    table_branch_column: String,

    /// Registry column holding the tenant id
    #[arg(long, env = "MIGRATOR_TABLE_ID_COLUMN")]
    table_id_column: String,

    /// Shell command that migrates the database at $CONNECTION_URL
    #[arg(long, env = "MIGRATOR_MIGRATE_COMMAND")]
    migrate_command_name: String,

    /// Shell command that reverts the migration at $CONNECTION_URL
    #[arg(long, env = "MIGRATOR_ROLLBACK_COMMAND")]
    rollback_command_name: String,

    /// Connection URL of the database holding the shared tenant schema
    #[arg(
        long,
        env = "MIGRATOR_TENANT_SCHEMA_CONNECTION_URL",
        hide_env_values = true
    )]
    tenant_schema_connection_url: String,

    /// Role used to connect to tenant branches
    #[arg(long, env = "NEON_ROLE_NAME")]
    neon_role_name: String,

    /// Password of the tenant role
    #[arg(long, env = "NEON_ROLE_PASSWORD", hide_env_values = true)]
    neon_role_password: String,

    /// Neon API key
    #[arg(long, env = "NEON_API_KEY", hide_env_values = true)]
    neon_api_key: String,

    /// Neon project owning every tenant branch
    #[arg(long, env = "NEON_PROJECT_ID")]
    neon_project_id: String,

    /// Database name on each tenant branch
    #[arg(long, env = "NEON_DATABASE_NAME")]
    neon_database_name: String,

    /// Neon API base URL
    #[arg(long, env = "NEON_API_URL", default_value = DEFAULT_NEON_API_URL)]
    neon_api_url: String,

    /// Only roll back the run recorded in the state file
    #[arg(long, env = "MIGRATOR_ROLLBACK_MODE")]
    rollback_mode: bool,

    /// Path of the state file
    #[arg(long, env = "MIGRATOR_STATE_FILE", default_value = "state.msgpack")]
    state_file: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_config(self) -> MigrationConfig {
        MigrationConfig {
            main_connection_url: self.main_connection_url,
            registry: RegistryConfig::new(
                &self.table_name,
                &self.table_id_column,
                &self.table_branch_column,
                &self.table_connection_column,
            ),
            migrate_command: self.migrate_command_name,
            rollback_command: self.rollback_command_name,
            tenant_schema_connection_url: self.tenant_schema_connection_url,
            credentials: RoleCredentials::new(
                &self.neon_role_name,
                &self.neon_role_password,
                &self.neon_database_name,
            ),
            neon: NeonConfig::new(&self.neon_api_key, &self.neon_project_id)
                .with_api_url(&self.neon_api_url),
            state_path: self.state_file,
            rollback_mode: self.rollback_mode,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    bulk_migrator_core::init_tracing(cli.json, level);

    let code = match execute(cli.into_config()).await {
        Ok(code) => code,
        Err(err) => {
            emit_fatal(&format!("{:#}", err));
            1
        }
    };
    std::process::exit(code);
}

/// Wire the real services together and run once. Returns the exit code.
async fn execute(config: MigrationConfig) -> Result<i32> {
    config.validate()?;

    let provider =
        NeonClient::new(config.neon.clone()).context("Failed to create Neon API client")?;
    let registry = PgRegistry::connect(&config.main_connection_url, config.registry.clone())
        .await
        .map_err(MigratorError::Connectivity)?;
    let store = FileStateStore::new(&config.state_path);
    let runner = ShellCommandRunner::new();

    let result = {
        let services = Services::new(&store, &provider, &registry, &runner);
        MigrationOrchestrator::new(&config, services).run().await
    };
    registry.close().await;

    Ok(report(result))
}

/// Log how the run ended and pick the exit code for it.
fn report(result: bulk_migrator_core::Result<MigrationOutcome>) -> i32 {
    match result {
        Ok(outcome) => {
            match &outcome {
                MigrationOutcome::Migrated { .. } | MigrationOutcome::RolledBack { .. } => {
                    debug!(exit_code = 0, "run finished");
                }
                MigrationOutcome::MainSchemaFailed { exit_code } => {
                    error!("main schema migration failed with status code {}", exit_code);
                }
                MigrationOutcome::TenantMigrationRolledBack { error, tenants } => {
                    error!(
                        "{}; {} tenants rolled back, no tenant remains migrated",
                        error, tenants
                    );
                }
            }
            outcome.exit_code()
        }
        Err(err) => {
            emit_fatal(&err);
            err.exit_code()
        }
    }
}
