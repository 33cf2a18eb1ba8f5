//! External migrate/rollback command execution.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Environment variable carrying the target database to the command
pub const CONNECTION_URL_ENV: &str = "CONNECTION_URL";

/// Runs an opaque migration or rollback script against one database.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` with `CONNECTION_URL` set to `connection_url` and
    /// return its exit code (0 = success).
    async fn run(&self, command: &str, connection_url: &str) -> i32;
}

/// The user's shell: `$SHELL`, falling back to the platform default.
pub fn detect_shell() -> String {
    match std::env::var("SHELL") {
        Ok(shell) if !shell.is_empty() => shell,
        _ if cfg!(windows) => "powershell".to_string(),
        _ => "/bin/sh".to_string(),
    }
}

/// Runs commands through `<shell> -c`, inheriting stdout and stderr.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shell: String,
}

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self::with_shell(detect_shell())
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        ShellCommandRunner {
            shell: shell.into(),
        }
    }
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str, connection_url: &str) -> i32 {
        debug!(shell = %self.shell, %command, "running command");

        let mut child = match Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .env(CONNECTION_URL_ENV, connection_url)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!(shell = %self.shell, error = %e, "failed to start command");
                return 1;
            }
        };

        match child.wait().await {
            Ok(status) => status.code().unwrap_or_else(|| {
                warn!(%command, "command terminated without an exit code");
                1
            }),
            Err(e) => {
                error!(error = %e, "failed to execute command");
                1
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh() -> ShellCommandRunner {
        ShellCommandRunner::with_shell("/bin/sh")
    }

    #[tokio::test]
    async fn test_success_returns_zero() {
        assert_eq!(sh().run("true", "postgresql://x").await, 0);
    }

    #[tokio::test]
    async fn test_exit_code_is_propagated() {
        assert_eq!(sh().run("exit 3", "postgresql://x").await, 3);
    }

    #[tokio::test]
    async fn test_connection_url_is_exported() {
        let code = sh()
            .run(
                r#"test "$CONNECTION_URL" = "postgresql://app@ep-1/tenant""#,
                "postgresql://app@ep-1/tenant",
            )
            .await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_parent_environment_is_inherited() {
        let code = sh().run(r#"test -n "$PATH""#, "postgresql://x").await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_missing_shell_counts_as_failure() {
        let runner = ShellCommandRunner::with_shell("/definitely/not/a/shell");
        assert_eq!(runner.run("true", "postgresql://x").await, 1);
    }

    #[tokio::test]
    async fn test_killed_command_counts_as_failure() {
        assert_eq!(sh().run("kill -9 $$", "postgresql://x").await, 1);
    }
}
