//! Log output of `neon-bulk-migrator`.
//!
//! Everything the migrator reports (run events, per-tenant progress,
//! rollback steps) is written to stderr. The migrate and rollback commands
//! inherit stdout, so their output reaches the terminal untouched.
//!
//! `--verbose` raises the migrator's own crates to DEBUG; `--json` switches
//! to one JSON object per line with the event fields (`tenant`, `branch`,
//! `exit_code`, ...) as keys. `RUST_LOG` overrides both levels.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const MIGRATOR_TARGETS: &[&str] = &[
    "neon_bulk_migrator",
    "bulk_migrator_core",
    "neon_branch",
    "migration_state",
];

/// Filter used when `RUST_LOG` is unset: `level` for the migrator crates,
/// WARN for the database and HTTP stacks underneath.
pub fn default_filter(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        MIGRATOR_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level.as_str().to_lowercase())),
    );
    directives.join(",")
}

/// Install the stderr subscriber. Later calls keep the first subscriber.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_scopes_level_to_migrator_crates() {
        let filter = default_filter(Level::DEBUG);
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("bulk_migrator_core=debug"));
        assert!(filter.contains("neon_bulk_migrator=debug"));
        assert!(!filter.contains("tokio_postgres"));
    }

    #[test]
    fn test_default_filter_parses() {
        for level in [Level::INFO, Level::DEBUG, Level::TRACE] {
            assert!(EnvFilter::try_new(default_filter(level)).is_ok());
        }
    }

    #[test]
    fn test_init_tracing_twice_keeps_first_subscriber() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!(tenant = 1, "still logging");
    }
}
