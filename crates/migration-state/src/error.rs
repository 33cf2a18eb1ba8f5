//! Error types for migration-state

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the state persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Rollback was requested but no state was ever persisted
    #[error("no migration state found at {path:?}: nothing to roll back")]
    NotFound { path: PathBuf },

    /// The state file exists but cannot be decoded
    #[error("migration state at {path:?} is corrupted and must be resolved manually: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    /// The in-memory state could not be encoded
    #[error("migration state could not be serialized: {0}")]
    Serialization(String),

    /// The encoded state could not be made durable
    #[error("failed to persist migration state to {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure while reading or removing the state file
    #[error("migration state I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StateError {
    /// Whether the error means the on-disk record can no longer be trusted
    /// or updated. Callers must stop issuing external actions.
    pub fn is_durability_failure(&self) -> bool {
        matches!(
            self,
            StateError::Persist { .. } | StateError::Serialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_mentions_rollback() {
        let err = StateError::NotFound {
            path: PathBuf::from("state.msgpack"),
        };
        let msg = err.to_string();
        assert!(msg.contains("state.msgpack"));
        assert!(msg.contains("nothing to roll back"));
    }

    #[test]
    fn test_durability_failures() {
        let persist = StateError::Persist {
            path: PathBuf::from("s"),
            source: std::io::Error::other("disk full"),
        };
        assert!(persist.is_durability_failure());
        assert!(StateError::Serialization("bad".into()).is_durability_failure());

        let corrupted = StateError::Corrupted {
            path: PathBuf::from("s"),
            reason: "eof".into(),
        };
        assert!(!corrupted.is_durability_failure());
    }
}
