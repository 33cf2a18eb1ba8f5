//! MessagePack state file with atomic replacement.
//!
//! Writes go to a temporary file in the same directory, are flushed and
//! fsynced, then renamed over the target. A crash at any point leaves
//! either the old file or the new one, never a torn mix.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::error::StateError;
use crate::schema::MigrationState;
use crate::storage_traits::{LoadMode, StateStore};
use crate::Result;

/// File name used when no explicit state path is configured
pub const DEFAULT_STATE_FILE: &str = "state.msgpack";

/// State store backed by a single local file
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a state file is currently present
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn persist_err(&self, source: std::io::Error) -> StateError {
        StateError::Persist {
            path: self.path.clone(),
            source,
        }
    }
}

impl Default for FileStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl StateStore for FileStateStore {
    #[instrument(skip(self), fields(path = ?self.path))]
    fn load(&self, mode: LoadMode) -> Result<MigrationState> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return match mode {
                    LoadMode::Migrate => {
                        debug!("no state file, starting from empty state");
                        Ok(MigrationState::new())
                    }
                    LoadMode::Rollback => Err(StateError::NotFound {
                        path: self.path.clone(),
                    }),
                };
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let state: MigrationState =
            rmp_serde::from_slice(&bytes).map_err(|e| StateError::Corrupted {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            tenants = state.tenants.len(),
            success = state.success,
            "loaded state file"
        );
        Ok(state)
    }

    #[instrument(skip(self, state), fields(path = ?self.path, tenants = state.tenants.len()))]
    fn write(&self, state: &MigrationState) -> Result<()> {
        let bytes =
            rmp_serde::to_vec_named(state).map_err(|e| StateError::Serialization(e.to_string()))?;

        let dir = self.parent_dir();
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.persist_err(e))?;
        tmp.write_all(&bytes).map_err(|e| self.persist_err(e))?;
        tmp.flush().map_err(|e| self.persist_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.persist_err(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.persist_err(e.error))?;

        // The rename itself is only durable once the directory entry is.
        #[cfg(unix)]
        {
            fs::File::open(dir)
                .and_then(|d| d.sync_all())
                .map_err(|e| self.persist_err(e))?;
        }

        debug!("state checkpoint written");
        Ok(())
    }

    #[instrument(skip(self), fields(path = ?self.path))]
    fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
