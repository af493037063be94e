//! Error types for photoback-backup.

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

use photoback_core::types::{ArchiveName, RepositoryTarget};
use photoback_engine::EngineError;

/// All errors that can arise while backing up one repository or a batch.
#[derive(Debug, Error)]
pub enum BackupError {
    /// A failure the backup core could not recover from locally.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no free archive name for {base} in {repository} after {attempts} attempts")]
    NamesExhausted {
        repository: RepositoryTarget,
        base: ArchiveName,
        attempts: u32,
    },

    #[error("folder name {name:?} under {root} is not valid UTF-8")]
    InvalidFolderName { root: PathBuf, name: OsString },
}

impl BackupError {
    /// Access-policy aborts stop the whole batch, not just one repository.
    pub fn is_access_aborted(&self) -> bool {
        matches!(self, BackupError::Engine(e) if e.is_access_aborted())
    }
}

/// Convenience constructor for [`BackupError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BackupError {
    BackupError::Io {
        path: path.into(),
        source,
    }
}
