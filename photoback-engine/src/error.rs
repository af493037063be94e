//! Error types for photoback-engine.

use std::path::PathBuf;

use thiserror::Error;

use photoback_core::types::{ArchiveName, RepositoryTarget};

use crate::client::Operation;

/// Failures reported by an archive engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("repository {repository} does not exist")]
    RepositoryMissing { repository: RepositoryTarget },

    #[error("repository {repository} already exists")]
    RepositoryExists { repository: RepositoryTarget },

    #[error("archive {archive} already exists in {repository}")]
    ArchiveExists {
        repository: RepositoryTarget,
        archive: ArchiveName,
    },

    /// The engine refused access by policy, usually because the repository
    /// was relocated.
    #[error("access to repository {repository} aborted by policy; the repository was probably relocated")]
    AccessAborted { repository: RepositoryTarget },

    /// Any other engine-side failure (corruption, permissions, I/O).
    #[error("{operation} failed for {repository}{}: {message}", exit_suffix(.code))]
    Failed {
        operation: Operation,
        repository: RepositoryTarget,
        code: Option<i32>,
        message: String,
    },

    /// The engine program could not be started.
    #[error("cannot run archive engine {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Talking to a running engine failed.
    #[error("lost contact with archive engine during {operation} on {repository}: {source}")]
    Pipe {
        operation: Operation,
        repository: RepositoryTarget,
        #[source]
        source: std::io::Error,
    },

    /// The engine succeeded but printed something we cannot understand.
    #[error("unexpected {operation} output for {repository}: {message}")]
    Output {
        operation: Operation,
        repository: RepositoryTarget,
        message: String,
    },
}

impl EngineError {
    pub fn is_access_aborted(&self) -> bool {
        matches!(self, EngineError::AccessAborted { .. })
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {code})"),
        None => String::new(),
    }
}
