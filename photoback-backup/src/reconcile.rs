//! Repository reconciliation: bring a repository from "unknown" to "present
//! and verified" before anything is archived into it.
//!
//! ```text
//! check ──ok──────────────────────────────► Verified
//!   └─ missing ─► init ──ok───────────────► Initialized
//!                  └─ already exists ─────► AlreadyPresent
//! ```
//!
//! Any other `check` failure is fatal: a corrupt or unreachable repository
//! must never be papered over by initializing a new one.

use photoback_core::types::RepositoryTarget;
use photoback_engine::{ArchiveEngine, CheckOptions, EngineError, InitOptions};

use crate::BackupError;

/// How the repository became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// It existed and passed `check`.
    Verified,
    /// It was missing and has been initialized.
    Initialized,
    /// `check` reported it missing but `init` found it already there
    /// (a concurrent run or a stale partial one).
    AlreadyPresent,
}

/// Make sure `repository` exists and is verified. Idempotent.
pub fn ensure_ready<E: ArchiveEngine + ?Sized>(
    engine: &E,
    repository: &RepositoryTarget,
    check: &CheckOptions,
    init: &InitOptions,
) -> Result<Readiness, BackupError> {
    match engine.check(repository, check) {
        Ok(()) => {
            tracing::info!(%repository, "repository verified");
            return Ok(Readiness::Verified);
        }
        Err(EngineError::RepositoryMissing { .. }) => {
            tracing::info!(%repository, "repository does not exist, initializing");
        }
        Err(err) => return Err(err.into()),
    }

    match engine.init(repository, init) {
        Ok(()) => {
            tracing::info!(%repository, "repository initialized");
            Ok(Readiness::Initialized)
        }
        Err(EngineError::RepositoryExists { .. }) => {
            tracing::info!(%repository, "repository already exists");
            Ok(Readiness::AlreadyPresent)
        }
        Err(err) => Err(err.into()),
    }
}
