//! Archive name allocation.
//!
//! Creating the archive *is* the existence check: `base` is tried first, then
//! `base-1`, `base-2`, ... until the engine accepts one. Only an
//! "archive already exists" answer moves on to the next name.

use photoback_core::types::{ArchiveName, RepositoryTarget, SourceFolder};
use photoback_engine::{ArchiveEngine, CreateOptions, EngineError};

use crate::BackupError;

/// Upper bound on names tried per allocation.
pub const MAX_NAME_ATTEMPTS: u32 = 4096;

/// Create an archive of `source` under the first free name derived from `base`.
pub fn allocate<E: ArchiveEngine + ?Sized>(
    engine: &E,
    repository: &RepositoryTarget,
    base: &ArchiveName,
    source: &SourceFolder,
    options: &CreateOptions,
) -> Result<ArchiveName, BackupError> {
    allocate_with_limit(engine, repository, base, source, options, MAX_NAME_ATTEMPTS)
}

/// [`allocate`] with an explicit attempt ceiling.
pub fn allocate_with_limit<E: ArchiveEngine + ?Sized>(
    engine: &E,
    repository: &RepositoryTarget,
    base: &ArchiveName,
    source: &SourceFolder,
    options: &CreateOptions,
    max_attempts: u32,
) -> Result<ArchiveName, BackupError> {
    for attempt in 0..max_attempts {
        let name = if attempt == 0 {
            base.clone()
        } else {
            base.with_suffix(attempt)
        };
        match engine.create(repository, &name, source, options) {
            Ok(()) => {
                tracing::info!(%repository, archive = %name, "archive created");
                return Ok(name);
            }
            Err(EngineError::ArchiveExists { .. }) => {
                tracing::info!(%repository, archive = %name, "archive name taken, trying another");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(BackupError::NamesExhausted {
        repository: repository.clone(),
        base: base.clone(),
        attempts: max_attempts,
    })
}
