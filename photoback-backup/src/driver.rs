//! Single-repository backup: freshness gate, then reconciliation, then
//! name allocation. Each step only runs if the previous one succeeded.

use chrono::{DateTime, Duration, Utc};

use photoback_core::types::{ArchiveName, ArchiveRecord, BackupPolicy, RepositoryTarget, SourceFolder};
use photoback_engine::{ArchiveEngine, CheckOptions, CreateOptions, InitOptions};

use crate::allocate::allocate;
use crate::freshness::{self, format_age, Freshness};
use crate::reconcile::{ensure_ready, Readiness};
use crate::BackupError;

/// Everything a backup run needs besides the engine and the folders.
#[derive(Debug, Clone, Default)]
pub struct BackupSettings {
    /// Logical archive name shared by every repository in the run.
    pub base_name: ArchiveName,
    pub policy: BackupPolicy,
    pub check: CheckOptions,
    pub init: InitOptions,
    pub create: CreateOptions,
}

impl BackupSettings {
    pub fn new(base_name: ArchiveName, policy: BackupPolicy) -> Self {
        Self {
            base_name,
            policy,
            ..Self::default()
        }
    }
}

/// Result of backing up one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The latest archive is still fresh; the repository was not touched.
    Skipped {
        latest: ArchiveRecord,
        age: Duration,
        remaining: Duration,
    },
    /// A new archive was created.
    Created {
        archive: ArchiveName,
        readiness: Readiness,
    },
}

impl BackupOutcome {
    pub fn ran_backup(&self) -> bool {
        matches!(self, BackupOutcome::Created { .. })
    }

    pub fn archive_name(&self) -> Option<&ArchiveName> {
        match self {
            BackupOutcome::Created { archive, .. } => Some(archive),
            BackupOutcome::Skipped { .. } => None,
        }
    }
}

/// Back up `source` into `repository` unless its latest archive is fresh.
pub fn backup_one<E: ArchiveEngine + ?Sized>(
    engine: &E,
    repository: &RepositoryTarget,
    source: &SourceFolder,
    settings: &BackupSettings,
) -> Result<BackupOutcome, BackupError> {
    backup_one_at(engine, repository, source, settings, Utc::now())
}

/// [`backup_one`] with the freshness clock fixed by the caller.
pub fn backup_one_at<E: ArchiveEngine + ?Sized>(
    engine: &E,
    repository: &RepositoryTarget,
    source: &SourceFolder,
    settings: &BackupSettings,
    now: DateTime<Utc>,
) -> Result<BackupOutcome, BackupError> {
    if let Freshness::Fresh {
        latest,
        age,
        remaining,
    } = freshness::check_at(engine, repository, settings.policy.min_age, now)?
    {
        tracing::info!(
            %repository,
            archive = %settings.base_name,
            latest = %latest.name,
            age = %format_age(age),
            remaining = %format_age(remaining),
            "backup not necessary, latest archive is still fresh"
        );
        return Ok(BackupOutcome::Skipped {
            latest,
            age,
            remaining,
        });
    }

    let readiness = ensure_ready(engine, repository, &settings.check, &settings.init)?;

    tracing::info!(
        %repository,
        source = %source.absolute().display(),
        "backing up"
    );
    let archive = allocate(engine, repository, &settings.base_name, source, &settings.create)?;

    Ok(BackupOutcome::Created { archive, readiness })
}
