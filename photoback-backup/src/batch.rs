//! Batch driver: one repository per immediate subdirectory of the source root.
//!
//! Folders are processed sequentially in name order. A failure in one
//! repository is recorded in the report and the batch moves on; only an
//! access-policy abort stops the whole run.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use photoback_core::types::{RepositoryTarget, SourceFolder};
use photoback_engine::ArchiveEngine;

use crate::driver::{backup_one, BackupOutcome, BackupSettings};
use crate::error::io_err;
use crate::BackupError;

/// What happened to one source folder.
#[derive(Debug)]
pub struct RepositoryReport {
    /// Folder name, lossily converted if it was not UTF-8.
    pub folder: String,
    pub source: PathBuf,
    /// `None` when no repository could be derived from the folder name.
    pub repository: Option<RepositoryTarget>,
    pub result: Result<BackupOutcome, BackupError>,
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Every folder visited.
    pub attempted: usize,
    /// Folders that got a new archive.
    pub succeeded: usize,
    /// Folders whose latest archive was still fresh.
    pub skipped: usize,
    pub failed: usize,
}

/// Per-folder results of [`backup_all`], in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<RepositoryReport>,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            attempted: self.entries.len(),
            ..BatchSummary::default()
        };
        for entry in &self.entries {
            match &entry.result {
                Ok(outcome) if outcome.ran_backup() => summary.succeeded += 1,
                Ok(_) => summary.skipped += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.result.is_err())
    }
}

/// A batch that stopped before visiting every folder.
#[derive(Debug, Error)]
#[error("backup run stopped: {source}")]
pub struct BatchAborted {
    /// Folders processed before the stop.
    pub report: BatchReport,
    #[source]
    pub source: BackupError,
}

impl BatchAborted {
    pub fn is_access_aborted(&self) -> bool {
        self.source.is_access_aborted()
    }
}

/// Back up every immediate subdirectory of `source_root` into
/// `<repository_root>/<folder name>`.
///
/// Returns `Err` only when the source root cannot be read or the engine
/// aborts access by policy; the error carries what was done until then.
pub fn backup_all<E: ArchiveEngine + ?Sized>(
    engine: &E,
    repository_root: &str,
    source_root: &Path,
    settings: &BackupSettings,
) -> Result<BatchReport, BatchAborted> {
    let mut report = BatchReport::default();

    let dirs = match list_subdirectories(source_root) {
        Ok(dirs) => dirs,
        Err(source) => return Err(BatchAborted { report, source }),
    };

    for dir in dirs {
        let Some(name) = dir.file_name() else {
            continue;
        };
        let folder = name.to_string_lossy().into_owned();

        let Some(utf8_name) = name.to_str() else {
            tracing::error!(folder = %folder, "skipping folder with non UTF-8 name");
            report.entries.push(RepositoryReport {
                folder,
                source: dir.clone(),
                repository: None,
                result: Err(BackupError::InvalidFolderName {
                    root: source_root.to_path_buf(),
                    name: name.to_os_string(),
                }),
            });
            continue;
        };

        let source = SourceFolder::new(source_root, utf8_name);
        let repository = RepositoryTarget::under(repository_root, utf8_name);
        tracing::info!(
            source = %source.absolute().display(),
            %repository,
            "processing folder"
        );

        let result = match backup_one(engine, &repository, &source, settings) {
            Err(err) if err.is_access_aborted() => {
                tracing::error!(%repository, error = %err, "repository access aborted, stopping batch");
                log_summary(&report, "batch aborted");
                return Err(BatchAborted {
                    report,
                    source: err,
                });
            }
            result => result,
        };
        match &result {
            Ok(BackupOutcome::Created { archive, .. }) => {
                tracing::info!(%repository, %archive, "backup complete");
            }
            Ok(BackupOutcome::Skipped { .. }) => {}
            Err(err) => {
                tracing::error!(%repository, error = %err, "backup failed, continuing with next folder");
            }
        }

        report.entries.push(RepositoryReport {
            folder,
            source: source.absolute(),
            repository: Some(repository),
            result,
        });
    }

    log_summary(&report, "batch finished");
    Ok(report)
}

fn log_summary(report: &BatchReport, message: &str) {
    let summary = report.summary();
    tracing::info!(
        succeeded = summary.succeeded,
        attempted = summary.attempted,
        skipped = summary.skipped,
        failed = summary.failed,
        "{message}"
    );
}

/// Immediate subdirectories of `root`, sorted by name. Symlinks to
/// directories count; plain files are ignored. Entries that cannot be read
/// are logged and left out.
pub fn list_subdirectories(root: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let entries = std::fs::read_dir(root).map_err(|e| io_err(root, e))?;
    Ok(keep_directories(root, entries.map(|e| e.map(|e| e.path()))))
}

fn keep_directories(
    root: &Path,
    entries: impl IntoIterator<Item = io::Result<PathBuf>>,
) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = entries
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}
