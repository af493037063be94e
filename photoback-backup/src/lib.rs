//! # photoback-backup
//!
//! Backup orchestration over an [`ArchiveEngine`](photoback_engine::ArchiveEngine).
//!
//! Call [`backup_one`] for a single (repository, folder) pair, or
//! [`backup_all`] to process every subdirectory of a source root.

pub mod allocate;
pub mod batch;
pub mod driver;
pub mod error;
pub mod freshness;
pub mod reconcile;

pub use batch::{backup_all, BatchAborted, BatchReport, BatchSummary, RepositoryReport};
pub use driver::{backup_one, backup_one_at, BackupOutcome, BackupSettings};
pub use error::BackupError;
pub use freshness::{DueReason, Freshness};
pub use reconcile::Readiness;
