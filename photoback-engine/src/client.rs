//! The archive-engine capability set consumed by the backup core.
//!
//! Each operation takes its own options struct listing only what that
//! operation understands.

use std::fmt;

use photoback_core::types::{ArchiveName, ArchiveRecord, RepositoryTarget, SourceFolder};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Engine operation, used for error reporting and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Check,
    Init,
    List,
    Create,
}

impl Operation {
    pub fn subcommand(self) -> &'static str {
        match self {
            Operation::Check => "check",
            Operation::Init => "init",
            Operation::List => "list",
            Operation::Create => "create",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subcommand())
    }
}

// ---------------------------------------------------------------------------
// Per-operation options
// ---------------------------------------------------------------------------

/// Options for [`ArchiveEngine::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    /// Read and verify every data chunk, not just the index.
    pub verify_data: bool,
    /// Only check repository structure. Overrides `verify_data`.
    pub repository_only: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            verify_data: true,
            repository_only: false,
        }
    }
}

/// Repository encryption mode for [`ArchiveEngine::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    #[default]
    None,
    Authenticated,
    Repokey,
    RepokeyBlake2,
    Keyfile,
}

impl Encryption {
    pub fn as_str(self) -> &'static str {
        match self {
            Encryption::None => "none",
            Encryption::Authenticated => "authenticated",
            Encryption::Repokey => "repokey",
            Encryption::RepokeyBlake2 => "repokey-blake2",
            Encryption::Keyfile => "keyfile",
        }
    }
}

/// Options for [`ArchiveEngine::init`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InitOptions {
    pub encryption: Encryption,
    /// Create missing parent directories of a local repository path.
    pub make_parent_dirs: bool,
}

/// Options for [`ArchiveEngine::list_archives`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListOptions {
    /// Only the `n` most recent archives. `None` lists all.
    pub last: Option<usize>,
}

impl ListOptions {
    /// Just the most recent archive.
    pub fn latest() -> Self {
        Self { last: Some(1) }
    }
}

/// Options for [`ArchiveEngine::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub comment: Option<String>,
    /// Print archive statistics when done.
    pub stats: bool,
    /// Log every file as it is archived.
    pub list_files: bool,
    pub sparse: bool,
    /// Seconds between checkpoints during long runs.
    pub checkpoint_interval: Option<u64>,
    /// Compression spec understood by the engine, e.g. `zstd,3`.
    pub compression: Option<String>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            comment: Some("Created automatically by photoback".to_string()),
            stats: true,
            list_files: true,
            sparse: true,
            checkpoint_interval: Some(1800),
            compression: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// An archive engine able to manage repositories and their archives.
///
/// Implementations report the recoverable conditions through the dedicated
/// [`EngineError`] variants (`RepositoryMissing`, `RepositoryExists`,
/// `ArchiveExists`); callers decide what is recoverable.
pub trait ArchiveEngine {
    /// Verify that `repository` exists and is consistent.
    fn check(&self, repository: &RepositoryTarget, options: &CheckOptions)
        -> Result<(), EngineError>;

    /// Create an empty repository.
    fn init(&self, repository: &RepositoryTarget, options: &InitOptions)
        -> Result<(), EngineError>;

    /// Archives in `repository`, most recent first.
    fn list_archives(
        &self,
        repository: &RepositoryTarget,
        options: &ListOptions,
    ) -> Result<Vec<ArchiveRecord>, EngineError>;

    /// Archive `source` into `repository` under `archive`.
    fn create(
        &self,
        repository: &RepositoryTarget,
        archive: &ArchiveName,
        source: &SourceFolder,
        options: &CreateOptions,
    ) -> Result<(), EngineError>;
}

impl<E: ArchiveEngine + ?Sized> ArchiveEngine for &E {
    fn check(&self, repository: &RepositoryTarget, options: &CheckOptions) -> Result<(), EngineError> {
        (**self).check(repository, options)
    }

    fn init(&self, repository: &RepositoryTarget, options: &InitOptions) -> Result<(), EngineError> {
        (**self).init(repository, options)
    }

    fn list_archives(
        &self,
        repository: &RepositoryTarget,
        options: &ListOptions,
    ) -> Result<Vec<ArchiveRecord>, EngineError> {
        (**self).list_archives(repository, options)
    }

    fn create(
        &self,
        repository: &RepositoryTarget,
        archive: &ArchiveName,
        source: &SourceFolder,
        options: &CreateOptions,
    ) -> Result<(), EngineError> {
        (**self).create(repository, archive, source, options)
    }
}
