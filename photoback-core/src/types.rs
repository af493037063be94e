//! Domain types shared by the engine client and the backup core.
//!
//! Repository targets are strings, not `PathBuf`s: a repository root may be a
//! remote URI (`ssh://host/./backups`) that must be joined verbatim.
//! Local filesystem locations (source folders) always use `PathBuf`.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Location of one backup repository, as understood by the archive engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepositoryTarget(pub String);

impl RepositoryTarget {
    /// `<root>/<name>`, without doubling a trailing `/` on the root.
    pub fn under(root: &str, name: &str) -> Self {
        let root = root.strip_suffix('/').unwrap_or(root);
        Self(format!("{root}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepositoryTarget {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepositoryTarget {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Logical archive name inside a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveName(pub String);

impl ArchiveName {
    /// Name used when neither the config nor the command line supplies one.
    pub const DEFAULT: &'static str = "unnamed-backup";

    /// `<name>-<n>`; used to step past names that already exist.
    pub fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}-{n}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ArchiveName {
    fn default() -> Self {
        Self::from(Self::DEFAULT)
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ArchiveName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArchiveName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One immediate subdirectory of the source root.
///
/// The engine archives `name` relative to `root`, so archives contain
/// `photos/...` rather than the full absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFolder {
    pub root: PathBuf,
    pub name: String,
}

impl SourceFolder {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }

    pub fn absolute(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    pub fn relative(&self) -> &Path {
        Path::new(&self.name)
    }
}

/// Archive metadata as reported by the engine. Read-only for this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub name: ArchiveName,
    pub created_at: DateTime<Utc>,
}

/// When a repository may skip a new archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackupPolicy {
    /// Minimum age of the latest archive before another one is made.
    /// `None` always backs up.
    pub min_age: Option<Duration>,
}

impl BackupPolicy {
    pub fn always() -> Self {
        Self { min_age: None }
    }

    pub fn not_older_than(min_age: Duration) -> Self {
        Self {
            min_age: Some(min_age),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
