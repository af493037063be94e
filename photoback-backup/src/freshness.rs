//! Freshness gate: is a new archive needed for this repository?
//!
//! Only the most recent archive matters. A repository is fresh while
//! `now < latest.created_at + min_age`; at exactly `min_age` it is due again.
//! A repository that does not exist yet is due, never an error.

use chrono::{DateTime, Duration, Utc};

use photoback_core::types::{ArchiveRecord, RepositoryTarget};
use photoback_engine::{ArchiveEngine, EngineError, ListOptions};

use crate::BackupError;

/// Why a repository needs a new archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueReason {
    /// No minimum age configured.
    NoPolicy,
    /// The repository does not exist yet.
    RepositoryMissing,
    /// The repository holds no archives.
    NoArchives,
    /// The latest archive is at least `min_age` old.
    Expired { latest: ArchiveRecord, age: Duration },
}

/// Freshness classification for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Due(DueReason),
    Fresh {
        latest: ArchiveRecord,
        age: Duration,
        /// Time left until a new archive is due.
        remaining: Duration,
    },
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh { .. })
    }
}

/// Classify `repository` against `min_age`, with `now` fixed by the caller.
pub fn check_at<E: ArchiveEngine + ?Sized>(
    engine: &E,
    repository: &RepositoryTarget,
    min_age: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<Freshness, BackupError> {
    let Some(min_age) = min_age else {
        return Ok(Freshness::Due(DueReason::NoPolicy));
    };

    let archives = match engine.list_archives(repository, &ListOptions::latest()) {
        Ok(archives) => archives,
        Err(EngineError::RepositoryMissing { .. }) => {
            tracing::debug!(%repository, "repository missing, treating as no archives");
            return Ok(Freshness::Due(DueReason::RepositoryMissing));
        }
        Err(err) => return Err(err.into()),
    };

    let Some(latest) = archives.into_iter().next() else {
        return Ok(Freshness::Due(DueReason::NoArchives));
    };

    let age = now.signed_duration_since(latest.created_at);
    // A window reaching past the representable calendar never expires.
    let fresh = match latest.created_at.checked_add_signed(min_age) {
        Some(due_at) => now < due_at,
        None => true,
    };
    if fresh {
        let remaining = min_age.checked_sub(&age).unwrap_or(Duration::MAX);
        return Ok(Freshness::Fresh {
            latest,
            age,
            remaining,
        });
    }
    Ok(Freshness::Due(DueReason::Expired { latest, age }))
}

/// [`check_at`] with the current time.
pub fn check<E: ArchiveEngine + ?Sized>(
    engine: &E,
    repository: &RepositoryTarget,
    min_age: Option<Duration>,
) -> Result<Freshness, BackupError> {
    check_at(engine, repository, min_age, Utc::now())
}

/// `true` when the latest archive is still fresh and the backup can be skipped.
pub fn should_skip<E: ArchiveEngine + ?Sized>(
    engine: &E,
    repository: &RepositoryTarget,
    min_age: Option<Duration>,
) -> Result<bool, BackupError> {
    Ok(check(engine, repository, min_age)?.is_fresh())
}

/// Compact human age: `45s`, `12m`, `5h`, `3d`. Negative ages read as `0s`.
pub fn format_age(age: Duration) -> String {
    let seconds = age.num_seconds().max(0);
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
