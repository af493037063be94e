//! Error types for photoback-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading the backup-set configuration.
///
/// Every variant is fatal: the run stops before any repository is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON, or a field with the wrong type.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("the config version {version} is not supported (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },

    #[error("the repository root is not specified in the configuration file {path}")]
    MissingRepoRoot { path: PathBuf },

    #[error("invalid not_older_than_hours value '{value}': expected a non-negative integer")]
    InvalidHours { value: String },

    #[error("invalid value '{value}' for engine variable {name}: expected yes, no or ask")]
    InvalidEnvValue { name: String, value: String },
}
