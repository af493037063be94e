//! Photoback core library: domain types, configuration and errors.
//!
//! - [`types`]: newtypes and domain structs
//! - [`config`]: backup-set config loading and validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{BackupConfig, EngineEnv, EnvToggle};
pub use error::ConfigError;
pub use types::{ArchiveName, ArchiveRecord, BackupPolicy, RepositoryTarget, SourceFolder};
