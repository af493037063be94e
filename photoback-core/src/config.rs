//! Backup-set configuration.
//!
//! # File format
//!
//! ```json
//! {
//!   "version": "1",
//!   "repo_root": "/mnt/backup/photos",
//!   "standard_archive_name": "nightly",
//!   "not_older_than_hours": 24,
//!   "borg_env": { "BORG_RELOCATED_REPO_ACCESS_IS_OK": "yes" }
//! }
//! ```
//!
//! The config file lives in the source root: every sibling directory of the
//! file is one folder to back up.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::types::{ArchiveName, BackupPolicy};

pub const SUPPORTED_CONFIG_VERSIONS: &[&str] = &["1"];

/// Engine safety toggles forwarded to the engine's environment.
pub const ENGINE_ENV_VARS: [&str; 4] = [
    "BORG_DELETE_I_KNOW_WHAT_I_AM_DOING",
    "BORG_CHECK_I_KNOW_WHAT_I_AM_DOING",
    "BORG_DISPLAY_PASSPHRASE",
    "BORG_RELOCATED_REPO_ACCESS_IS_OK",
];

// ---------------------------------------------------------------------------
// Engine environment
// ---------------------------------------------------------------------------

/// Value of one engine safety toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvToggle {
    Yes,
    #[default]
    No,
    /// Leave the variable alone; the engine prompts interactively.
    Ask,
}

impl EnvToggle {
    /// The value to export, or `None` when the variable must not be set.
    pub fn export_value(self) -> Option<&'static str> {
        match self {
            EnvToggle::Yes => Some("yes"),
            EnvToggle::No => Some("no"),
            EnvToggle::Ask => None,
        }
    }
}

impl FromStr for EnvToggle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "ask" => Ok(Self::Ask),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EnvToggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvToggle::Yes => write!(f, "yes"),
            EnvToggle::No => write!(f, "no"),
            EnvToggle::Ask => write!(f, "ask"),
        }
    }
}

/// Resolved engine safety toggles. Handed to the engine client; never
/// written into this process's own environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEnv {
    toggles: BTreeMap<&'static str, EnvToggle>,
}

impl Default for EngineEnv {
    fn default() -> Self {
        Self {
            toggles: ENGINE_ENV_VARS
                .iter()
                .map(|name| (*name, EnvToggle::No))
                .collect(),
        }
    }
}

impl EngineEnv {
    /// Resolve the `borg_env` section. Unspecified toggles default to `no`.
    pub fn resolve(raw: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut env = Self::default();
        for name in ENGINE_ENV_VARS {
            match raw.get(name) {
                Some(value) => {
                    let toggle = value.parse::<EnvToggle>().map_err(|_| {
                        ConfigError::InvalidEnvValue {
                            name: name.to_string(),
                            value: value.clone(),
                        }
                    })?;
                    tracing::info!(variable = name, value = %toggle, "engine variable set by config");
                    env.toggles.insert(name, toggle);
                }
                None => {
                    tracing::debug!(variable = name, "engine variable defaults to 'no'");
                }
            }
        }
        for key in raw.keys() {
            if !ENGINE_ENV_VARS.contains(&key.as_str()) {
                tracing::warn!(variable = %key, "ignoring unknown engine variable in borg_env");
            }
        }
        Ok(env)
    }

    pub fn get(&self, name: &str) -> Option<EnvToggle> {
        self.toggles.get(name).copied()
    }

    /// Every toggle, in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, EnvToggle)> + '_ {
        self.toggles.iter().map(|(name, toggle)| (*name, *toggle))
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    version: Value,
    repo_root: Option<String>,
    standard_archive_name: Option<String>,
    not_older_than_hours: Option<HoursValue>,
    #[serde(default)]
    borg_env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HoursValue {
    Number(i64),
    Text(String),
}

impl HoursValue {
    fn to_duration(&self) -> Result<Duration, ConfigError> {
        let hours = match self {
            HoursValue::Number(n) => *n,
            HoursValue::Text(s) => s.trim().parse::<i64>().map_err(|_| ConfigError::InvalidHours {
                value: s.clone(),
            })?,
        };
        if hours < 0 {
            return Err(ConfigError::InvalidHours {
                value: hours.to_string(),
            });
        }
        Duration::try_hours(hours).ok_or_else(|| ConfigError::InvalidHours {
            value: hours.to_string(),
        })
    }
}

/// A validated backup-set configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Path of the file this config was loaded from.
    pub path: PathBuf,
    pub version: String,
    pub repo_root: String,
    /// Directory holding the folders to back up (the config file's directory).
    pub source_root: PathBuf,
    pub archive_name: ArchiveName,
    pub policy: BackupPolicy,
    pub engine_env: EngineEnv,
}

impl BackupConfig {
    /// Replace the configured archive name (command-line override).
    pub fn with_archive_name(mut self, name: Option<String>) -> Self {
        if let Some(name) = name {
            self.archive_name = ArchiveName::from(name);
        }
        self
    }
}

/// Load and validate the config at `path`.
pub fn load(path: &Path) -> Result<BackupConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    from_json_str(&contents, path)
}

/// Parse and validate config `contents` as if read from `path`.
pub fn from_json_str(contents: &str, path: &Path) -> Result<BackupConfig, ConfigError> {
    let raw: RawConfig = serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    // Versions are strings; a bare number `1` is not version "1".
    let version = match &raw.version {
        Value::String(s) if SUPPORTED_CONFIG_VERSIONS.contains(&s.as_str()) => s.clone(),
        Value::String(s) => return Err(unsupported(s.clone())),
        other => return Err(unsupported(other.to_string())),
    };

    let repo_root = raw.repo_root.ok_or_else(|| ConfigError::MissingRepoRoot {
        path: path.to_path_buf(),
    })?;

    let archive_name = raw
        .standard_archive_name
        .map(ArchiveName::from)
        .unwrap_or_default();

    let policy = match &raw.not_older_than_hours {
        Some(hours) => BackupPolicy::not_older_than(hours.to_duration()?),
        None => BackupPolicy::always(),
    };

    let engine_env = EngineEnv::resolve(&raw.borg_env)?;

    Ok(BackupConfig {
        path: path.to_path_buf(),
        version,
        repo_root,
        source_root: source_root_of(path),
        archive_name,
        policy,
        engine_env,
    })
}

fn unsupported(version: String) -> ConfigError {
    ConfigError::UnsupportedVersion {
        version,
        supported: SUPPORTED_CONFIG_VERSIONS.join(", "),
    }
}

fn source_root_of(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
