//! # photoback-engine
//!
//! The archive-engine client consumed by the backup core.
//!
//! - [`ArchiveEngine`]: the capability set (`check`, `init`, `list_archives`, `create`)
//! - [`BorgEngine`]: runs the `borg` executable
//! - [`MemoryEngine`]: in-process engine for tests

pub mod borg;
pub mod client;
pub mod error;
pub mod memory;

pub use borg::BorgEngine;
pub use client::{
    ArchiveEngine, CheckOptions, CreateOptions, Encryption, InitOptions, ListOptions, Operation,
};
pub use error::EngineError;
pub use memory::{EngineCall, Fault, FaultKind, MemoryEngine};
