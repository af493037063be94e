//! In-process [`ArchiveEngine`] with call recording and fault injection.
//!
//! Repositories and archives live in memory only. Faults let a test make one
//! operation fail (once or always) for one repository, e.g. a `check` that
//! reports "missing" for a repository that already exists, which is what a
//! concurrent `init` race looks like from the outside.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use photoback_core::types::{ArchiveName, ArchiveRecord, RepositoryTarget, SourceFolder};

use crate::client::{
    ArchiveEngine, CheckOptions, CreateOptions, InitOptions, ListOptions, Operation,
};
use crate::error::EngineError;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Check(RepositoryTarget),
    Init(RepositoryTarget),
    List(RepositoryTarget),
    Create {
        repository: RepositoryTarget,
        archive: ArchiveName,
        source: PathBuf,
    },
}

impl EngineCall {
    pub fn operation(&self) -> Operation {
        match self {
            EngineCall::Check(_) => Operation::Check,
            EngineCall::Init(_) => Operation::Init,
            EngineCall::List(_) => Operation::List,
            EngineCall::Create { .. } => Operation::Create,
        }
    }

    pub fn repository(&self) -> &RepositoryTarget {
        match self {
            EngineCall::Check(r) | EngineCall::Init(r) | EngineCall::List(r) => r,
            EngineCall::Create { repository, .. } => repository,
        }
    }
}

/// What an injected fault reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    RepositoryMissing,
    RepositoryExists,
    AccessAborted,
    Failed(String),
}

/// A scripted failure for one operation on one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub operation: Operation,
    pub repository: RepositoryTarget,
    pub kind: FaultKind,
    /// Remaining firings; `None` fires forever.
    pub remaining: Option<usize>,
}

impl Fault {
    pub fn once(operation: Operation, repository: impl Into<RepositoryTarget>, kind: FaultKind) -> Self {
        Self {
            operation,
            repository: repository.into(),
            kind,
            remaining: Some(1),
        }
    }

    pub fn always(operation: Operation, repository: impl Into<RepositoryTarget>, kind: FaultKind) -> Self {
        Self {
            operation,
            repository: repository.into(),
            kind,
            remaining: None,
        }
    }

    fn to_error(&self) -> EngineError {
        let repository = self.repository.clone();
        match &self.kind {
            FaultKind::RepositoryMissing => EngineError::RepositoryMissing { repository },
            FaultKind::RepositoryExists => EngineError::RepositoryExists { repository },
            FaultKind::AccessAborted => EngineError::AccessAborted { repository },
            FaultKind::Failed(message) => EngineError::Failed {
                operation: self.operation,
                repository,
                code: Some(2),
                message: message.clone(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    repositories: BTreeMap<RepositoryTarget, Vec<ArchiveRecord>>,
    calls: Vec<EngineCall>,
    faults: Vec<Fault>,
    now: Option<DateTime<Utc>>,
}

impl MemoryState {
    fn take_fault(&mut self, operation: Operation, repository: &RepositoryTarget) -> Option<EngineError> {
        let index = self
            .faults
            .iter()
            .position(|f| f.operation == operation && &f.repository == repository)?;
        let error = self.faults[index].to_error();
        if let Some(remaining) = self.faults[index].remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.faults.remove(index);
            }
        }
        Some(error)
    }
}

/// Single-threaded in-memory archive engine.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: RefCell<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty repository.
    pub fn add_repository(&self, repository: impl Into<RepositoryTarget>) {
        self.state
            .borrow_mut()
            .repositories
            .entry(repository.into())
            .or_default();
    }

    /// Register an archive, creating its repository if needed.
    pub fn add_archive(
        &self,
        repository: impl Into<RepositoryTarget>,
        name: impl Into<ArchiveName>,
        created_at: DateTime<Utc>,
    ) {
        self.state
            .borrow_mut()
            .repositories
            .entry(repository.into())
            .or_default()
            .push(ArchiveRecord {
                name: name.into(),
                created_at,
            });
    }

    pub fn inject(&self, fault: Fault) {
        self.state.borrow_mut().faults.push(fault);
    }

    /// Fix the timestamp given to archives created from now on.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.state.borrow_mut().now = Some(now);
    }

    pub fn has_repository(&self, repository: &RepositoryTarget) -> bool {
        self.state.borrow().repositories.contains_key(repository)
    }

    /// Archives of `repository` in creation order, or `None` if it does not exist.
    pub fn archives(&self, repository: &RepositoryTarget) -> Option<Vec<ArchiveRecord>> {
        self.state.borrow().repositories.get(repository).cloned()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.borrow().calls.clone()
    }

    /// Number of recorded `operation` calls against `repository`.
    pub fn count(&self, operation: Operation, repository: &RepositoryTarget) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.operation() == operation && c.repository() == repository)
            .count()
    }
}

impl ArchiveEngine for MemoryEngine {
    fn check(&self, repository: &RepositoryTarget, _options: &CheckOptions) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(EngineCall::Check(repository.clone()));
        if let Some(err) = state.take_fault(Operation::Check, repository) {
            return Err(err);
        }
        if !state.repositories.contains_key(repository) {
            return Err(EngineError::RepositoryMissing {
                repository: repository.clone(),
            });
        }
        Ok(())
    }

    fn init(&self, repository: &RepositoryTarget, _options: &InitOptions) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(EngineCall::Init(repository.clone()));
        if let Some(err) = state.take_fault(Operation::Init, repository) {
            return Err(err);
        }
        if state.repositories.contains_key(repository) {
            return Err(EngineError::RepositoryExists {
                repository: repository.clone(),
            });
        }
        state.repositories.insert(repository.clone(), Vec::new());
        Ok(())
    }

    fn list_archives(
        &self,
        repository: &RepositoryTarget,
        options: &ListOptions,
    ) -> Result<Vec<ArchiveRecord>, EngineError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(EngineCall::List(repository.clone()));
        if let Some(err) = state.take_fault(Operation::List, repository) {
            return Err(err);
        }
        let Some(archives) = state.repositories.get(repository) else {
            return Err(EngineError::RepositoryMissing {
                repository: repository.clone(),
            });
        };
        let mut records = archives.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(last) = options.last {
            records.truncate(last);
        }
        Ok(records)
    }

    fn create(
        &self,
        repository: &RepositoryTarget,
        archive: &ArchiveName,
        source: &SourceFolder,
        _options: &CreateOptions,
    ) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(EngineCall::Create {
            repository: repository.clone(),
            archive: archive.clone(),
            source: source.absolute(),
        });
        if let Some(err) = state.take_fault(Operation::Create, repository) {
            return Err(err);
        }
        let created_at = state.now.unwrap_or_else(Utc::now);
        let Some(archives) = state.repositories.get_mut(repository) else {
            return Err(EngineError::RepositoryMissing {
                repository: repository.clone(),
            });
        };
        if archives.iter().any(|a| &a.name == archive) {
            return Err(EngineError::ArchiveExists {
                repository: repository.clone(),
                archive: archive.clone(),
            });
        }
        archives.push(ArchiveRecord {
            name: archive.clone(),
            created_at,
        });
        Ok(())
    }
}
