//! [`ArchiveEngine`] backed by the `borg` command-line tool.
//!
//! Every call spawns `borg --log-json <subcommand> ...` with
//! `BORG_EXIT_CODES=modern`. Failures are classified from the JSON log
//! `msgid` first and the exit code second, so both legacy (rc 2 for every
//! error) and modern exit-code modes are understood.
//!
//! Engine stderr is read line by line while the child runs and replayed
//! through `tracing` as it arrives; only error lines are kept for the
//! returned error. When a toggle is set to "ask", stderr stays attached to
//! the terminal so the engine's prompt is visible, and classification relies
//! on exit codes alone.
//!
//! The resolved [`EngineEnv`] is applied to each child process only.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use photoback_core::config::{EngineEnv, EnvToggle};
use photoback_core::types::{ArchiveName, ArchiveRecord, RepositoryTarget, SourceFolder};

use crate::client::{
    ArchiveEngine, CheckOptions, CreateOptions, InitOptions, ListOptions, Operation,
};
use crate::error::EngineError;

const MSGID_REPOSITORY_MISSING: &str = "Repository.DoesNotExist";
const MSGID_REPOSITORY_EXISTS: &str = "Repository.AlreadyExists";
const MSGID_ARCHIVE_EXISTS: &str = "Archive.AlreadyExists";
const MSGID_ACCESS_ABORTED: &str = "Cache.RepositoryAccessAborted";

const RC_REPOSITORY_EXISTS: i32 = 10;
const RC_REPOSITORY_MISSING: i32 = 13;
const RC_ARCHIVE_EXISTS: i32 = 30;
const RC_ACCESS_ABORTED: i32 = 62;

/// Error lines kept per call for the failure message.
const MAX_KEPT_ERROR_LINES: usize = 32;

/// Runs the `borg` executable.
#[derive(Debug, Clone)]
pub struct BorgEngine {
    program: PathBuf,
    env: EngineEnv,
}

impl BorgEngine {
    pub const DEFAULT_PROGRAM: &'static str = "borg";

    pub fn new(env: EngineEnv) -> Self {
        Self {
            program: PathBuf::from(Self::DEFAULT_PROGRAM),
            env,
        }
    }

    /// Use a specific engine executable instead of `borg` from `$PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Some toggle leaves the decision to an interactive prompt.
    fn interactive(&self) -> bool {
        self.env.iter().any(|(_, toggle)| toggle == EnvToggle::Ask)
    }

    fn command(&self, args: Vec<OsString>) -> Command {
        let interactive = self.interactive();
        let mut cmd = Command::new(&self.program);
        if !interactive {
            cmd.arg("--log-json");
        }
        cmd.args(args)
            .env("BORG_EXIT_CODES", "modern")
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(if interactive {
                Stdio::inherit()
            } else {
                Stdio::piped()
            });
        for (name, toggle) in self.env.iter() {
            if let Some(value) = toggle.export_value() {
                cmd.env(name, value);
            }
        }
        cmd
    }

    fn run(
        &self,
        mut cmd: Command,
        operation: Operation,
        repository: &RepositoryTarget,
        archive: Option<&ArchiveName>,
    ) -> Result<Vec<u8>, EngineError> {
        tracing::debug!(program = %self.program.display(), %operation, %repository, "running engine");
        let mut child = cmd.spawn().map_err(|e| EngineError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;
        let pipe_err = |source: io::Error| EngineError::Pipe {
            operation,
            repository: repository.clone(),
            source,
        };

        // Drained on its own thread so a full stdout pipe cannot stall stderr.
        let stdout = child.stdout.take().map(|mut out| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                out.read_to_end(&mut buf).map(|_| buf)
            })
        });

        let mut log = EngineLog::default();
        if let Some(stderr) = child.stderr.take() {
            if let Err(err) = log.read_from(stderr) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(pipe_err(err));
            }
        }

        let status = child.wait().map_err(pipe_err)?;
        let stdout = match stdout {
            Some(reader) => reader
                .join()
                .map_err(|_| EngineError::Output {
                    operation,
                    repository: repository.clone(),
                    message: "stdout reader panicked".to_string(),
                })?
                .map_err(pipe_err)?,
            None => Vec::new(),
        };

        let code = status.code();
        if status.success() || code.is_some_and(is_warning_code) {
            if let Some(code) = code.filter(|c| *c != 0) {
                tracing::warn!(%operation, %repository, code, "engine finished with warnings");
            }
            return Ok(stdout);
        }
        Err(classify(operation, repository, archive, code, &log))
    }
}

impl ArchiveEngine for BorgEngine {
    fn check(&self, repository: &RepositoryTarget, options: &CheckOptions) -> Result<(), EngineError> {
        let cmd = self.command(check_args(repository, options));
        self.run(cmd, Operation::Check, repository, None).map(|_| ())
    }

    fn init(&self, repository: &RepositoryTarget, options: &InitOptions) -> Result<(), EngineError> {
        let cmd = self.command(init_args(repository, options));
        self.run(cmd, Operation::Init, repository, None).map(|_| ())
    }

    fn list_archives(
        &self,
        repository: &RepositoryTarget,
        options: &ListOptions,
    ) -> Result<Vec<ArchiveRecord>, EngineError> {
        let cmd = self.command(list_args(repository, options));
        let stdout = self.run(cmd, Operation::List, repository, None)?;
        parse_list(&stdout).map_err(|message| EngineError::Output {
            operation: Operation::List,
            repository: repository.clone(),
            message,
        })
    }

    fn create(
        &self,
        repository: &RepositoryTarget,
        archive: &ArchiveName,
        source: &SourceFolder,
        options: &CreateOptions,
    ) -> Result<(), EngineError> {
        let mut cmd = self.command(create_args(repository, archive, source, options));
        // Archive the folder by its relative name without touching our own cwd.
        cmd.current_dir(&source.root);
        self.run(cmd, Operation::Create, repository, Some(archive))
            .map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Argument building
// ---------------------------------------------------------------------------

fn check_args(repository: &RepositoryTarget, options: &CheckOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["check".into()];
    if options.repository_only {
        args.push("--repository-only".into());
    } else if options.verify_data {
        args.push("--verify-data".into());
    }
    args.push(repository.as_str().into());
    args
}

fn init_args(repository: &RepositoryTarget, options: &InitOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "init".into(),
        "--encryption".into(),
        options.encryption.as_str().into(),
    ];
    if options.make_parent_dirs {
        args.push("--make-parent-dirs".into());
    }
    args.push(repository.as_str().into());
    args
}

fn list_args(repository: &RepositoryTarget, options: &ListOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "list".into(),
        "--json".into(),
        "--sort-by".into(),
        "timestamp".into(),
    ];
    if let Some(last) = options.last {
        args.push("--last".into());
        args.push(last.to_string().into());
    }
    args.push(repository.as_str().into());
    args
}

fn create_args(
    repository: &RepositoryTarget,
    archive: &ArchiveName,
    source: &SourceFolder,
    options: &CreateOptions,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["create".into()];
    if let Some(comment) = &options.comment {
        args.push("--comment".into());
        args.push(comment.into());
    }
    if options.stats {
        args.push("--stats".into());
    }
    if options.list_files {
        args.push("--list".into());
    }
    if options.sparse {
        args.push("--sparse".into());
    }
    if let Some(interval) = options.checkpoint_interval {
        args.push("--checkpoint-interval".into());
        args.push(interval.to_string().into());
    }
    if let Some(compression) = &options.compression {
        args.push("--compression".into());
        args.push(compression.into());
    }
    args.push(format!("{repository}::{archive}").into());
    args.push(source.relative().as_os_str().to_owned());
    args
}

// ---------------------------------------------------------------------------
// Output handling
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LogLine {
    #[serde(rename = "type")]
    kind: String,
    message: Option<String>,
    levelname: Option<String>,
    msgid: Option<String>,
    status: Option<String>,
    path: Option<String>,
}

#[derive(Debug)]
enum LogEvent {
    Json(LogLine),
    Text(String),
}

impl LogEvent {
    fn parse(line: &str) -> Self {
        match serde_json::from_str::<LogLine>(line) {
            Ok(parsed) => LogEvent::Json(parsed),
            Err(_) => LogEvent::Text(line.to_string()),
        }
    }
}

/// What one engine call left behind on stderr, minus the noise.
#[derive(Debug, Default)]
struct EngineLog {
    /// First msgid the classifier understands.
    msgid: Option<String>,
    errors: Vec<String>,
}

impl EngineLog {
    /// Replay one stderr line and keep it if it matters for classification.
    fn record(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let event = LogEvent::parse(line);
        replay(&event);

        match event {
            LogEvent::Json(line) => {
                if self.msgid.is_none() {
                    self.msgid = line.msgid.filter(|id| is_known_msgid(id));
                }
                if matches!(line.levelname.as_deref(), Some("ERROR") | Some("CRITICAL")) {
                    if let Some(message) = line.message {
                        self.keep(message);
                    }
                }
            }
            LogEvent::Text(text) => self.keep(text),
        }
    }

    /// Record every line of `reader` until it closes.
    fn read_from(&mut self, reader: impl Read) -> io::Result<()> {
        for line in BufReader::new(reader).split(b'\n') {
            self.record(&String::from_utf8_lossy(&line?));
        }
        Ok(())
    }

    fn keep(&mut self, message: String) {
        if self.errors.len() < MAX_KEPT_ERROR_LINES {
            self.errors.push(message);
        }
    }
}

fn is_known_msgid(id: &str) -> bool {
    matches!(
        id,
        MSGID_REPOSITORY_MISSING | MSGID_REPOSITORY_EXISTS | MSGID_ARCHIVE_EXISTS | MSGID_ACCESS_ABORTED
    )
}

/// Re-emit one engine line through `tracing`.
fn replay(event: &LogEvent) {
    match event {
        LogEvent::Json(line) if line.kind == "log_message" => {
            let message = line.message.as_deref().unwrap_or_default();
            match line.levelname.as_deref() {
                Some("ERROR") | Some("CRITICAL") => tracing::error!(target: "borg", "{message}"),
                Some("WARNING") => tracing::warn!(target: "borg", "{message}"),
                Some("INFO") => tracing::info!(target: "borg", "{message}"),
                _ => tracing::debug!(target: "borg", "{message}"),
            }
        }
        LogEvent::Json(line) if line.kind == "file_status" => {
            tracing::debug!(
                target: "borg",
                status = line.status.as_deref().unwrap_or("?"),
                path = line.path.as_deref().unwrap_or_default(),
                "archived"
            );
        }
        // Progress updates are noise in a batch log.
        LogEvent::Json(_) => {}
        LogEvent::Text(text) => tracing::info!(target: "borg", "{text}"),
    }
}

/// Legacy rc 1 and modern rc 100..=127 are warnings; the operation succeeded.
fn is_warning_code(code: i32) -> bool {
    code == 1 || (100..=127).contains(&code)
}

fn classify(
    operation: Operation,
    repository: &RepositoryTarget,
    archive: Option<&ArchiveName>,
    code: Option<i32>,
    log: &EngineLog,
) -> EngineError {
    let msgid = log.msgid.as_deref();
    let repository = repository.clone();

    match (msgid, code) {
        (Some(MSGID_REPOSITORY_MISSING), _) | (None, Some(RC_REPOSITORY_MISSING)) => {
            EngineError::RepositoryMissing { repository }
        }
        (Some(MSGID_REPOSITORY_EXISTS), _) | (None, Some(RC_REPOSITORY_EXISTS)) => {
            EngineError::RepositoryExists { repository }
        }
        (Some(MSGID_ACCESS_ABORTED), _) | (None, Some(RC_ACCESS_ABORTED)) => {
            EngineError::AccessAborted { repository }
        }
        (Some(MSGID_ARCHIVE_EXISTS), _) | (None, Some(RC_ARCHIVE_EXISTS)) => match archive {
            Some(archive) => EngineError::ArchiveExists {
                repository,
                archive: archive.clone(),
            },
            None => EngineError::Failed {
                operation,
                repository,
                code,
                message: failure_message(log, code),
            },
        },
        _ => EngineError::Failed {
            operation,
            repository,
            code,
            message: failure_message(log, code),
        },
    }
}

fn failure_message(log: &EngineLog, code: Option<i32>) -> String {
    if !log.errors.is_empty() {
        return log.errors.join("; ");
    }
    match code {
        Some(code) => format!("engine exited with status {code}"),
        None => "engine terminated by signal".to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ListOutput {
    archives: Vec<ListedArchive>,
}

// Borg 1.x reports both `name` and `archive`; older versions only `archive`.
#[derive(Debug, Deserialize)]
struct ListedArchive {
    name: Option<String>,
    archive: Option<String>,
    time: Option<String>,
    start: Option<String>,
}

fn parse_list(stdout: &[u8]) -> Result<Vec<ArchiveRecord>, String> {
    let output: ListOutput =
        serde_json::from_slice(stdout).map_err(|e| format!("invalid list JSON: {e}"))?;

    let mut records = Vec::with_capacity(output.archives.len());
    for listed in output.archives {
        let name = listed
            .name
            .or(listed.archive)
            .ok_or_else(|| "archive entry without a name".to_string())?;
        let raw_time = listed
            .time
            .or(listed.start)
            .ok_or_else(|| format!("archive {name} has no timestamp"))?;
        let created_at = parse_archive_time(&raw_time)
            .ok_or_else(|| format!("archive {name} has unreadable timestamp '{raw_time}'"))?;
        records.push(ArchiveRecord {
            name: ArchiveName::from(name),
            created_at,
        });
    }
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(records)
}

/// Borg prints naive local timestamps (`2024-05-01T21:13:05.000000`);
/// newer versions may print RFC 3339.
fn parse_archive_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    match Local.from_local_datetime(&naive).earliest() {
        Some(local) => Some(local.with_timezone(&Utc)),
        // Inside a DST gap; the wall-clock time never existed locally.
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
