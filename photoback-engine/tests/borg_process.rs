//! `BorgEngine` against a scripted stand-in for the `borg` executable.
#![cfg(unix)]

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use photoback_core::config::EngineEnv;
use photoback_core::types::{ArchiveName, RepositoryTarget, SourceFolder};
use photoback_engine::{
    ArchiveEngine, BorgEngine, CheckOptions, CreateOptions, EngineError, InitOptions, ListOptions,
};
use tempfile::TempDir;

/// Write an executable shell script that records its argv, cwd and the
/// engine toggles, then runs `body`.
fn fake_borg(dir: &Path, body: &str) -> PathBuf {
    let log = dir.join("calls.log");
    let script = dir.join("borg");
    let contents = format!(
        "#!/bin/sh\n\
         echo \"args=$*\" >> '{log}'\n\
         echo \"cwd=$(pwd)\" >> '{log}'\n\
         echo \"relocated=${{BORG_RELOCATED_REPO_ACCESS_IS_OK:-unset}}\" >> '{log}'\n\
         echo \"passphrase=${{BORG_DISPLAY_PASSPHRASE:-unset}}\" >> '{log}'\n\
         echo \"exit_codes=${{BORG_EXIT_CODES:-unset}}\" >> '{log}'\n\
         {body}\n",
        log = log.display(),
    );
    fs::write(&script, contents).expect("write script");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
    script
}

fn call_log(dir: &Path) -> String {
    fs::read_to_string(dir.join("calls.log")).unwrap_or_default()
}

fn repo() -> RepositoryTarget {
    RepositoryTarget::from("/mnt/backup/photos")
}

#[test]
fn missing_repository_is_classified_from_json_log() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_borg(
        dir.path(),
        r#"echo '{"type": "log_message", "levelname": "ERROR", "message": "Repository does not exist.", "msgid": "Repository.DoesNotExist"}' >&2
exit 2"#,
    );
    let engine = BorgEngine::new(EngineEnv::default()).with_program(&script);

    let err = engine.check(&repo(), &CheckOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::RepositoryMissing { .. }), "got: {err}");
    assert!(call_log(dir.path()).contains("args=--log-json check --verify-data /mnt/backup/photos"));
}

#[test]
fn archive_collision_is_classified_from_exit_code() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_borg(dir.path(), "exit 30");
    let engine = BorgEngine::new(EngineEnv::default()).with_program(&script);
    let source = SourceFolder::new(dir.path(), "photos");

    let err = engine
        .create(&repo(), &ArchiveName::from("nightly"), &source, &CreateOptions::default())
        .unwrap_err();
    match err {
        EngineError::ArchiveExists { archive, .. } => assert_eq!(archive.as_str(), "nightly"),
        other => panic!("expected archive exists, got {other:?}"),
    }
}

#[test]
fn create_runs_in_source_root_with_relative_folder() {
    let dir = TempDir::new().expect("tempdir");
    let source_root = dir.path().join("pictures");
    fs::create_dir_all(source_root.join("photos")).expect("mkdir");
    let script = fake_borg(dir.path(), "exit 0");
    let engine = BorgEngine::new(EngineEnv::default()).with_program(&script);
    let source = SourceFolder::new(&source_root, "photos");

    engine
        .create(&repo(), &ArchiveName::from("nightly"), &source, &CreateOptions::default())
        .expect("create");

    let log = call_log(dir.path());
    let canonical_root = source_root.canonicalize().expect("canonicalize");
    assert!(log.contains(&format!("cwd={}", canonical_root.display())), "log: {log}");
    assert!(log.contains("/mnt/backup/photos::nightly photos"), "log: {log}");
}

#[test]
fn warning_exit_code_is_success() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_borg(dir.path(), "exit 1");
    let engine = BorgEngine::new(EngineEnv::default()).with_program(&script);

    engine.init(&repo(), &InitOptions::default()).expect("warnings are not failures");
}

#[test]
fn list_parses_stdout_json() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_borg(
        dir.path(),
        r#"echo '{"archives": [{"archive": "nightly", "name": "nightly", "time": "2024-02-03T04:05:06+00:00"}]}'"#,
    );
    let engine = BorgEngine::new(EngineEnv::default()).with_program(&script);

    let records = engine.list_archives(&repo(), &ListOptions::latest()).expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name.as_str(), "nightly");
    assert_eq!(records[0].created_at.to_rfc3339(), "2024-02-03T04:05:06+00:00");
    assert!(call_log(dir.path()).contains("list --json --sort-by timestamp --last 1"));
}

#[test]
fn engine_env_is_applied_to_child_only() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_borg(dir.path(), "exit 0");
    let mut raw = BTreeMap::new();
    raw.insert("BORG_RELOCATED_REPO_ACCESS_IS_OK".to_string(), "yes".to_string());
    raw.insert("BORG_DISPLAY_PASSPHRASE".to_string(), "ask".to_string());
    let env = EngineEnv::resolve(&raw).expect("resolve");
    let engine = BorgEngine::new(env).with_program(&script);

    engine.check(&repo(), &CheckOptions::default()).expect("check");

    let log = call_log(dir.path());
    assert!(log.contains("relocated=yes"), "log: {log}");
    assert!(log.contains("passphrase=unset"), "log: {log}");
    assert!(log.contains("exit_codes=modern"), "log: {log}");
    assert!(std::env::var("BORG_RELOCATED_REPO_ACCESS_IS_OK").is_err());
}

#[test]
fn generic_failure_carries_error_message() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_borg(
        dir.path(),
        r#"echo '{"type": "log_message", "levelname": "ERROR", "message": "Permission denied: /mnt/backup/photos/lock"}' >&2
exit 2"#,
    );
    let engine = BorgEngine::new(EngineEnv::default()).with_program(&script);

    let err = engine.check(&repo(), &CheckOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::Failed { code: Some(2), .. }), "got: {err}");
    assert!(err.to_string().contains("Permission denied"));
}

#[test]
fn file_status_flood_stays_out_of_failure_message() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_borg(
        dir.path(),
        r#"i=0
while [ $i -lt 20000 ]; do
  echo '{"type": "file_status", "status": "A", "path": "photos/img.jpg"}' >&2
  i=$((i+1))
done
echo '{"type": "log_message", "levelname": "ERROR", "message": "No space left on device"}' >&2
exit 2"#,
    );
    let engine = BorgEngine::new(EngineEnv::default()).with_program(&script);
    let source = SourceFolder::new(dir.path(), "photos");

    let err = engine
        .create(&repo(), &ArchiveName::from("nightly"), &source, &CreateOptions::default())
        .unwrap_err();
    match err {
        EngineError::Failed { message, .. } => assert_eq!(message, "No space left on device"),
        other => panic!("expected failed, got {other:?}"),
    }
}

#[test]
fn large_stdout_and_stderr_are_drained_together() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_borg(
        dir.path(),
        r#"printf '{"archives": ['
i=0
while [ $i -lt 3000 ]; do
  [ $i -gt 0 ] && printf ','
  printf '{"name": "a%d", "time": "2024-01-01T00:00:00+00:00"}' $i
  echo '{"type": "progress_message", "message": "listing"}' >&2
  i=$((i+1))
done
printf ']}\n'"#,
    );
    let engine = BorgEngine::new(EngineEnv::default()).with_program(&script);

    let records = engine.list_archives(&repo(), &ListOptions::default()).expect("list");
    assert_eq!(records.len(), 3000);
}

/// With an "ask" toggle the engine's prompt must reach the terminal: the
/// child shares our stderr and stdin instead of a pipe.
#[cfg(target_os = "linux")]
#[test]
fn ask_toggle_leaves_prompt_on_terminal() {
    let dir = TempDir::new().expect("tempdir");
    let fds = dir.path().join("fds.log");
    let script = fake_borg(
        dir.path(),
        &format!(
            "echo \"stderr=$(readlink /proc/self/fd/2)\" >> '{fds}'\n\
             echo \"stdin=$(readlink /proc/self/fd/0)\" >> '{fds}'\n\
             printf 'Warning: repository was relocated. Do you want to continue? [yN] ' >&2\n\
             exit 62",
            fds = fds.display(),
        ),
    );
    let mut raw = BTreeMap::new();
    raw.insert("BORG_RELOCATED_REPO_ACCESS_IS_OK".to_string(), "ask".to_string());
    let engine = BorgEngine::new(EngineEnv::resolve(&raw).expect("resolve")).with_program(&script);

    let err = engine.list_archives(&repo(), &ListOptions::latest()).unwrap_err();
    assert!(err.is_access_aborted(), "got: {err}");

    let recorded = fs::read_to_string(&fds).expect("fd log");
    let our_stderr = fs::read_link("/proc/self/fd/2").expect("own stderr");
    let our_stdin = fs::read_link("/proc/self/fd/0").expect("own stdin");
    assert!(
        recorded.contains(&format!("stderr={}", our_stderr.display())),
        "recorded: {recorded}"
    );
    assert!(
        recorded.contains(&format!("stdin={}", our_stdin.display())),
        "recorded: {recorded}"
    );

    let log = call_log(dir.path());
    assert!(log.contains("relocated=unset"), "log: {log}");
    assert!(!log.contains("--log-json"), "log: {log}");
}
