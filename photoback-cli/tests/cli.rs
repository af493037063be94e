//! Binary-level tests. The engine is a shell script standing in for `borg`:
//! repositories are directories, archives are files under `archives/`.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const FAKE_BORG: &str = r#"#!/bin/sh
shift
sub="$1"
shift
prev=""
for a in "$@"; do target="$prev"; prev="$a"; done
case "$sub" in
  check)
    repo="$prev"
    if [ -e "$repo/RELOCATED" ]; then exit 62; fi
    if [ -e "$repo/BROKEN" ]; then
      echo '{"type": "log_message", "levelname": "ERROR", "message": "Index object count mismatch."}' >&2
      exit 2
    fi
    if [ -d "$repo" ]; then exit 0; fi
    echo '{"type": "log_message", "levelname": "ERROR", "message": "Repository does not exist.", "msgid": "Repository.DoesNotExist"}' >&2
    exit 2
    ;;
  init)
    repo="$prev"
    if [ -d "$repo" ]; then exit 10; fi
    mkdir -p "$repo/archives"
    ;;
  list)
    repo="$prev"
    if [ ! -d "$repo" ]; then exit 13; fi
    latest=$(ls -t "$repo/archives" | head -n 1)
    if [ -z "$latest" ]; then
      echo '{"archives": []}'
    else
      echo "{\"archives\": [{\"name\": \"$latest\", \"time\": \"$(date -u +%Y-%m-%dT%H:%M:%S+00:00)\"}]}"
    fi
    ;;
  create)
    repo="${target%%::*}"
    archive="${target#*::}"
    [ -d "$prev" ] || exit 2
    if [ -e "$repo/archives/$archive" ]; then exit 30; fi
    touch "$repo/archives/$archive"
    ;;
  *)
    exit 2
    ;;
esac
"#;

struct Fixture {
    _dir: TempDir,
    source_root: PathBuf,
    repo_root: PathBuf,
    borg: PathBuf,
}

impl Fixture {
    fn new(folders: &[&str], extra_config: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let source_root = dir.path().join("pictures");
        let repo_root = dir.path().join("backup");
        fs::create_dir_all(&source_root).expect("mkdir source");
        fs::create_dir_all(&repo_root).expect("mkdir repo root");
        for folder in folders {
            let path = source_root.join(folder);
            fs::create_dir_all(&path).expect("mkdir folder");
            fs::write(path.join("img_0001.jpg"), b"jpeg").expect("write file");
        }
        fs::write(source_root.join("notes.txt"), "not a folder").expect("write notes");

        let config = format!(
            r#"{{"version": "1", "repo_root": "{}", "standard_archive_name": "nightly"{extra_config}}}"#,
            repo_root.display()
        );
        fs::write(source_root.join("photoback.json"), config).expect("write config");

        let borg = dir.path().join("fake-borg");
        fs::write(&borg, FAKE_BORG).expect("write fake borg");
        fs::set_permissions(&borg, fs::Permissions::from_mode(0o755)).expect("chmod");

        Self {
            _dir: dir,
            source_root,
            repo_root,
            borg,
        }
    }

    fn config(&self) -> PathBuf {
        self.source_root.join("photoback.json")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("photoback"));
        cmd.arg(self.config()).arg("--borg").arg(&self.borg);
        cmd
    }

    fn archives(&self, folder: &str) -> Vec<String> {
        archive_names(&self.repo_root.join(folder))
    }
}

fn archive_names(repo: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(repo.join("archives"))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn missing_config_argument_is_a_usage_error() {
    Command::new(assert_cmd::cargo::cargo_bin!("photoback"))
        .assert()
        .failure()
        .stderr(contains("CONFIG"));
}

#[test]
fn unsupported_config_version_aborts() {
    let fixture = Fixture::new(&["photos"], "");
    fs::write(fixture.config(), r#"{"version": "2", "repo_root": "/r"}"#).expect("write");

    fixture
        .cmd()
        .assert()
        .failure()
        .stderr(contains("config version 2 is not supported"));
    assert!(fixture.archives("photos").is_empty());
}

#[test]
fn missing_repo_root_aborts() {
    let fixture = Fixture::new(&["photos"], "");
    fs::write(fixture.config(), r#"{"version": "1"}"#).expect("write");

    fixture
        .cmd()
        .assert()
        .failure()
        .stderr(contains("repository root is not specified"));
}

#[test]
fn source_root_without_folders_reports_nothing_to_do() {
    let fixture = Fixture::new(&[], "");

    fixture
        .cmd()
        .assert()
        .success()
        .stdout(contains("No folders found next to"))
        .stdout(contains("Backed up 0 out of 0 repositories"));
}

#[test]
fn first_run_initializes_and_archives_every_folder() {
    let fixture = Fixture::new(&["photos", "videos"], "");

    fixture
        .cmd()
        .assert()
        .success()
        .stdout(contains("Backed up 2 out of 2 repositories"))
        .stdout(contains("repository initialized"));

    assert_eq!(fixture.archives("photos"), ["nightly"]);
    assert_eq!(fixture.archives("videos"), ["nightly"]);
    assert!(!fixture.repo_root.join("notes.txt").exists());
}

#[test]
fn rerun_without_policy_suffixes_archive_name() {
    let fixture = Fixture::new(&["photos"], "");

    fixture.cmd().assert().success();
    fixture.cmd().assert().success().stdout(contains("nightly-1"));

    assert_eq!(fixture.archives("photos"), ["nightly", "nightly-1"]);
}

#[test]
fn rerun_within_freshness_window_skips() {
    let fixture = Fixture::new(&["photos"], r#", "not_older_than_hours": 24"#);

    fixture.cmd().assert().success();
    fixture
        .cmd()
        .assert()
        .success()
        .stdout(contains("SKIPPED"))
        .stdout(contains("Backed up 0 out of 1 repositories"));

    assert_eq!(fixture.archives("photos"), ["nightly"]);
}

#[test]
fn archive_name_flag_overrides_config() {
    let fixture = Fixture::new(&["photos"], "");

    fixture.cmd().args(["-a", "manual"]).assert().success();

    assert_eq!(fixture.archives("photos"), ["manual"]);
}

#[test]
fn broken_repository_fails_alone_with_exit_code_one() {
    let fixture = Fixture::new(&["a_photos", "b_videos", "c_scans"], "");
    let broken = fixture.repo_root.join("b_videos");
    fs::create_dir_all(broken.join("archives")).expect("mkdir");
    fs::write(broken.join("BROKEN"), "").expect("mark broken");

    fixture
        .cmd()
        .assert()
        .code(1)
        .stdout(contains("FAILED"))
        .stdout(contains("Index object count mismatch"))
        .stdout(contains("Backed up 2 out of 3 repositories"));

    assert_eq!(fixture.archives("a_photos"), ["nightly"]);
    assert!(fixture.archives("b_videos").is_empty());
    assert_eq!(fixture.archives("c_scans"), ["nightly"]);
}

#[test]
fn relocated_repository_aborts_the_run() {
    let fixture = Fixture::new(&["a_photos", "b_videos", "c_scans"], "");
    let relocated = fixture.repo_root.join("b_videos");
    fs::create_dir_all(relocated.join("archives")).expect("mkdir");
    fs::write(relocated.join("RELOCATED"), "").expect("mark relocated");

    fixture
        .cmd()
        .assert()
        .failure()
        .stdout(contains("a_photos"))
        .stdout(contains("Backed up 1 out of 1 repositories"))
        .stderr(contains("BORG_RELOCATED_REPO_ACCESS_IS_OK"));

    assert_eq!(fixture.archives("a_photos"), ["nightly"]);
    assert!(!fixture.repo_root.join("c_scans").exists());
}

#[test]
fn aborted_run_json_is_marked_incomplete() {
    let fixture = Fixture::new(&["a_photos", "b_videos"], "");
    let relocated = fixture.repo_root.join("b_videos");
    fs::create_dir_all(relocated.join("archives")).expect("mkdir");
    fs::write(relocated.join("RELOCATED"), "").expect("mark relocated");

    let output = fixture.cmd().arg("--json").output().expect("run");
    assert!(!output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["complete"], false);
    assert_eq!(report["summary"]["succeeded"], 1);
    assert_eq!(report["repositories"][0]["folder"], "a_photos");
}

#[test]
fn json_report_is_machine_readable() {
    let fixture = Fixture::new(&["photos"], "");

    let output = fixture.cmd().arg("--json").output().expect("run");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["complete"], true);
    assert_eq!(report["summary"]["attempted"], 1);
    assert_eq!(report["summary"]["succeeded"], 1);
    assert_eq!(report["repositories"][0]["folder"], "photos");
    assert_eq!(report["repositories"][0]["status"], "created");
    assert_eq!(report["repositories"][0]["archive"], "nightly");
}
