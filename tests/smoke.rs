//! Smoke tests -- verify the binary runs and the offline commands work.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn logscan() -> Command {
    let mut cmd = Command::cargo_bin("logscan").unwrap();
    for key in ["LOGSCAN_CONFIG", "JOBS_FILE", "INCIDENTS_FILE", "RUST_LOG"] {
        cmd.env_remove(key);
    }
    cmd
}

/// A config file pointing the snapshots into a temp dir.
fn config_in(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("logscan.toml");
    let body = format!(
        "[storage]\njobs_file = {:?}\nincidents_file = {:?}\n\n[logging]\nlevel = \"warn\"\n",
        dir.path().join("jobs.json"),
        dir.path().join("incidents.json"),
    );
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_cli_help() {
    logscan()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("log scanning"));
}

#[test]
fn test_cli_version() {
    logscan()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("logscan"));
}

#[test]
fn test_serve_subcommand_exists() {
    logscan()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--bind"));
}

#[test]
fn test_jobs_add_list_remove() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let added = logscan()
        .args(["jobs", "add", "--user", "alice", "--namespace", "prod"])
        .args(["--interval", "60", "--name", "payments", "--level", "ERROR"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("added"));
    let stdout = String::from_utf8(added.get_output().stdout.clone()).unwrap();
    let id = stdout.split('\'').nth(1).unwrap().to_string();
    assert!(dir.path().join("jobs.json").exists());

    logscan()
        .args(["jobs", "list", "--user", "alice", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("payments").and(predicate::str::contains(id.as_str())));

    logscan()
        .args(["jobs", "remove", "--user", "alice", "--id", &id, "--config"])
        .arg(&config)
        .assert()
        .success();

    logscan()
        .args(["jobs", "list", "--user", "alice", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("No jobs found."));
}

#[test]
fn test_jobs_add_rejects_bad_interval() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    logscan()
        .args(["jobs", "add", "--user", "alice", "--namespace", "prod"])
        .args(["--interval", "0", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("interval"));
}

#[test]
fn test_remove_unknown_job_fails() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    logscan()
        .args(["jobs", "remove", "--user", "alice", "--id", "nope", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_incidents_list_empty() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    logscan()
        .args(["incidents", "list", "--user", "alice", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("No incidents found."));
}
