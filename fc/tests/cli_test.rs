//! End-to-end tests for the fc binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fc(dir: &TempDir) -> Command {
    let config = dir.path().join("filtercontext.yml");
    std::fs::write(&config, "context:\n  persistence-prefix: 'view:'\n").expect("Failed to write config");

    let mut cmd = Command::cargo_bin("fc").expect("Binary should build");
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--store")
        .arg(dir.path().join("filters.json"));
    cmd
}

#[test]
fn test_list_empty_store() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fc(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No persisted filters"));
}

#[test]
fn test_set_then_get_and_list() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    fc(&dir)
        .args(["set", "page=3", "status=open", "page=4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set 2 filter(s) in one batch (1 reload)"));

    fc(&dir).args(["get", "page"]).assert().success().stdout("4\n");
    fc(&dir).args(["get", "status"]).assert().success().stdout("\"open\"\n");

    fc(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("page").and(predicate::str::contains("status")));

    let raw = std::fs::read_to_string(dir.path().join("filters.json")).expect("Store should exist");
    assert!(raw.contains("view:page"));
}

#[test]
fn test_get_missing_key_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fc(&dir)
        .args(["get", "nothing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No persisted value for 'nothing'"));
}

#[test]
fn test_set_rejects_malformed_assignment() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fc(&dir).args(["set", "no-equals-sign"]).assert().failure();
}
