//! End-to-end tests for the `hs` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn hs(store: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("hs").unwrap();
    cmd.arg("--store").arg(store);
    cmd
}

#[test]
fn test_set_then_get_branch_flag() {
    let temp = TempDir::new().unwrap();
    let store = temp.path().join("settings.json");

    hs(&store)
        .args(["get", "/work/app", "claude/x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unset"));

    hs(&store)
        .args(["set", "/work/app", "claude/x", "true"])
        .assert()
        .success();

    hs(&store)
        .args(["get", "/work/app", "claude/x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));
}

#[test]
fn test_health_set_and_show() {
    let temp = TempDir::new().unwrap();
    let store = temp.path().join("settings.json");

    hs(&store).args(["health", "/work/app", "errored"]).assert().success();
    hs(&store)
        .args(["health", "/work/app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("errored"));

    hs(&store).args(["health", "/work/app", "sideways"]).assert().failure();
}

#[test]
fn test_list_empty_store() {
    let temp = TempDir::new().unwrap();
    hs(&temp.path().join("settings.json"))
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No repositories"));
}
