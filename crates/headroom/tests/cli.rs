//! Integration tests for the `headroom` binary.
use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn requires_a_command() {
    Command::cargo_bin("headroom")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("<COMMAND>"));
}

#[test]
fn help_lists_governor_options() {
    Command::cargo_bin("headroom")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--margin"))
        .stdout(predicate::str::contains("--scratch-dir"))
        .stdout(predicate::str::contains("--skip-benchmark"));
}

#[test]
fn rejects_margin_outside_unit_interval() {
    let temp = tempfile::tempdir().unwrap();

    Command::cargo_bin("headroom")
        .unwrap()
        .args(["--margin", "1.5", "--cgroup-root"])
        .arg(temp.path())
        .arg("true")
        .assert()
        .failure()
        .stderr(predicate::str::contains("margin must be in [0, 1)"));
}

#[test]
fn rejects_host_without_unified_cgroups() {
    let temp = tempfile::tempdir().unwrap();

    Command::cargo_bin("headroom")
        .unwrap()
        .arg("--cgroup-root")
        .arg(temp.path())
        .args(["--skip-benchmark", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unified cgroup hierarchy not available"));
}
