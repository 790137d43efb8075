// CLI tests for `pack --snapshot` followed by `relay changes`.
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value;

mod util;
use util::{make_project, relay};

#[test]
fn test_changes_after_snapshot() {
    let tmp = make_project();

    relay(tmp.path())
        .args(["--quiet", "pack", "src", "-e", "py", "--snapshot", "snap.json", "-o", "ctx.txt"])
        .assert()
        .success();
    tmp.child("snap.json").assert(predicate::path::exists());

    tmp.child("src/util.py").write_str("x = 2\n").unwrap();
    tmp.child("src/new.py").write_str("pass\n").unwrap();
    std::fs::remove_file(tmp.child("src/main.py").path()).unwrap();

    let out = relay(tmp.path())
        .args(["changes", "src", "-e", "py", "--snapshot", "snap.json", "--json"])
        .output()
        .expect("run");
    assert!(out.status.success());

    let v: Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v[0]["added"], serde_json::json!(["new.py"]));
    assert_eq!(v[0]["deleted"], serde_json::json!(["main.py"]));
    assert_eq!(v[0]["updated"], serde_json::json!(["util.py"]));
}

#[test]
fn test_changes_update_resets_baseline() {
    let tmp = make_project();

    relay(tmp.path())
        .args(["--quiet", "pack", "src", "-e", "py", "--snapshot", "snap.json", "-o", "ctx.txt"])
        .assert()
        .success();
    tmp.child("src/util.py").write_str("x = 3\n").unwrap();

    relay(tmp.path())
        .args(["--no-color", "changes", "src", "-e", "py", "--snapshot", "snap.json", "--update"])
        .assert()
        .success()
        .stdout(predicate::str::contains("updated util.py"));

    relay(tmp.path())
        .args(["--no-color", "changes", "src", "-e", "py", "--snapshot", "snap.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no changes"));
}

#[test]
fn test_changes_without_snapshot_fails() {
    let tmp = make_project();

    relay(tmp.path())
        .args(["changes", "src", "--snapshot", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}
