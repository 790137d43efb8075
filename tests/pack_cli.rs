// CLI tests for `relay pack`: selection rules, document framing,
// determinism and fatal root errors.
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;

mod util;
use util::{make_project, relay};

#[test]
fn test_pack_selects_by_extension_and_prunes_dirs() {
    let tmp = make_project();

    let out = relay(tmp.path())
        .args(["--quiet", "pack", ".", "-e", "py,md"])
        .output()
        .expect("run");
    assert!(out.status.success());
    let doc = String::from_utf8(out.stdout).expect("utf8");

    assert!(doc.starts_with("<codebase>\n"));
    assert!(doc.ends_with("</codebase>\n"));
    assert!(doc.contains("<file path=\"README.md\">\n# Demo\n</file>\n"));
    assert!(doc.contains("<file path=\"src/main.py\">\nimport util\nprint(util.x)\n</file>\n"));
    assert!(doc.contains("<file path=\"src/util.py\">"));
    assert!(!doc.contains("notes.txt"));
    assert!(!doc.contains("gen.py"));
    assert!(!doc.contains("__pycache__"));

    // Sorted by path within the root
    let readme = doc.find("README.md").unwrap();
    let main = doc.find("src/main.py").unwrap();
    let util = doc.find("src/util.py").unwrap();
    assert!(readme < main && main < util);
}

#[test]
fn test_pack_is_byte_identical_across_runs() {
    let tmp = make_project();

    let first = relay(tmp.path()).args(["--quiet", "pack", "."]).output().expect("run");
    let second = relay(tmp.path()).args(["--quiet", "pack", "."]).output().expect("run");

    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn test_pack_summary_on_stderr() {
    let tmp = make_project();

    relay(tmp.path())
        .args(["--no-color", "pack", ".", "-e", "py", "-o", "ctx.txt"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Loaded 2 files from codebase."))
        .stderr(predicate::str::contains("Codebase size:"))
        .stderr(predicate::str::contains(" KB"));

    tmp.child("ctx.txt")
        .assert(predicate::str::starts_with("<codebase>\n<file path=\"src/main.py\">"));
}

#[test]
fn test_pack_missing_root_fails_without_output() {
    let tmp = make_project();

    relay(tmp.path())
        .args(["--quiet", "pack", ".", "does-not-exist"])
        .assert()
        .code(4)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("does-not-exist"));
}

#[test]
fn test_pack_empty_extension_list_is_invalid_input() {
    let tmp = make_project();

    relay(tmp.path())
        .args(["--quiet", "pack", ".", "-e", ","])
        .assert()
        .code(3);
}

#[test]
fn test_pack_skips_binary_with_warning() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("ok.py").write_str("ok\n").unwrap();
    tmp.child("blob.py").write_binary(b"\x00\x01\x02").unwrap();

    relay(tmp.path())
        .args(["--no-color", "pack", ".", "-e", "py"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok.py"))
        .stdout(predicate::str::contains("blob.py").not())
        .stderr(predicate::str::contains("warning:"));
}

#[test]
fn test_pack_reports_each_skip_once() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("ok.py").write_str("ok\n").unwrap();
    tmp.child("blob.py").write_binary(b"\x00\x01\x02").unwrap();

    let out = relay(tmp.path())
        .args(["--no-color", "pack", ".", "-e", "py", "-o", "ctx.txt"])
        .output()
        .expect("run");
    assert!(out.status.success());

    let stderr = String::from_utf8(out.stderr).unwrap();
    assert_eq!(stderr.matches("blob.py").count(), 1, "stderr was: {stderr}");
}

#[test]
fn test_pack_includes_windows_1252_file() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("latin.py").write_binary(b"name = 'caf\xe9'\n").unwrap();

    relay(tmp.path())
        .args(["--quiet", "pack", ".", "-e", "py"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name = 'café'"));
}

#[test]
fn test_pack_multiple_roots_keep_order() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("zeta/z.py").write_str("z").unwrap();
    tmp.child("alpha/a.py").write_str("a").unwrap();

    let out = relay(tmp.path())
        .args(["--quiet", "pack", "zeta", "alpha", "-e", "py"])
        .output()
        .expect("run");
    let doc = String::from_utf8(out.stdout).unwrap();
    assert!(doc.find("z.py").unwrap() < doc.find("a.py").unwrap());
}

#[test]
fn test_pack_honours_config_file() {
    let tmp = make_project();
    tmp.child("relay.toml")
        .write_str("extensions = [\"txt\"]\n")
        .unwrap();

    relay(tmp.path())
        .args(["--quiet", "pack", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("notes.txt"))
        .stdout(predicate::str::contains("main.py").not());
}
