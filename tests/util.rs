//! Fixture project and a preconfigured `relay` command for the CLI tests.

#![allow(dead_code)]

use assert_cmd::Command;

use assert_fs::prelude::*;

/// Small mixed-language project with an excluded build dir.
pub fn make_project() -> assert_fs::TempDir
{
    // Initialize the temporary project root
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    tmp.child("src/main.py")
        .write_str("import util\nprint(util.x)\n")
        .expect("write main.py");
    tmp.child("src/util.py")
        .write_str("x = 1\n")
        .expect("write util.py");
    tmp.child("README.md")
        .write_str("# Demo\n")
        .expect("write readme");
    tmp.child("notes.txt")
        .write_str("not selected\n")
        .expect("write notes");

    // Never packaged: pruned directory names
    tmp.child("build/gen.py")
        .write_str("generated = True\n")
        .expect("write build/gen.py");
    tmp.child("__pycache__/util.py")
        .write_str("cached\n")
        .expect("write cache");

    tmp
}

/// The `relay` binary running in `dir`, with no RELAY_ settings leaking in
/// from the developer's environment.
pub fn relay(dir: &std::path::Path) -> Command
{
    let mut cmd = Command::cargo_bin("relay").expect("bin");
    cmd.current_dir(dir);
    for (key, _) in std::env::vars()
    {
        if key.starts_with("RELAY_")
        {
            cmd.env_remove(key);
        }
    }
    cmd.env("RELAY_TRANSCRIPT_DIR", dir.join(".sessions"));
    cmd
}
