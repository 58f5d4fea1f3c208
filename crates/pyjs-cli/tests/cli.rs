//! End-to-end tests for the `pyjs-build` command-line binary.

use std::process::Command;

use tempfile::TempDir;

fn pyjs_build(root: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pyjs-build"));
    cmd.arg("--root").arg(root.path());
    cmd.env("HOME", root.path());
    cmd
}

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_pyjs-build"))
        .arg("--help")
        .output()
        .expect("failed to run pyjs-build");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("relocate"));
}

#[test]
fn test_list_shows_targets_and_recipes() {
    let root = TempDir::new().unwrap();
    let output = pyjs_build(&root).arg("list").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pyjs_static_tiny_ext"));
    assert!(stdout.contains("static_python"));
}

#[test]
fn test_dry_run_prints_plan() {
    let root = TempDir::new().unwrap();
    let output = pyjs_build(&root)
        .args(["build", "python_shared", "--dry-run", "--python-version", "3.9.17"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["graph"]["product"]["version"], "3.9.17");
    assert_eq!(doc["graph"]["depends_on"][0]["product"]["name"], "bzip2");
    assert_eq!(doc["plan"][0], "reset");
    assert!(!root.path().join("build").exists());
}

#[test]
fn test_unknown_target_exits_with_failure() {
    let root = TempDir::new().unwrap();
    let output = pyjs_build(&root)
        .args(["build", "python_bogus", "--dry-run"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("python_bogus"));
}

#[test]
fn test_bad_settings_file_exits_with_failure() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("pyjs.toml"), "no_such_key = true\n").unwrap();
    let output = pyjs_build(&root)
        .args(["build", "python_static", "--dry-run"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_relocate_missing_binary_fails() {
    let root = TempDir::new().unwrap();
    let output = pyjs_build(&root)
        .arg("relocate")
        .arg(root.path().join("missing.dylib"))
        .arg(root.path().join("Frameworks"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(!root.path().join("Frameworks").exists());
}
