//! Integration tests for the sideload CLI

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn sideload(root: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sideload"));
    cmd.env("SIDELOAD_SERVICE_ROOT", root.path().join("service"))
        .env("SIDELOAD_STAGING_DIR", root.path().join("staging"))
        .env_remove("SIDELOAD_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_sideload"))
        .arg("--version")
        .output()
        .expect("Failed to execute sideload");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sideload"));
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_sideload"))
        .arg("--help")
        .output()
        .expect("Failed to execute sideload");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("install"));
    assert!(stdout.contains("uninstall"));
    assert!(stdout.contains("inspect"));
}

#[test]
fn test_cli_invalid_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_sideload"))
        .arg("invalid-command")
        .output()
        .expect("Failed to execute sideload");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unrecognized subcommand"));
}

#[test]
fn test_install_requires_bundle() {
    let output = Command::new(env!("CARGO_BIN_EXE_sideload"))
        .arg("install")
        .output()
        .expect("Failed to execute sideload");
    assert!(!output.status.success());
}

#[test]
fn test_list_empty_json() {
    let root = TempDir::new().unwrap();
    let output = sideload(&root)
        .args(["--json", "list"])
        .output()
        .expect("Failed to execute sideload");

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["result"], "packages");
    assert_eq!(json["packages"].as_array().unwrap().len(), 0);
}

#[test]
fn test_install_missing_bundle_fails() {
    let root = TempDir::new().unwrap();
    let output = sideload(&root)
        .args(["--json", "install", "/nonexistent/app.bundle"])
        .output()
        .expect("Failed to execute sideload");

    assert!(!output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["result"], "outcome");
    assert_eq!(json["outcome"]["outcome"], "failed");
}

#[test]
fn test_uninstall_unknown_package_fails() {
    let root = TempDir::new().unwrap();
    let output = sideload(&root)
        .args(["--json", "uninstall", "com.example.absent"])
        .output()
        .expect("Failed to execute sideload");

    assert!(!output.status.success());
}

fn write_bundle(dir: &Path, package_id: &str) -> PathBuf {
    let manifest = format!(
        "[package]\nid = \"{package_id}\"\nversion_code = 1\n\n[signing]\ncertificates = [\"QQ==\"]\n"
    );
    let path = dir.join(format!("{package_id}.bundle"));
    let mut builder = tar::Builder::new(std::fs::File::create(&path).unwrap());
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "manifest.toml", manifest.as_bytes())
        .unwrap();
    builder.into_inner().unwrap().sync_all().unwrap();
    path
}

fn installed_count(root: &TempDir) -> usize {
    let output = sideload(root)
        .args(["--json", "list"])
        .output()
        .expect("Failed to execute sideload");
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    json["packages"].as_array().unwrap().len()
}

#[test]
fn test_confirmation_declined_without_terminal() {
    let root = TempDir::new().unwrap();
    let bundle = write_bundle(root.path(), "com.example.notes");

    let output = sideload(&root)
        .env("SIDELOAD_PLATFORM_LEVEL", "30")
        .arg("install")
        .arg(&bundle)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute sideload");

    assert!(!output.status.success());
    assert_eq!(installed_count(&root), 0);
}

#[test]
fn test_confirm_flag_answers_prompt() {
    let root = TempDir::new().unwrap();
    let bundle = write_bundle(root.path(), "com.example.notes");

    let output = sideload(&root)
        .env("SIDELOAD_PLATFORM_LEVEL", "30")
        .args(["install", "--confirm"])
        .arg(&bundle)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute sideload");

    assert!(output.status.success());
    assert_eq!(installed_count(&root), 1);
}
