//! CLI integration tests for org-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the org-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("org-migrate").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("import"));
}

#[test]
fn test_export_subcommand_help() {
    cmd()
        .args(["export", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--backend"))
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--file"))
        .stdout(predicate::str::contains("[default: postgresql]"))
        .stdout(predicate::str::contains("[default: export.zip]"));
}

#[test]
fn test_import_subcommand_help() {
    cmd()
        .args(["import", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--backend"))
        .stdout(predicate::str::contains("--db"));
}

#[test]
fn test_config_help_names_overriding_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "--file and --password override its values",
        ));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("org-migrate"));
}

// =============================================================================
// Argument Validation Tests
// =============================================================================

#[test]
fn test_missing_subcommand_fails() {
    cmd().assert().failure();
}

#[test]
fn test_export_requires_org() {
    cmd()
        .arg("export")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ORG"));
}

#[test]
fn test_unknown_backend_is_config_error() {
    cmd()
        .args(["export", "acme", "--backend", "oracle", "--file", "/dev/null"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Unsupported database backend"));
}

#[test]
fn test_unknown_flag_fails() {
    cmd()
        .args(["export", "acme", "--no-such-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--no-such-flag"));
}

// =============================================================================
// Config File Tests
// =============================================================================

#[test]
fn test_missing_config_file_fails() {
    cmd()
        .args(["--config", "/nonexistent/config.yaml", "export", "acme"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_malformed_config_file_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "database: [not, a, mapping]").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "export", "acme"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

// =============================================================================
// Import Archive Tests
// =============================================================================

#[test]
fn test_import_missing_archive_fails() {
    // Archive is opened before any connection is attempted.
    cmd()
        .args(["import", "acme", "--file", "/nonexistent/export.zip"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}
