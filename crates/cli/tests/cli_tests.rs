//! CLI integration tests

use std::process::Command;

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "placement-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = run_cli(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Fleet Placement"), "Should show app name");
    assert!(stdout.contains("optimal"), "Should show optimal command");
    assert!(stdout.contains("history"), "Should show history command");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("--format"), "Should show format option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = run_cli(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("placer"), "Should show binary name");
}

/// Test optimal subcommand help
#[test]
fn test_optimal_help() {
    let output = run_cli(&["optimal", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Optimal help should succeed");
    assert!(stdout.contains("--file"), "Should show file option");
    assert!(stdout.contains("--sort-order"), "Should show sort-order option");
    assert!(stdout.contains("--req-resource"), "Should show req-resource option");
    assert!(stdout.contains("--project"), "Should show project option");
}

/// Test history subcommand help
#[test]
fn test_history_help() {
    let output = run_cli(&["history", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "History help should succeed");
    assert!(stdout.contains("<NAME>"), "Should show name argument");
}

/// Test that an unnamed workload is refused before any request is sent
#[test]
fn test_optimal_requires_a_name() {
    let output = run_cli(&["--api-url", "http://127.0.0.1:9", "optimal", "--project", "fog"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Unnamed workload should fail");
    assert!(stderr.contains("--name"), "Should explain what is missing");
}

/// Test invalid format value
#[test]
fn test_invalid_format() {
    let output = run_cli(&["--format", "yaml", "health"]);
    assert!(!output.status.success(), "Invalid format should fail");
}
