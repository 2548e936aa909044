//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs. Each test
//! points HOME at a throwaway directory so session state, stats, and
//! config never leak between tests or into the real data directory.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command against the given home and return output.
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "flipfocus-cli", "--"])
        .args(args)
        .env("HOME", home)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_session_status_starts_idle() {
    let home = TempDir::new().unwrap();
    let (stdout, _stderr, code) = run_cli(home.path(), &["session", "status"]);
    assert_eq!(code, 0, "session status failed");

    let snapshot: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(snapshot["type"], "StateSnapshot");
    assert_eq!(snapshot["state"], "idle");
    assert_eq!(snapshot["mode"], "timer");
    assert_eq!(snapshot["round"], 1);
    assert_eq!(snapshot["clock_secs"], 25 * 60);
}

#[test]
fn test_session_flip_gate_lifecycle() {
    let home = TempDir::new().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["session", "start"]);
    assert_eq!(code, 0, "session start failed");
    assert!(stdout.contains("SessionArmed"));
    assert!(stdout.contains("ready_to_flip"));

    let (stdout, _, code) = run_cli(home.path(), &["session", "flip", "down"]);
    assert_eq!(code, 0, "flip down failed");
    assert!(stdout.contains("FocusStarted"));
    assert!(stdout.contains("\"focusing\""));

    let (stdout, _, code) = run_cli(home.path(), &["session", "flip", "up"]);
    assert_eq!(code, 0, "flip up failed");
    assert!(stdout.contains("FocusFailed"));
    assert!(stdout.contains("\"failed\""));

    let (stdout, _, code) = run_cli(home.path(), &["session", "reset"]);
    assert_eq!(code, 0, "session reset failed");
    assert!(stdout.contains("SessionReset"));
    assert!(stdout.contains("\"idle\""));
}

#[test]
fn test_session_state_persists_between_invocations() {
    let home = TempDir::new().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["session", "mode", "stopwatch"]);
    assert_eq!(code, 0, "mode switch failed");
    assert!(stdout.contains("\"stopwatch\""));

    let (stdout, _, code) = run_cli(home.path(), &["session", "status"]);
    assert_eq!(code, 0);
    let snapshot: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(snapshot["mode"], "stopwatch");
    assert_eq!(snapshot["clock_secs"], 0);
}

#[test]
fn test_session_minutes_rejects_out_of_range() {
    let home = TempDir::new().unwrap();

    let (_, stderr, code) = run_cli(home.path(), &["session", "minutes", "181"]);
    assert_eq!(code, 1, "out-of-range minutes should fail");
    assert!(stderr.contains("error"));

    let (stdout, _, code) = run_cli(home.path(), &["session", "minutes", "180"]);
    assert_eq!(code, 0, "in-range minutes failed");
    assert!(stdout.contains("\"clock_secs\": 10800"));
}

#[test]
fn test_session_dnd_toggle() {
    let home = TempDir::new().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["session", "dnd", "off"]);
    assert_eq!(code, 0, "dnd off failed");
    assert!(stdout.contains("\"applied\":true"));
    assert!(stdout.contains("\"dnd_enabled\":false"));

    // The toggle is idle-only; an armed session rejects it.
    let _ = run_cli(home.path(), &["session", "start"]);
    let (stdout, _, code) = run_cli(home.path(), &["session", "dnd", "on"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("\"applied\":false"));
    assert!(stdout.contains("\"dnd_enabled\":false"));
}

#[test]
fn test_stats_lifecycle() {
    let home = TempDir::new().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["stats", "today"]);
    assert_eq!(code, 0, "stats today failed");
    assert!(stdout.contains("\"total_secs\":0"));

    let (stdout, _, code) = run_cli(home.path(), &["stats", "week"]);
    assert_eq!(code, 0, "stats week failed");
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 7);

    let (stdout, _, code) = run_cli(home.path(), &["stats", "reset"]);
    assert_eq!(code, 0, "stats reset failed");
    assert!(stdout.contains("days_cleared"));
}

#[test]
fn test_config_get_set_list() {
    let home = TempDir::new().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "durations.timer_minutes"]);
    assert_eq!(code, 0, "config get failed");
    assert_eq!(stdout.trim(), "25");

    let (_, _, code) = run_cli(
        home.path(),
        &["config", "set", "durations.timer_minutes", "30"],
    );
    assert_eq!(code, 0, "config set failed");

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "durations.timer_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "30");

    let (stdout, _, code) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(code, 0, "config list failed");
    let listed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(listed["durations"]["timer_minutes"], 30);

    let (_, _, code) = run_cli(home.path(), &["config", "get", "durations.bogus"]);
    assert_eq!(code, 1, "unknown key should fail");
}

#[test]
fn test_config_ambient_track_value() {
    let home = TempDir::new().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "audio.ambient"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "none");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "audio.ambient", "rain"]);
    assert_eq!(code, 0, "config set ambient failed");

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "audio.ambient"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "rain");
}
