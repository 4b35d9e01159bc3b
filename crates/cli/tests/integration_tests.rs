//! Integration tests for telemetryctl
//!
//! Exercise the binary end to end for the commands that need no running
//! title or collector, including their exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use racing_telemetry_adapters::{ac, lmu};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Custom predicate to check if output is valid JSON
fn is_json() -> impl predicates::Predicate<[u8]> {
    predicates::function::function(|s: &[u8]| {
        std::str::from_utf8(s)
            .ok()
            .is_some_and(|text| serde_json::from_str::<Value>(text).is_ok())
    })
}

fn telemetryctl() -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("telemetryctl")?;
    cmd.env_remove("RACING_TELEMETRY_API_KEY").env_remove("RUST_LOG");
    Ok(cmd)
}

fn write(dir: &TempDir, name: &str, contents: &[u8]) -> Result<PathBuf, std::io::Error> {
    let path = dir.path().join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn test_help_lists_commands() -> TestResult {
    telemetryctl()?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("probe"))
        .stdout(predicate::str::contains("decode"))
        .stdout(predicate::str::contains("config"));
    Ok(())
}

#[test]
fn test_config_prints_defaults_and_warns_without_credential() -> TestResult {
    telemetryctl()?
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("sample_rate_hz: 60"))
        .stdout(predicate::str::contains("wss://myracingdata.com/api/v1/ws"))
        .stderr(predicate::str::contains("credential"));
    Ok(())
}

#[test]
fn test_config_applies_file_then_overrides_and_redacts() -> TestResult {
    let dir = TempDir::new()?;
    let path = write(
        &dir,
        "capture.yaml",
        b"endpoint_url: ws://collector.invalid/ws\nsample_rate_hz: 30\n",
    )?;

    let assert = telemetryctl()?
        .args(["config", "--rate", "50"])
        .arg("--config")
        .arg(&path)
        .env("RACING_TELEMETRY_API_KEY", "super-secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("ws://collector.invalid/ws"))
        .stdout(predicate::str::contains("sample_rate_hz: 50"))
        .stdout(predicate::str::contains("super-secret").not());

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("credential: '********'") || stdout.contains("credential: ********"));
    Ok(())
}

#[test]
fn test_missing_config_file_fails() -> TestResult {
    telemetryctl()?
        .args(["config", "--config", "/nonexistent/capture.yaml"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("/nonexistent/capture.yaml"));
    Ok(())
}

#[test]
fn test_run_without_credential_is_rejected() -> TestResult {
    telemetryctl()?
        .arg("run")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("credential is missing"));
    Ok(())
}

#[test]
fn test_run_rejects_out_of_range_rate_as_json() -> TestResult {
    telemetryctl()?
        .args(["--json", "run", "--api-key", "k", "--rate", "500"])
        .assert()
        .failure()
        .code(3)
        .stdout(is_json())
        .stdout(predicate::str::contains("500"));
    Ok(())
}

#[test]
fn test_decode_ac_prints_record_json() -> TestResult {
    let dir = TempDir::new()?;
    let physics = write(&dir, "physics.bin", &ac::fixture::physics_bytes(3))?;
    let graphics = write(&dir, "graphics.bin", &ac::fixture::graphics_bytes(3))?;

    let assert = telemetryctl()?
        .args(["decode", "--title", "ac"])
        .arg(&physics)
        .arg(&graphics)
        .assert()
        .success()
        .stdout(is_json());

    let record: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(record["source"], "assetto_corsa");
    Ok(())
}

#[test]
fn test_decode_lmu_prints_record_json() -> TestResult {
    let dir = TempDir::new()?;
    let block = write(&dir, "lmu.bin", &lmu::fixture::telemetry_bytes(42.0))?;

    let assert = telemetryctl()?
        .args(["decode", "--title", "lmu"])
        .arg(&block)
        .assert()
        .success();

    let record: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(record["source"], "le_mans_ultimate");
    Ok(())
}

#[test]
fn test_decode_truncated_buffer_exit_code() -> TestResult {
    let dir = TempDir::new()?;
    let physics = write(&dir, "physics.bin", &[0u8; 100])?;
    let graphics = write(&dir, "graphics.bin", &ac::fixture::graphics_bytes(1))?;

    telemetryctl()?
        .args(["decode", "--title", "ac"])
        .arg(&physics)
        .arg(&graphics)
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("size mismatch"));
    Ok(())
}
