//! Integration tests for the command-line entry point

use crate::support::report_date;
use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;
use validation_report_aggregator::resume::ContinuationPayload;
use validation_report_aggregator::ReportAccumulator;

fn command() -> Command {
    let mut cmd = Command::cargo_bin("validation-report-aggregator").unwrap();
    cmd.env_clear();
    cmd
}

#[test]
fn test_run_fails_without_configuration() {
    command().args(["run", "--local"]).assert().failure();
}

#[test]
fn test_serve_requires_runtime_api() {
    let output = command()
        .args(["serve", "--max-invocations", "1"])
        .env("SQS_RESULT_QUEUE", "validation-results")
        .env("SLACK_WEBHOOK", "https://hooks.example.test/services/T000")
        .env("RECIPIENTS_DICT", r#"{"ACME": ["ops@acme.test"]}"#)
        .env("SENDER", "reports@example.test")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    assert!(String::from_utf8_lossy(&output).contains("AWS_LAMBDA_RUNTIME_API"));
}

#[test]
fn test_run_rejects_time_budget_out_of_range() {
    command()
        .args(["run", "--time-budget-secs", "0"])
        .assert()
        .failure();
    command()
        .args(["run", "--time-budget-secs", "901"])
        .assert()
        .failure();
}

#[test]
fn test_run_rejects_malformed_report_date() {
    command()
        .args(["run", "--report-date", "03/01/2024"])
        .assert()
        .failure();
}

#[test]
fn test_validate_config_prints_summary() {
    let output = command()
        .args(["validate", "config"])
        .env("SQS_RESULT_QUEUE", "validation-results")
        .env("SLACK_WEBHOOK", "https://hooks.example.test/services/T000")
        .env("RECIPIENTS_DICT", r#"{"ACME": ["ops@acme.test"]}"#)
        .env("SENDER", "reports@example.test")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    assert!(stdout.contains("Valid configuration"));
    assert!(stdout.contains("Queue: validation-results"));
    assert!(stdout.contains("Recipients for ACME: ops@acme.test"));
}

#[test]
fn test_validate_config_fails_when_sender_missing() {
    command()
        .args(["validate", "config"])
        .env("SQS_RESULT_QUEUE", "validation-results")
        .env("SLACK_WEBHOOK", "https://hooks.example.test/services/T000")
        .env("RECIPIENTS_DICT", r#"{"ACME": ["ops@acme.test"]}"#)
        .assert()
        .failure();
}

#[test]
fn test_validate_payload_accepts_handoff_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("continuation.json");
    let payload = ContinuationPayload::new(ReportAccumulator::new(report_date()).snapshot());
    fs::write(&path, payload.encode().unwrap()).unwrap();

    let output = command()
        .args(["validate", "payload", path.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    assert!(stdout.contains("Valid continuation payload"));
    assert!(stdout.contains("Report date: 2024-03-01"));
}

#[test]
fn test_validate_payload_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("continuation.json");
    fs::write(&path, "{\"kind\": \"continuation\"}").unwrap();

    command()
        .args(["validate", "payload", path.to_str().unwrap()])
        .assert()
        .failure();
}
