//! End-to-end tests for the csvup binary
//!
//! These tests validate the full command-line workflow including:
//! - Config file loading and flag overrides
//! - Text and JSON run summaries
//! - Exit codes for delivered, incomplete and invalid runs
//! - Credentials read from named environment variables

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const CONNECTION: &str = "0b6f5a4e-0b4e-4f8e-9a51-8f0a8c3a2e11";
const PROFILE: &str = "5c1f9d22-7a3b-4e0c-8d7e-2f6b1a9c4d55";

fn upload_path() -> String {
    format!(
        "/connector-config/connector/integration/{}/{}/file-upload",
        CONNECTION, PROFILE
    )
}

/// Workspace with a source file of `rows` data rows
fn workspace(rows: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut data = String::from("id,hostname\n");
    for i in 1..=rows {
        data.push_str(&format!("{},host-{}\n", i, i));
    }
    std::fs::write(dir.path().join("assets.csv"), data).unwrap();
    dir
}

/// `csvup` running inside `dir`, isolated from the caller's environment
fn csvup(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("csvup").unwrap();
    cmd.current_dir(dir)
        .env_remove("CSVUP_CONFIG")
        .env_remove("CSVUP_BASE_URL")
        .env_remove("CSVUP_PASSWORD")
        .env_remove("LOG_OUTPUT")
        .env_remove("LOG_DIR")
        .arg("--log-dir")
        .arg(dir.join("logs"))
        .arg("--no-progress");
    cmd
}

fn target_args(server: &MockServer) -> Vec<String> {
    vec![
        "--base-url".to_string(),
        server.uri(),
        "--connection-uuid".to_string(),
        CONNECTION.to_string(),
        "--profile-uuid".to_string(),
        PROFILE.to_string(),
    ]
}

// ============================================================================
// Successful runs
// ============================================================================

#[tokio::test]
async fn test_upload_prints_chunk_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(upload_path()))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let dir = workspace(25);
    csvup(dir.path())
        .arg("assets.csv")
        .args(target_args(&server))
        .args(["--username", "user", "--password", "pass", "--chunk-size", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("chunk 1 delivered (10 rows, 1 attempt(s))"))
        .stdout(predicate::str::contains("chunk 3 delivered (5 rows, 1 attempt(s))"))
        .stdout(predicate::str::contains("3 of 3 chunk(s) delivered, 25 row(s) uploaded"));
}

#[tokio::test]
async fn test_default_config_file_with_flag_override() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(upload_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let dir = workspace(20);
    let config = json!({
        "csvPath": "does-not-exist.csv",
        "header": 1,
        "baseUrl": server.uri(),
        "envQualysUsernameProperty": "CSVUP_E2E_USER",
        "envQualysPasswordProperty": "CSVUP_E2E_PASS",
        "connectionUuid": CONNECTION,
        "profileUuid": PROFILE,
        "chunkSize": 10
    });
    std::fs::write(dir.path().join("config.json"), config.to_string()).unwrap();

    // the positional path overrides csvPath from config.json
    csvup(dir.path())
        .arg("assets.csv")
        .env("CSVUP_E2E_USER", "user")
        .env("CSVUP_E2E_PASS", "pass")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 of 2 chunk(s) delivered"));
}

#[tokio::test]
async fn test_json_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(upload_path()))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let dir = workspace(5);
    let output = csvup(dir.path())
        .arg("assets.csv")
        .args(target_args(&server))
        .args(["--username", "user", "--password", "pass", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["status"], "success");
    assert_eq!(summary["rows_delivered"], 5);
    assert_eq!(summary["chunks"][0]["state"], "delivered");
}

// ============================================================================
// Failed runs
// ============================================================================

#[tokio::test]
async fn test_failed_chunk_exits_nonzero_and_names_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(upload_path()))
        .and(body_string_contains("assets_2.csv"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown column"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(upload_path()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = workspace(30);
    csvup(dir.path())
        .arg("assets.csv")
        .args(target_args(&server))
        .args(["--username", "user", "--password", "pass", "--chunk-size", "10"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("chunk 1 delivered"))
        .stdout(predicate::str::contains("chunk 2 failed (10 rows) after 1 attempt(s): fatal-failure"))
        .stdout(predicate::str::contains("chunk 3 delivered"))
        .stderr(predicate::str::contains("Run incomplete: 1 of 3 chunk(s) failed"));
}

#[tokio::test]
async fn test_retries_then_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(upload_path()))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = workspace(3);
    let output = csvup(dir.path())
        .arg("assets.csv")
        .args(target_args(&server))
        .args(["--username", "user", "--password", "pass"])
        .args(["--max-attempts", "2", "--backoff-base-ms", "10", "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["status"], "incomplete");
    assert_eq!(summary["failed"], json!([1]));
    assert_eq!(summary["chunks"][0]["last_attempt"]["attempt"], 2);
    assert_eq!(summary["chunks"][0]["last_attempt"]["outcome"]["kind"], "retryable");
}

// ============================================================================
// Rejected before upload
// ============================================================================

#[tokio::test]
async fn test_invalid_chunk_size_is_rejected() {
    let server = MockServer::start().await;
    let dir = workspace(5);

    csvup(dir.path())
        .arg("assets.csv")
        .args(target_args(&server))
        .args(["--username", "user", "--password", "pass", "--chunk-size", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("chunkSize must be positive"));

    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_missing_credentials_are_reported() {
    let server = MockServer::start().await;
    let dir = workspace(5);

    csvup(dir.path())
        .arg("assets.csv")
        .args(target_args(&server))
        .args(["--env-password-property", "CSVUP_E2E_UNSET_PASSWORD"])
        .args(["--username", "user"])
        .env_remove("CSVUP_E2E_UNSET_PASSWORD")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Missing credentials"))
        .stderr(predicate::str::contains("CSVUP_E2E_UNSET_PASSWORD"));
}

#[tokio::test]
async fn test_malformed_source_uploads_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("assets.csv"), "id,hostname\n1,a\n2\n").unwrap();

    csvup(dir.path())
        .arg("assets.csv")
        .args(target_args(&server))
        .args(["--username", "user", "--password", "pass", "--chunk-size", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("line 3"));
}

#[tokio::test]
async fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();

    csvup(dir.path())
        .args(["--config", "absent.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Config file 'absent.json'"));
}

#[test]
fn test_unknown_auth_mode_is_an_argument_error() {
    let dir = TempDir::new().unwrap();

    csvup(dir.path())
        .args(["assets.csv", "--auth-mode", "kerberos"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown auth mode"));
}
