//! CLI integration tests
//!
//! Exercises the wire formats the CLI depends on: the status endpoint
//! shape, control-surface error bodies, and the offline analyzer over a
//! real log directory.

use guardian_lib::correlation::{AnalyzerConfig, CorrelationAnalyzer};
use guardian_lib::models::{GuardianState, GuardianStatusSnapshot};
use std::io::Write;

#[tokio::test]
async fn test_status_endpoint_shape_parses() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/health")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status":"degraded","detail_status":"degraded","timestamp":"2026-08-06T12:00:00Z"}"#,
        )
        .create_async()
        .await;

    let snapshot: GuardianStatusSnapshot = reqwest::Client::new()
        .get(format!("{}/health", server.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(snapshot.detail_status, GuardianState::Degraded);
    assert_eq!(snapshot.status.as_str(), "degraded");
}

#[tokio::test]
async fn test_control_surface_error_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/admin/context-window")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"context_window must be between 1 and 32, got 64"}"#)
        .create_async()
        .await;

    let response = reqwest::Client::new()
        .post(format!("{}/admin/context-window", server.url()))
        .json(&serde_json::json!({"value": 64}))
        .send()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("context_window"));
}

#[test]
fn test_analyze_over_log_directory() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("guardian.ndjson");
    let mut file = std::fs::File::create(&path).unwrap();

    for i in 0..30 {
        writeln!(
            file,
            r#"{{"ts":"2026-08-06T12:{:02}:00Z","lvl":"info","evt":"metrics","guardian_id":"g","data":{{"ram_pct":0.88,"cpu_pct":0.40}}}}"#,
            i
        )
        .unwrap();
    }
    for i in 0..5 {
        writeln!(
            file,
            r#"{{"ts":"2026-08-06T12:{:02}:30Z","lvl":"info","evt":"action","guardian_id":"g","data":{{"action":"enter_degraded"}}}}"#,
            i * 5
        )
        .unwrap();
    }

    let analyzer = CorrelationAnalyzer::new(AnalyzerConfig::default());
    let report = analyzer.analyze_dir(dir.path()).unwrap();

    assert_eq!(report.samples, 30);
    assert_eq!(report.degraded_events, 5);
    assert!((report.ram.mean - 0.88).abs() < 1e-9);
    // Frequent degradation produces a soft threshold recommendation
    assert!(report
        .recommendations
        .iter()
        .any(|rec| rec.parameter == "soft_pct"));
}

#[test]
fn test_analyze_skips_malformed_lines() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("guardian.ndjson");
    let mut file = std::fs::File::create(&path).unwrap();

    writeln!(file, "not json at all").unwrap();
    writeln!(
        file,
        r#"{{"ts":"2026-08-06T12:00:00Z","lvl":"info","evt":"metrics","guardian_id":"g","data":{{"ram_pct":0.5,"cpu_pct":0.2}}}}"#
    )
    .unwrap();

    let analyzer = CorrelationAnalyzer::new(AnalyzerConfig::default());
    let report = analyzer.analyze_dir(dir.path()).unwrap();
    assert_eq!(report.samples, 1);
}
