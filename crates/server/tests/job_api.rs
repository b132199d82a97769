//! End-to-end job lifecycle over HTTP: single-flight start, incremental log
//! reads, and completion detected from the log marker.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use deploy_console_server::jobs::{JobController, JobSettings, ProcessProbe};
use deploy_console_server::{create_app, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Never finds the script in the process table, so liveness comes from
/// the log alone.
struct NoProcess;

impl ProcessProbe for NoProcess {
    fn find(&self, _needle: &str) -> Option<u32> {
        None
    }
}

fn state_for(dir: &Path) -> Arc<AppState> {
    let settings = JobSettings::new(dir);
    let jobs = JobController::with_probe(settings, Arc::new(NoProcess));
    AppState::with_controller(
        Arc::new(jobs),
        dir.join("deploycluster_parameter.sh"),
        dir.join("segmenthosts.conf"),
    )
}

async fn request(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn start_conflict_read_and_complete() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("deploycluster.sh"), "sleep 3\n").unwrap();
    let state = state_for(dir.path());

    let (status, started) = request(
        create_app(state.clone()),
        "POST",
        "/api/jobs/start",
        Some(serde_json::json!({ "kind": "single" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["started"], true);
    let log_path = started["logPath"].as_str().unwrap().to_string();

    let (status, rejected) = request(
        create_app(state.clone()),
        "POST",
        "/api/jobs/start",
        Some(serde_json::json!({ "kind": "single" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(rejected["started"], false);
    assert_eq!(rejected["reason"], "already_running");

    let (status, chunk) = request(create_app(state.clone()), "GET", "/api/jobs/log?offset=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chunk["content"], "");
    assert_eq!(chunk["eof"], false);

    let mut log = std::fs::OpenOptions::new().append(true).open(&log_path).unwrap();
    writeln!(log, "[2026-01-01 00:00:00] Finished deploy cluster").unwrap();
    drop(log);

    let (status, snapshot) = request(create_app(state.clone()), "GET", "/api/jobs/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["running"], false);
    assert_eq!(snapshot["outcome"], "success");
    assert_eq!(snapshot["logPath"], log_path.as_str());

    let (_, chunk) = request(create_app(state), "GET", "/api/jobs/log?offset=0", None).await;
    assert_eq!(chunk["eof"], true);
    assert!(chunk["content"]
        .as_str()
        .unwrap()
        .contains("Finished deploy cluster"));
}

#[tokio::test]
async fn new_job_allowed_after_completion() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("deploycluster.sh"),
        "echo \"Finished deploy cluster\"\n",
    )
    .unwrap();
    let state = state_for(dir.path());

    let (status, first) = request(
        create_app(state.clone()),
        "POST",
        "/api/jobs/start",
        Some(serde_json::json!({ "kind": "multi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut finished = false;
    for _ in 0..100 {
        let (_, snapshot) = request(create_app(state.clone()), "GET", "/api/jobs/status", None).await;
        if snapshot["running"] == false {
            assert_eq!(snapshot["outcome"], "success");
            assert_eq!(snapshot["kind"], "multi");
            finished = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(finished, "job never completed");

    let (status, second) = request(
        create_app(state),
        "POST",
        "/api/jobs/start",
        Some(serde_json::json!({ "kind": "single" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(first["logPath"], second["logPath"]);
}
