// crates/server/src/routes/health.rs
//! Liveness of the console itself, plus a cheap view of the job.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Last known state of the job record. Not re-evaluated here, so a
    /// health probe never scans the process table.
    pub job_running: bool,
    pub log_dir: PathBuf,
    /// Whether the deployment script exists in the work dir.
    pub script_present: bool,
}

/// GET /api/health
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let settings = state.jobs.settings();
    let script_present = tokio::fs::try_exists(settings.work_dir.join(&settings.script))
        .await
        .unwrap_or(false);

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        job_running: state.jobs.status().await.running,
        log_dir: settings.log_dir.clone(),
        script_present,
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}
