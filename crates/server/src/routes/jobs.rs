// crates/server/src/routes/jobs.rs
//! API routes for the deployment job.
//!
//! - POST /jobs/start - Start a deployment unless one is running
//! - GET /jobs/status - Current job record, re-evaluated
//! - GET /jobs/log?offset=N - Log bytes appended since `offset`
//! - GET /jobs/stream - SSE stream of log deltas and liveness

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use deploy_console_core::{load_params, DEPLOY_TYPE_KEY};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

use crate::error::ApiResult;
use crate::jobs::{log_events, JobError, JobKind, JobStatusSnapshot, LogChunk};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// `single` or `multi`. Falls back to the `DEPLOY_TYPE` parameter.
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub started: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub offset: u64,
}

async fn resolve_kind(state: &AppState, requested: Option<String>) -> ApiResult<JobKind> {
    if let Some(kind) = requested {
        return Ok(kind.parse::<JobKind>()?);
    }
    let params = load_params(&state.params_path).await?;
    match params.get(DEPLOY_TYPE_KEY) {
        Some(kind) => Ok(kind.parse::<JobKind>()?),
        None => Ok(JobKind::Single),
    }
}

/// POST /api/jobs/start - Start a deployment.
async fn start_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> ApiResult<Response> {
    let kind = resolve_kind(&state, request.kind).await?;

    match state.jobs.start(kind).await {
        Ok(handle) => Ok(Json(StartResponse {
            started: true,
            log_path: Some(handle.log_path),
            reason: None,
        })
        .into_response()),
        Err(JobError::AlreadyRunning) => Ok((
            StatusCode::CONFLICT,
            Json(StartResponse {
                started: false,
                log_path: None,
                reason: Some("already_running".to_string()),
            }),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/jobs/status - Job record after a fresh liveness evaluation.
async fn job_status(State(state): State<Arc<AppState>>) -> Json<JobStatusSnapshot> {
    Json(state.jobs.observe().await)
}

/// GET /api/jobs/log - Incremental log read.
async fn job_log(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> Json<LogChunk> {
    Json(state.jobs.read_log(query.offset).await)
}

/// GET /api/jobs/stream - SSE stream of log deltas.
async fn stream_job(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let events = log_events(state.jobs.clone());

    let stream = async_stream::stream! {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(json));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/start", post(start_job))
        .route("/jobs/status", get(job_status))
        .route("/jobs/log", get(job_log))
        .route("/jobs/stream", get(stream_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::api_routes;
    use crate::state::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn workspace(script: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("deploycluster.sh"), script).unwrap();
        dir
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_router_creation() {
        let _router = router();
    }

    #[tokio::test]
    async fn test_status_before_any_job() {
        let dir = workspace("exit 0\n");
        let app = api_routes(test_state(dir.path()));

        let (status, body) = send(app, "GET", "/api/jobs/status", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["running"], false);
        assert!(json["logPath"].is_null());
    }

    #[tokio::test]
    async fn test_start_then_conflict() {
        let dir = workspace("sleep 5\n");
        let state = test_state(dir.path());

        let (status, body) = send(
            api_routes(state.clone()),
            "POST",
            "/api/jobs/start",
            Some(r#"{"kind":"single"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let started: StartResponse = serde_json::from_str(&body).unwrap();
        assert!(started.started);
        assert!(started.log_path.is_some());

        let (status, body) = send(
            api_routes(state),
            "POST",
            "/api/jobs/start",
            Some(r#"{"kind":"multi"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let rejected: StartResponse = serde_json::from_str(&body).unwrap();
        assert!(!rejected.started);
        assert_eq!(rejected.reason.as_deref(), Some("already_running"));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_bad_request() {
        let dir = workspace("exit 0\n");
        let app = api_routes(test_state(dir.path()));

        let (status, _) = send(app, "POST", "/api/jobs/start", Some(r#"{"kind":"huge"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_kind_defaults_to_deploy_type_param() {
        let dir = workspace("sleep 5\n");
        std::fs::write(
            dir.path().join("deploycluster_parameter.sh"),
            "export DEPLOY_TYPE=\"multi\"\n",
        )
        .unwrap();
        let state = test_state(dir.path());

        let (status, _) = send(api_routes(state.clone()), "POST", "/api/jobs/start", Some("{}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.jobs.status().await.kind, Some(JobKind::Multi));
    }

    #[tokio::test]
    async fn test_log_without_job_is_empty() {
        let dir = workspace("exit 0\n");
        let app = api_routes(test_state(dir.path()));

        let (status, body) = send(app, "GET", "/api/jobs/log?offset=0", None).await;
        assert_eq!(status, StatusCode::OK);
        let chunk: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(chunk["content"], "");
        assert_eq!(chunk["offset"], 0);
        assert_eq!(chunk["eof"], true);
    }
}
