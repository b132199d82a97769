//! API route handlers for the deployment console.

pub mod config;
pub mod health;
pub mod jobs;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - POST /api/jobs/start - Start a deployment
/// - GET  /api/jobs/status - Job record with fresh liveness
/// - GET  /api/jobs/log?offset=N - Incremental log read
/// - GET  /api/jobs/stream - SSE stream of log deltas
/// - GET  /api/config, PUT /api/config - Deployment parameters
/// - GET  /api/hosts, PUT /api/hosts - Cluster host list
pub fn api_routes(state: Arc<AppState>) -> Router {
    let api = health::router()
        .merge(jobs::router())
        .merge(config::router());

    Router::new().nest("/api", api).with_state(state)
}
