// crates/server/src/routes/config.rs
//! Deployment parameter and host list endpoints.
//!
//! - GET/PUT /config - `export KEY="VALUE"` parameter file as a JSON object
//! - GET/PUT /hosts - coordinator and segment hosts
//!
//! Writes are refused while a deployment is running, since the script
//! sources both files.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use deploy_console_core::{load_hosts, load_params, save_hosts, save_params, DeployParams, HostTopology};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

async fn ensure_idle(state: &AppState) -> ApiResult<()> {
    if state.jobs.refresh().await {
        return Err(ApiError::Conflict(
            "deployment in progress; configuration is read-only".to_string(),
        ));
    }
    Ok(())
}

/// GET /api/config
async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<DeployParams>> {
    Ok(Json(load_params(&state.params_path).await?))
}

/// PUT /api/config
async fn put_config(
    State(state): State<Arc<AppState>>,
    Json(params): Json<DeployParams>,
) -> ApiResult<Json<DeployParams>> {
    ensure_idle(&state).await?;
    save_params(&state.params_path, &params).await?;
    tracing::info!(path = %state.params_path.display(), count = params.len(), "Deployment parameters saved");
    Ok(Json(params))
}

/// GET /api/hosts
async fn get_hosts(State(state): State<Arc<AppState>>) -> ApiResult<Json<HostTopology>> {
    Ok(Json(load_hosts(&state.hosts_path).await?))
}

/// PUT /api/hosts
async fn put_hosts(
    State(state): State<Arc<AppState>>,
    Json(hosts): Json<HostTopology>,
) -> ApiResult<Json<HostTopology>> {
    ensure_idle(&state).await?;
    save_hosts(&state.hosts_path, &hosts).await?;
    Ok(Json(hosts))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/config", get(get_config).put(put_config))
        .route("/hosts", get(get_hosts).put(put_hosts))
}
