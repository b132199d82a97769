// crates/server/src/main.rs
//! Deployment console binary.
//!
//! Parses flags, recovers any job left behind by a previous run, then
//! serves the API until killed.

use anyhow::{Context, Result};
use clap::Parser;
use deploy_console_server::{create_app, AppState, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,deploy_console_server=info,deploy_console_core=info".into()),
        )
        .compact()
        .init();

    let config = ServerConfig::parse();

    eprintln!("\n  deploy-console v{}\n", env!("CARGO_PKG_VERSION"));

    let state = AppState::new(&config);
    let recovered = state.jobs.observe().await;
    if let Some(log_path) = &recovered.log_path {
        tracing::info!(
            log_path = %log_path.display(),
            running = recovered.running,
            outcome = ?recovered.outcome,
            "Recovered previous deployment"
        );
    }

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        work_dir = %config.work_dir.display(),
        script = %config.script,
        "Deploy console listening"
    );
    eprintln!("  \u{2192} http://{addr}\n");

    axum::serve(listener, create_app(state)).await?;

    Ok(())
}
