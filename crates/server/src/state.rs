// crates/server/src/state.rs
//! Application state for the Axum server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::jobs::JobController;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// The single deployment job controller.
    pub jobs: Arc<JobController>,
    /// Shell parameter file sourced by the deployment script.
    pub params_path: PathBuf,
    /// Cluster host list.
    pub hosts_path: PathBuf,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(config: &ServerConfig) -> Arc<Self> {
        Self::with_controller(
            Arc::new(JobController::new(config.job_settings())),
            config.params_path(),
            config.hosts_path(),
        )
    }

    /// Create with an externally-built controller (tests inject one with a
    /// fake process probe).
    pub fn with_controller(
        jobs: Arc<JobController>,
        params_path: PathBuf,
        hosts_path: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            jobs,
            params_path,
            hosts_path,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// State over `dir` with a probe that never sees a process, so liveness is
/// decided by the log alone.
#[cfg(test)]
pub(crate) fn test_state(dir: &std::path::Path) -> Arc<AppState> {
    use crate::jobs::monitor::tests::NoProcess;
    use crate::jobs::JobSettings;

    let mut settings = JobSettings::new(dir);
    settings.stream_interval = std::time::Duration::from_millis(20);
    let jobs = JobController::with_probe(settings, Arc::new(NoProcess));
    AppState::with_controller(
        Arc::new(jobs),
        dir.join("deploycluster_parameter.sh"),
        dir.join("segmenthosts.conf"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_app_state_new() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig::try_parse_from([
            "deploy-console",
            "--work-dir",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
        let state = AppState::new(&config);
        assert!(state.uptime_secs() < 1);
        assert_eq!(state.params_path, dir.path().join("deploycluster_parameter.sh"));
        assert_eq!(state.jobs.settings().log_dir, dir.path().join("logs"));
    }
}
