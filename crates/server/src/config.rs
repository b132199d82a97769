//! Server configuration from command-line flags and environment.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::jobs::{JobSettings, DEFAULT_COMPLETION_MARKER};

/// Default port for the console.
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, Parser)]
#[command(name = "deploy-console", version, about = "Web console for cluster deployment jobs")]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(long, env = "DEPLOY_CONSOLE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "DEPLOY_CONSOLE_BIND", default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Directory holding the deployment script and its config files.
    #[arg(long, env = "DEPLOY_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,

    /// Where deployment logs are written. Defaults to `<work-dir>/logs`.
    #[arg(long, env = "DEPLOY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Deployment script, relative to the work dir.
    #[arg(long, env = "DEPLOY_SCRIPT", default_value = "deploycluster.sh")]
    pub script: String,

    /// Interpreter for the script.
    #[arg(long, env = "DEPLOY_SHELL", default_value = "sh")]
    pub shell: String,

    #[arg(long, env = "DEPLOY_PARAM_FILE", default_value = "deploycluster_parameter.sh")]
    pub param_file: PathBuf,

    #[arg(long, env = "DEPLOY_HOSTS_FILE", default_value = "segmenthosts.conf")]
    pub hosts_file: PathBuf,

    /// Seconds without log activity before a job is presumed dead.
    #[arg(long, env = "DEPLOY_STALENESS_SECS", default_value_t = 300)]
    pub staleness_secs: u64,

    /// Poll interval of the log stream in milliseconds.
    #[arg(long, env = "DEPLOY_STREAM_INTERVAL_MS", default_value_t = 500)]
    pub stream_interval_ms: u64,

    /// Literal the script prints on success.
    #[arg(long, env = "DEPLOY_COMPLETION_MARKER", default_value = DEFAULT_COMPLETION_MARKER)]
    pub completion_marker: String,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn params_path(&self) -> PathBuf {
        self.work_dir.join(&self.param_file)
    }

    pub fn hosts_path(&self) -> PathBuf {
        self.work_dir.join(&self.hosts_file)
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            shell: self.shell.clone(),
            script: self.script.clone(),
            work_dir: self.work_dir.clone(),
            log_dir: self
                .log_dir
                .clone()
                .unwrap_or_else(|| self.work_dir.join("logs")),
            staleness: Duration::from_secs(self.staleness_secs),
            stream_interval: Duration::from_millis(self.stream_interval_ms),
            completion_marker: self.completion_marker.clone(),
        }
    }
}
