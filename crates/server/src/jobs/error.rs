//! Error taxonomy for the deployment job controller.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    /// Start rejected because a deployment is still active. Expected contention.
    #[error("A deployment is already running")]
    AlreadyRunning,

    #[error("Unknown job kind: {0} (expected \"single\" or \"multi\")")]
    UnknownKind(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Log file error at {path}: {source}")]
    LogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    pub fn log_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LogIo {
            path: path.into(),
            source,
        }
    }
}
