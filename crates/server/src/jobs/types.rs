//! Types for the deployment job controller.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::error::JobError;

/// Final verdict for a deployment run.
///
/// `Success` is only ever derived from the completion marker in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Unknown,
}

/// Deployment topology requested by the client, exported to the script as
/// `DEPLOY_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Single,
    Multi,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Single => "single",
            JobKind::Multi => "multi",
        }
    }
}

impl FromStr for JobKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(JobKind::Single),
            "multi" => Ok(JobKind::Multi),
            _ => Err(JobError::UnknownKind(s.to_string())),
        }
    }
}

/// The single-flight job record. Lives behind the controller's mutex.
#[derive(Debug, Clone, Default)]
pub struct JobRecord {
    pub running: bool,
    pub kind: Option<JobKind>,
    pub log_path: Option<PathBuf>,
    pub started_at: Option<DateTime<Local>>,
    pub pid: Option<u32>,
    pub outcome: Option<Outcome>,
    /// Informational only; never used to decide `outcome`.
    pub exit_code: Option<i32>,
    pub last_error: Option<String>,
    /// The attempt behind `log_path` never launched. Its log only holds
    /// the spawn diagnostic, so the monitor must not read it as activity.
    pub spawn_failed: bool,
}

impl JobRecord {
    pub fn snapshot(&self) -> JobStatusSnapshot {
        JobStatusSnapshot {
            running: self.running,
            kind: self.kind,
            log_path: self.log_path.clone(),
            started_at: self.started_at.map(|t| t.to_rfc3339()),
            pid: self.pid,
            outcome: self.outcome,
            exit_code: self.exit_code,
            last_error: self.last_error.clone(),
        }
    }
}

/// Consistent copy of the job record, served by `GET /api/jobs/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSnapshot {
    pub running: bool,
    pub kind: Option<JobKind>,
    pub log_path: Option<PathBuf>,
    pub started_at: Option<String>,
    pub pid: Option<u32>,
    pub outcome: Option<Outcome>,
    pub exit_code: Option<i32>,
    pub last_error: Option<String>,
}

/// Returned by a successful start.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub kind: JobKind,
    pub log_path: PathBuf,
    pub pid: Option<u32>,
    pub started_at: DateTime<Local>,
}

/// One pull-based read of the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogChunk {
    pub content: String,
    pub offset: u64,
    pub eof: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One push event on the log stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub content: String,
    pub is_running: bool,
    pub offset: u64,
    pub size: u64,
    pub eof: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
