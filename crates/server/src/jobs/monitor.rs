//! Liveness reconstruction for the deployment job.
//!
//! The controller's in-memory record can be lost (restart, crash), so
//! "is a deployment running" is rebuilt from externally observable
//! evidence. Decision order, first match wins:
//!
//! | # | Evidence                                        | Running | Outcome   |
//! |---|-------------------------------------------------|---------|-----------|
//! | 1 | completion marker present in the log            | no      | `Success` |
//! | 2 | log modified within the staleness window        | yes     | -         |
//! | 3 | live process whose command line names the script| yes     | -         |
//! | 4 | log exists, stale, no process                   | no      | `Failure` |
//! | 5 | no log, no process                              | no      | `Unknown` |
//!
//! The marker is ground truth and beats recency; recency beats the process
//! table, which can be fooled by an unrelated process with a similar
//! command line.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use super::completion::CompletionDetector;
use super::log_store;
use super::types::{JobRecord, Outcome};

/// Default staleness window: a log untouched for this long is presumed dead.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(300);

/// Looks up live processes by command line.
pub trait ProcessProbe: Send + Sync {
    /// PID of a live process (other than this one) whose command line
    /// contains `needle`.
    fn find(&self, needle: &str) -> Option<u32>;
}

/// Process-table scan backed by `sysinfo`.
///
/// Does synchronous system calls; the monitor runs it on the blocking pool.
#[derive(Debug, Default)]
pub struct SysinfoProbe;

impl ProcessProbe for SysinfoProbe {
    fn find(&self, needle: &str) -> Option<u32> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
        );
        let own_pid = sysinfo::get_current_pid().ok();

        sys.processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != own_pid)
            .find(|(_, process)| {
                process
                    .cmd()
                    .iter()
                    .any(|arg| arg.to_string_lossy().contains(needle))
            })
            .map(|(pid, _)| pid.as_u32())
    }
}

/// Which rule of the decision chain fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Completed,
    Advancing,
    ProcessAlive(u32),
    Stale,
    NoEvidence,
}

impl Verdict {
    pub fn is_running(&self) -> bool {
        matches!(self, Verdict::Advancing | Verdict::ProcessAlive(_))
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Verdict::Completed => Some(Outcome::Success),
            Verdict::Stale => Some(Outcome::Failure),
            Verdict::NoEvidence => Some(Outcome::Unknown),
            Verdict::Advancing | Verdict::ProcessAlive(_) => None,
        }
    }
}

pub struct StatusMonitor {
    detector: CompletionDetector,
    staleness: Duration,
    probe: Arc<dyn ProcessProbe>,
    /// Substring of the deployment command line, usually the script name.
    needle: String,
}

impl StatusMonitor {
    pub fn new(
        detector: CompletionDetector,
        staleness: Duration,
        probe: Arc<dyn ProcessProbe>,
        needle: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            staleness,
            probe,
            needle: needle.into(),
        }
    }

    pub fn detector(&self) -> &CompletionDetector {
        &self.detector
    }

    /// Walk the decision chain for the given log.
    ///
    /// I/O errors are logged and count as missing evidence; they never
    /// produce `Completed`.
    pub async fn evaluate(&self, log_path: Option<&Path>) -> Verdict {
        let mut log_exists = false;

        if let Some(path) = log_path {
            match self.detector.scan_file(path).await {
                Ok(true) => return Verdict::Completed,
                Ok(false) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(log_path = %path.display(), error = %e, "Could not scan deployment log");
                }
            }

            match log_store::modified(path).await {
                Ok(mtime) => {
                    log_exists = true;
                    if self.is_fresh(mtime) {
                        return Verdict::Advancing;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    log_exists = true;
                    tracing::warn!(log_path = %path.display(), error = %e, "Could not stat deployment log");
                }
            }
        }

        if let Some(pid) = self.find_process().await {
            return Verdict::ProcessAlive(pid);
        }

        if log_exists {
            Verdict::Stale
        } else {
            Verdict::NoEvidence
        }
    }

    /// Fold a verdict into the record. Returns `true` when `running` flipped.
    ///
    /// Reaching the same verdict again is a no-op, so a finished job
    /// transitions exactly once.
    pub fn apply(&self, record: &mut JobRecord, verdict: Verdict) -> bool {
        let running = verdict.is_running();
        let outcome = verdict.outcome();
        let flipped = record.running != running;

        if let Verdict::ProcessAlive(pid) = verdict {
            record.pid = Some(pid);
        }

        if !flipped && record.outcome == outcome {
            return false;
        }

        record.running = running;
        record.outcome = outcome;
        tracing::info!(
            running,
            outcome = ?outcome,
            verdict = ?verdict,
            log_path = ?record.log_path,
            "Deployment status changed"
        );
        flipped
    }

    fn is_fresh(&self, mtime: SystemTime) -> bool {
        // An mtime in the future (clock skew) counts as fresh.
        let age = SystemTime::now()
            .duration_since(mtime)
            .unwrap_or(Duration::ZERO);
        age <= self.staleness
    }

    async fn find_process(&self) -> Option<u32> {
        let probe = Arc::clone(&self.probe);
        let needle = self.needle.clone();
        match tokio::task::spawn_blocking(move || probe.find(&needle)).await {
            Ok(pid) => pid,
            Err(e) => {
                tracing::warn!(error = %e, "Process table scan failed");
                None
            }
        }
    }
}
