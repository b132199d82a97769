//! Single-flight controller for the deployment job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use deploy_console_core::DEPLOY_TYPE_KEY;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::completion::{CompletionDetector, DEFAULT_COMPLETION_MARKER};
use super::error::JobError;
use super::log_store::LogStore;
use super::monitor::{ProcessProbe, StatusMonitor, SysinfoProbe, DEFAULT_STALENESS};
use super::runner::{CommandSpec, DrainReport, ProcessRunner};
use super::tailer::LogTailer;
use super::types::{JobHandle, JobKind, JobRecord, JobStatusSnapshot, LogChunk, Outcome};

/// Default polling interval of the log stream.
pub const DEFAULT_STREAM_INTERVAL: Duration = Duration::from_millis(500);

/// Job-related settings, usually derived from `ServerConfig`.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Interpreter used to run the script (`sh`).
    pub shell: String,
    /// Deployment script, relative to `work_dir`. Also the needle for the
    /// process-table scan.
    pub script: String,
    pub work_dir: PathBuf,
    pub log_dir: PathBuf,
    pub staleness: Duration,
    pub stream_interval: Duration,
    pub completion_marker: String,
}

impl JobSettings {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            shell: "sh".to_string(),
            script: "deploycluster.sh".to_string(),
            log_dir: work_dir.join("logs"),
            work_dir,
            staleness: DEFAULT_STALENESS,
            stream_interval: DEFAULT_STREAM_INTERVAL,
            completion_marker: DEFAULT_COMPLETION_MARKER.to_string(),
        }
    }

    fn command_for(&self, kind: JobKind) -> CommandSpec {
        CommandSpec {
            program: self.shell.clone(),
            args: vec![self.script.clone()],
            work_dir: self.work_dir.clone(),
            env: vec![(DEPLOY_TYPE_KEY.to_string(), kind.as_str().to_string())],
        }
    }
}

/// Owns the job record and coordinates runner, monitor and readers.
///
/// One instance per server, shared as `Arc<JobController>`.
pub struct JobController {
    record: Arc<Mutex<JobRecord>>,
    store: LogStore,
    monitor: StatusMonitor,
    settings: JobSettings,
}

impl JobController {
    pub fn new(settings: JobSettings) -> Self {
        Self::with_probe(settings, Arc::new(SysinfoProbe))
    }

    /// Build with a custom process probe (tests inject a fake).
    pub fn with_probe(settings: JobSettings, probe: Arc<dyn ProcessProbe>) -> Self {
        let store = LogStore::new(settings.log_dir.clone());
        let monitor = StatusMonitor::new(
            CompletionDetector::new(settings.completion_marker.clone()),
            settings.staleness,
            probe,
            settings.script.clone(),
        );

        // Adopt the newest log from a previous controller process so the
        // monitor can tell whether that deployment is still going.
        let mut record = JobRecord::default();
        match store.latest() {
            Ok(Some(path)) => {
                tracing::info!(log_path = %path.display(), "Recovered previous deployment log");
                record.log_path = Some(path);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(log_dir = %store.dir().display(), error = %e, "Could not scan log directory");
            }
        }

        Self {
            record: Arc::new(Mutex::new(record)),
            store,
            monitor,
            settings,
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Start a deployment unless one is active.
    ///
    /// The lock is held across the monitor check and the spawn, so two
    /// concurrent starts cannot both see "not running".
    pub async fn start(&self, kind: JobKind) -> Result<JobHandle, JobError> {
        let mut record = self.record.lock().await;

        self.reevaluate(&mut record).await;
        if record.running {
            tracing::info!(kind = kind.as_str(), pid = ?record.pid, "Start rejected: deployment already running");
            return Err(JobError::AlreadyRunning);
        }

        let (log_path, writer) = self
            .store
            .allocate()
            .await
            .map_err(|e| JobError::log_io(self.store.dir(), e))?;

        let started_at = Local::now();
        *record = JobRecord {
            running: true,
            kind: Some(kind),
            log_path: Some(log_path.clone()),
            started_at: Some(started_at),
            ..Default::default()
        };

        let spec = self.settings.command_for(kind);
        match ProcessRunner::spawn(&spec, writer).await {
            Ok(process) => {
                record.pid = process.pid;
                self.supervise(process.drain, log_path.clone());
                Ok(JobHandle {
                    kind,
                    log_path,
                    pid: process.pid,
                    started_at,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, log_path = %log_path.display(), "Deployment failed to start");
                record.running = false;
                record.outcome = Some(Outcome::Failure);
                record.last_error = Some(e.to_string());
                record.spawn_failed = true;
                Err(e)
            }
        }
    }

    /// Copy of the record as it stands. Does not re-derive liveness.
    pub async fn status(&self) -> JobStatusSnapshot {
        self.record.lock().await.snapshot()
    }

    /// Re-run the monitor chain and return whether a job is running.
    pub async fn refresh(&self) -> bool {
        self.observe().await.running
    }

    /// Re-run the monitor chain and return the updated record.
    pub async fn observe(&self) -> JobStatusSnapshot {
        let mut record = self.record.lock().await;
        self.reevaluate(&mut record).await;
        record.snapshot()
    }

    /// Fold a fresh monitor verdict into `record`. A failed spawn stays
    /// settled until the next start replaces the record.
    async fn reevaluate(&self, record: &mut JobRecord) {
        if record.spawn_failed {
            return;
        }
        let verdict = self.monitor.evaluate(record.log_path.as_deref()).await;
        self.monitor.apply(record, verdict);
    }

    /// Pull-based incremental read for polling clients.
    pub async fn read_log(&self, offset: u64) -> LogChunk {
        let snapshot = self.observe().await;
        match &snapshot.log_path {
            Some(path) => LogTailer::read(path, offset, snapshot.running).await,
            None => LogChunk {
                content: String::new(),
                offset: 0,
                eof: !snapshot.running,
                error: None,
            },
        }
    }

    pub fn stream_interval(&self) -> Duration {
        self.settings.stream_interval
    }

    /// Fold the drain result into the record once the process is gone.
    ///
    /// A panic in the drain task surfaces here as a `JoinError` and is
    /// recorded instead of propagating.
    fn supervise(&self, drain: JoinHandle<DrainReport>, log_path: PathBuf) {
        let record = Arc::clone(&self.record);
        tokio::spawn(async move {
            let result = drain.await;
            let mut record = record.lock().await;
            if record.log_path.as_deref() != Some(log_path.as_path()) {
                // Superseded by a newer start.
                return;
            }
            match result {
                Ok(report) => {
                    record.exit_code = report.exit_code;
                    if report.write_errors > 0 {
                        record.last_error = Some(format!(
                            "{} of {} log lines could not be written",
                            report.write_errors, report.lines
                        ));
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, log_path = %log_path.display(), "Deployment drain task failed");
                    record.last_error = Some(format!("Log drain task failed: {e}"));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::monitor::tests::{age_file, FixedProcess, NoProcess};
    use std::io::Write;
    use tempfile::TempDir;

    /// Work dir with a deployment script that stays quiet for a while.
    fn workspace(script: &str) -> (TempDir, JobSettings) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("deploycluster.sh"), script).unwrap();
        let settings = JobSettings::new(dir.path());
        (dir, settings)
    }

    fn controller(settings: JobSettings) -> Arc<JobController> {
        Arc::new(JobController::with_probe(settings, Arc::new(NoProcess)))
    }

    fn append(path: &std::path::Path, text: &str) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        writeln!(f, "{text}").unwrap();
    }

    #[tokio::test]
    async fn fresh_controller_is_idle() {
        let (_dir, settings) = workspace("sleep 3\n");
        let jobs = controller(settings);
        let status = jobs.status().await;
        assert!(!status.running);
        assert!(status.log_path.is_none());
        assert!(status.outcome.is_none());

        assert!(!jobs.refresh().await);
        assert_eq!(jobs.status().await.outcome, Some(Outcome::Unknown));
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_first_runs() {
        let (_dir, settings) = workspace("sleep 3\n");
        let jobs = controller(settings);

        let handle = jobs.start(JobKind::Single).await.unwrap();
        assert!(handle.log_path.exists());
        assert!(handle.pid.is_some());

        let status = jobs.status().await;
        assert!(status.running);
        assert_eq!(status.kind, Some(JobKind::Single));
        assert_eq!(status.log_path.as_ref(), Some(&handle.log_path));

        assert!(matches!(
            jobs.start(JobKind::Multi).await,
            Err(JobError::AlreadyRunning)
        ));
        // Rejection leaves the record alone.
        assert_eq!(jobs.status().await.log_path.as_ref(), Some(&handle.log_path));
    }

    #[tokio::test]
    async fn concurrent_starts_admit_exactly_one() {
        let (_dir, settings) = workspace("sleep 3\n");
        let jobs = controller(settings);

        let attempts = (0..8).map(|i| {
            let jobs = Arc::clone(&jobs);
            let kind = if i % 2 == 0 { JobKind::Single } else { JobKind::Multi };
            tokio::spawn(async move { jobs.start(kind).await })
        });
        let results = futures_util::future::join_all(attempts).await;

        let started = results
            .iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(JobError::AlreadyRunning))))
            .count();
        assert_eq!(started, 1);
        assert_eq!(rejected, 7);
    }

    #[tokio::test]
    async fn marker_in_log_completes_job() {
        let (_dir, settings) = workspace("sleep 3\n");
        let jobs = controller(settings);
        let handle = jobs.start(JobKind::Single).await.unwrap();

        append(&handle.log_path, "[2026-01-01 00:00:00] Finished deploy cluster");

        assert!(!jobs.refresh().await);
        let status = jobs.status().await;
        assert!(!status.running);
        assert_eq!(status.outcome, Some(Outcome::Success));

        // A new job may start once the previous one has completed.
        let next = jobs.start(JobKind::Multi).await.unwrap();
        assert_ne!(next.log_path, handle.log_path);
    }

    #[tokio::test]
    async fn script_output_reaches_the_log() {
        let (_dir, settings) = workspace("echo \"deploying $DEPLOY_TYPE\"\necho 'Finished deploy cluster'\n");
        let jobs = controller(settings);
        let handle = jobs.start(JobKind::Multi).await.unwrap();

        let mut done = false;
        for _ in 0..50 {
            if !jobs.refresh().await {
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(done, "job never reported completion");

        let content = std::fs::read_to_string(&handle.log_path).unwrap();
        assert!(content.contains("] deploying multi\n"));
        assert_eq!(jobs.status().await.outcome, Some(Outcome::Success));
    }

    #[tokio::test]
    async fn spawn_failure_reverts_record() {
        let (_dir, mut settings) = workspace("true\n");
        settings.shell = "/nonexistent/shell".to_string();
        let jobs = controller(settings);

        let err = jobs.start(JobKind::Single).await.unwrap_err();
        assert!(matches!(err, JobError::Spawn { .. }));

        let status = jobs.status().await;
        assert!(!status.running);
        assert_eq!(status.outcome, Some(Outcome::Failure));
        assert!(status.last_error.unwrap().contains("/nonexistent/shell"));

        let failed_log = status.log_path.unwrap();
        let log = std::fs::read_to_string(&failed_log).unwrap();
        assert!(log.contains("Failed to start /nonexistent/shell deploycluster.sh"));
    }

    #[tokio::test]
    async fn spawn_failure_does_not_block_next_start() {
        let (_dir, mut settings) = workspace("sleep 3\n");
        settings.shell = "/nonexistent/shell".to_string();
        let failing = controller(settings.clone());
        failing.start(JobKind::Single).await.unwrap_err();

        // The diagnostic line left the log fresh; it must not read as a live job.
        assert!(!failing.refresh().await);
        let status = failing.observe().await;
        assert!(!status.running);
        assert_eq!(status.outcome, Some(Outcome::Failure));

        // Retrying still reaches the spawn instead of hitting AlreadyRunning.
        assert!(matches!(
            failing.start(JobKind::Single).await,
            Err(JobError::Spawn { .. })
        ));
        assert!(!failing.refresh().await);
    }

    #[tokio::test]
    async fn start_after_spawn_failure_runs_normally() {
        let (_dir, settings) = workspace("sleep 3\n");
        let mut broken = settings.clone();
        broken.shell = "/nonexistent/shell".to_string();

        let jobs = controller(broken);
        jobs.start(JobKind::Single).await.unwrap_err();
        assert!(jobs.record.lock().await.spawn_failed);

        // Same record, working shell.
        let fixed = JobController {
            record: Arc::clone(&jobs.record),
            store: LogStore::new(settings.log_dir.clone()),
            monitor: StatusMonitor::new(
                CompletionDetector::default(),
                settings.staleness,
                Arc::new(NoProcess),
                settings.script.clone(),
            ),
            settings,
        };
        let handle = fixed.start(JobKind::Multi).await.unwrap();
        let status = fixed.status().await;
        assert!(status.running);
        assert_eq!(status.outcome, None);
        assert_eq!(status.last_error, None);
        assert_eq!(status.log_path, Some(handle.log_path));
        assert!(!fixed.record.lock().await.spawn_failed);
    }

    #[tokio::test]
    async fn exit_code_is_recorded_but_not_trusted() {
        let (_dir, mut settings) = workspace("exit 0\n");
        settings.staleness = Duration::from_secs(300);
        let jobs = controller(settings);
        jobs.start(JobKind::Single).await.unwrap();

        let mut exit_code = None;
        for _ in 0..50 {
            exit_code = jobs.status().await.exit_code;
            if exit_code.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(exit_code, Some(0));
        // No marker: still considered running while the log is fresh.
        assert!(jobs.refresh().await);
        assert_ne!(jobs.status().await.outcome, Some(Outcome::Success));
    }

    #[tokio::test]
    async fn restart_recovers_latest_log() {
        let (dir, settings) = workspace("sleep 3\n");
        let first = controller(settings.clone());
        let handle = first.start(JobKind::Single).await.unwrap();
        drop(first);

        // A new controller process knows nothing in memory.
        let restarted = controller(settings.clone());
        assert_eq!(restarted.status().await.log_path, Some(handle.log_path.clone()));
        assert!(restarted.refresh().await);
        assert!(matches!(
            restarted.start(JobKind::Single).await,
            Err(JobError::AlreadyRunning)
        ));

        // Once the log goes stale with no process left, the job is failed.
        age_file(&handle.log_path, Duration::from_secs(3600));
        let after = controller(settings);
        assert!(!after.refresh().await);
        assert_eq!(after.status().await.outcome, Some(Outcome::Failure));
        drop(dir);
    }

    #[tokio::test]
    async fn live_process_blocks_start_without_log() {
        let (_dir, settings) = workspace("true\n");
        let jobs = JobController::with_probe(settings, Arc::new(FixedProcess(4242)));
        assert!(matches!(
            jobs.start(JobKind::Single).await,
            Err(JobError::AlreadyRunning)
        ));
        let status = jobs.status().await;
        assert!(status.running);
        assert_eq!(status.pid, Some(4242));
        assert!(status.log_path.is_none());
    }

    #[tokio::test]
    async fn read_log_without_job_is_empty() {
        let (_dir, settings) = workspace("true\n");
        let jobs = controller(settings);
        let chunk = jobs.read_log(10).await;
        assert_eq!(chunk.content, "");
        assert_eq!(chunk.offset, 0);
        assert!(chunk.eof);
    }
}
