//! Spawns the external deployment command and drains its output.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::JobError;
use super::log_store::LogWriter;

/// Lines buffered between the pipe readers and the log writer.
const LINE_BUFFER: usize = 1024;

/// How long to keep draining after the child exits. Descendants started
/// by the script may hold the pipes open indefinitely.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// What to launch.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A launched deployment process.
#[derive(Debug)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    /// Resolves once the process has exited and its output is in the log.
    pub drain: JoinHandle<DrainReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// `-1` when the process was terminated by a signal or could not be waited on.
    pub exit_code: Option<i32>,
    pub lines: u64,
    pub write_errors: u64,
}

pub struct ProcessRunner;

impl ProcessRunner {
    /// Launch `spec` in its own process group and start draining its
    /// combined stdout/stderr into `writer`.
    ///
    /// On failure a diagnostic line is appended to the log before the error
    /// is returned.
    pub async fn spawn(spec: &CommandSpec, mut writer: LogWriter) -> Result<ProcessHandle, JobError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.work_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group: the deployment and its descendants can be
        // signalled as a unit and are detached from the controller's tree.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let diagnostic = format!("Failed to start {}: {}", spec.display(), source);
                if let Err(e) = writer.append_line(&diagnostic).await {
                    tracing::error!(
                        log_path = %writer.path().display(),
                        error = %e,
                        "Could not write spawn diagnostic to log"
                    );
                }
                return Err(JobError::Spawn {
                    program: spec.program.clone(),
                    source,
                });
            }
        };

        let pid = child.id();
        tracing::info!(
            pid = ?pid,
            command = %spec.display(),
            log_path = %writer.path().display(),
            "Deployment process started"
        );

        let drain = tokio::spawn(drain(child, writer));
        Ok(ProcessHandle { pid, drain })
    }
}

/// Single writer loop: pipe readers feed lines over a channel, this task
/// appends them, then records the exit trailer.
async fn drain(mut child: Child, mut writer: LogWriter) -> DrainReport {
    let (tx, mut rx) = mpsc::channel::<String>(LINE_BUFFER);
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
    }
    drop(tx);

    let mut report = DrainReport::default();

    let waited = loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => write_line(&mut writer, &line, &mut report).await,
                None => break None,
            },
            status = child.wait() => break Some(status),
        }
    };
    let exit_code = match waited {
        Some(status) => exit_code_of(status),
        None => exit_code_of(child.wait().await),
    };

    // Pipes may still be held by grandchildren; take what arrives within the
    // grace period and move on.
    while let Ok(Some(line)) = tokio::time::timeout(EXIT_GRACE, rx.recv()).await {
        write_line(&mut writer, &line, &mut report).await;
    }
    for reader in readers {
        reader.abort();
    }

    write_line(
        &mut writer,
        &format!("Process exited with code: {exit_code}"),
        &mut report,
    )
    .await;

    tracing::info!(
        exit_code,
        lines = report.lines,
        write_errors = report.write_errors,
        log_path = %writer.path().display(),
        "Deployment process exited"
    );
    report.exit_code = Some(exit_code);
    report
}

async fn write_line(writer: &mut LogWriter, line: &str, report: &mut DrainReport) {
    report.lines += 1;
    if let Err(e) = writer.append_line(line).await {
        report.write_errors += 1;
        if report.write_errors == 1 {
            tracing::error!(
                log_path = %writer.path().display(),
                error = %e,
                "Failed to append to deployment log"
            );
        }
    }
}

fn exit_code_of(status: std::io::Result<std::process::ExitStatus>) -> i32 {
    match status {
        Ok(status) => status.code().unwrap_or_else(|| {
            tracing::warn!(status = %status, "Deployment process terminated by signal");
            -1
        }),
        Err(e) => {
            tracing::error!(error = %e, "Failed to wait on deployment process");
            -1
        }
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if tx.send(line.to_string()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error reading deployment output");
                break;
            }
        }
    }
}
