//! Append-only deployment log files.
//!
//! Each run gets its own `deploy_<YYYYMMDD_HHMMSS>_<seq>.log` under the log
//! directory. Files are never deleted here; they are kept for audit.
//! Every record is one line: `[YYYY-MM-DD HH:MM:SS] <text>`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use chrono::Local;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

const LOG_PREFIX: &str = "deploy_";
const LOG_SUFFIX: &str = ".log";

/// Attempts before giving up on finding an unused file name.
const MAX_ALLOCATE_ATTEMPTS: u32 = 1000;

/// Timestamp used for the prefix of every log line.
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format one log record, newline included.
pub fn format_line(text: &str) -> String {
    format!("[{}] {}\n", timestamp(), text)
}

/// Directory that holds the deployment logs.
#[derive(Debug)]
pub struct LogStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a fresh log file and return its writer.
    ///
    /// The name combines the wall-clock second with a sequence number so
    /// two starts within the same second never share a file. Creation uses
    /// create-new semantics, so a leftover file from an earlier controller
    /// process is skipped rather than appended to.
    pub async fn allocate(&self) -> io::Result<(PathBuf, LogWriter)> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");

        for _ in 0..MAX_ALLOCATE_ATTEMPTS {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            let path = self
                .dir
                .join(format!("{LOG_PREFIX}{stamp}_{seq:04}{LOG_SUFFIX}"));
            match OpenOptions::new().append(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path.clone(), LogWriter { path, file })),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no unused log file name available",
        ))
    }

    /// Most recently modified deployment log, if any.
    ///
    /// Used at startup so a job launched by a previous controller process
    /// can be rediscovered.
    pub fn latest(&self) -> io::Result<Option<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(LOG_PREFIX) || !name.ends_with(LOG_SUFFIX) {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            let path = entry.path();
            let newer = match &newest {
                Some((t, p)) => (modified, &path) > (*t, p),
                None => true,
            };
            if newer {
                newest = Some((modified, path));
            }
        }
        Ok(newest.map(|(_, p)| p))
    }
}

/// Sole writer of one log file. Flushes after every line.
#[derive(Debug)]
pub struct LogWriter {
    path: PathBuf,
    file: File,
}

impl LogWriter {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append_line(&mut self, text: &str) -> io::Result<()> {
        self.file.write_all(format_line(text).as_bytes()).await?;
        self.file.flush().await
    }
}

/// Current size of a log in bytes.
pub async fn size(path: &Path) -> io::Result<u64> {
    Ok(tokio::fs::metadata(path).await?.len())
}

/// Last-modified time of a log.
pub async fn modified(path: &Path) -> io::Result<SystemTime> {
    tokio::fs::metadata(path).await?.modified()
}

/// Whole log as raw bytes.
pub async fn read_all(path: &Path) -> io::Result<Vec<u8>> {
    tokio::fs::read(path).await
}
