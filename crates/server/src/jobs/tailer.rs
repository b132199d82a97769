//! Offset-based incremental reads of a deployment log.

use std::io;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::types::LogChunk;

/// Bytes read from `offset` to the current end of the log.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Delta {
    pub content: String,
    pub new_offset: u64,
    pub size: u64,
}

/// Read everything appended since `offset`.
///
/// - An offset past the end (log truncated or replaced) restarts at 0.
/// - The delta stops at the last complete UTF-8 character; a partially
///   written multi-byte sequence is left for the next read.
/// - The file handle is scoped to this call.
pub(crate) async fn read_delta(path: &Path, offset: u64) -> io::Result<Delta> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();

    let start = if offset > size {
        tracing::debug!(log_path = %path.display(), offset, size, "Offset past end of log, restarting at 0");
        0
    } else {
        offset
    };

    if start == size {
        return Ok(Delta {
            content: String::new(),
            new_offset: size,
            size,
        });
    }

    file.seek(io::SeekFrom::Start(start)).await?;
    let mut buf = Vec::with_capacity((size - start) as usize);
    (&mut file).take(size - start).read_to_end(&mut buf).await?;

    let complete = complete_utf8_len(&buf);
    buf.truncate(complete);

    Ok(Delta {
        content: String::from_utf8_lossy(&buf).into_owned(),
        new_offset: start + complete as u64,
        size,
    })
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence.
fn complete_utf8_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        // Genuinely invalid bytes are passed through lossily.
        Err(_) => bytes.len(),
    }
}

pub struct LogTailer;

impl LogTailer {
    /// `eof` mirrors the monitor's `running` flag, not the end of the file:
    /// the file is often momentarily at its end while the job still runs.
    ///
    /// Read failures degrade to an empty chunk carrying an `error` message.
    pub async fn read(path: &Path, offset: u64, running: bool) -> LogChunk {
        match read_delta(path, offset).await {
            Ok(delta) => LogChunk {
                content: delta.content,
                offset: delta.new_offset,
                eof: !running,
                error: None,
            },
            Err(e) => {
                tracing::warn!(log_path = %path.display(), offset, error = %e, "Failed to read deployment log");
                LogChunk {
                    content: String::new(),
                    offset,
                    eof: !running,
                    error: Some(format!("Failed to read log: {e}")),
                }
            }
        }
    }
}
