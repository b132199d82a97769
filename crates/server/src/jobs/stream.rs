//! Push-based log streaming.
//!
//! A subscription is a plain `Stream`: dropping it (client disconnect)
//! stops the polling loop. The log file is opened and closed inside each
//! poll, so no handle outlives the stream on any exit path.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_stream::Stream;

use super::controller::JobController;
use super::tailer::read_delta;
use super::types::{JobStatusSnapshot, Outcome, StreamEvent};

/// Poll the log every `stream_interval` and yield what was appended.
///
/// Emits one event per poll, even when nothing new arrived. Ends after a
/// final `eof: true` event once the completion marker is in the log.
///
/// A job that looks dead (stale log, no process) does not end the stream:
/// the marker may still be flushed after the process exits. If a new job
/// replaces the log mid-stream, reading restarts at the beginning of the
/// new file.
pub fn log_events(controller: Arc<JobController>) -> impl Stream<Item = StreamEvent> {
    let interval = controller.stream_interval();

    async_stream::stream! {
        let mut current: Option<PathBuf> = None;
        let mut offset = 0u64;

        loop {
            let snapshot = controller.observe().await;
            if snapshot.log_path != current {
                current = snapshot.log_path.clone();
                offset = 0;
            }

            let mut event = StreamEvent {
                content: String::new(),
                is_running: snapshot.running,
                offset,
                size: 0,
                eof: is_settled(&snapshot),
                error: None,
            };

            if let Some(path) = &current {
                match read_delta(path, offset).await {
                    Ok(delta) => {
                        offset = delta.new_offset;
                        event.content = delta.content;
                        event.offset = delta.new_offset;
                        event.size = delta.size;
                    }
                    Err(e) => {
                        tracing::warn!(log_path = %path.display(), error = %e, "Log stream read failed");
                        event.error = Some(format!("Failed to read log: {e}"));
                    }
                }
            }

            let finished = event.eof;
            yield event;
            if finished {
                tracing::debug!(log_path = ?current, "Log stream finished");
                break;
            }

            tokio::time::sleep(interval).await;
        }
    }
}

fn is_settled(snapshot: &JobStatusSnapshot) -> bool {
    !snapshot.running && snapshot.outcome == Some(Outcome::Success)
}
