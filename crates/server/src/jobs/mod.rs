// crates/server/src/jobs/mod.rs
//! Deployment job controller.
//!
//! Provides:
//! - `JobController`: single-flight start/status over one job record
//! - `ProcessRunner`: spawns the deployment script and drains its output
//! - `StatusMonitor`: rebuilds liveness from log marker, log freshness and
//!   the process table
//! - `LogTailer` / `log_events`: pull and push readers of the log

pub mod completion;
pub mod controller;
pub mod error;
pub mod log_store;
pub mod monitor;
pub mod runner;
pub mod stream;
pub mod tailer;
pub mod types;

pub use completion::{CompletionDetector, DEFAULT_COMPLETION_MARKER};
pub use controller::{JobController, JobSettings, DEFAULT_STREAM_INTERVAL};
pub use error::JobError;
pub use monitor::{ProcessProbe, StatusMonitor, SysinfoProbe, DEFAULT_STALENESS};
pub use stream::log_events;
pub use tailer::LogTailer;
pub use types::{JobHandle, JobKind, JobRecord, JobStatusSnapshot, LogChunk, Outcome, StreamEvent};
