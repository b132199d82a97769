//! Completion marker detection.
//!
//! The deployment script prints a fixed literal on its own success path.
//! Finding that literal in the log is the only evidence of success: exit
//! codes are not trusted.

use std::io;
use std::path::Path;

use super::log_store;

/// Literal printed by `deploycluster.sh` when it finishes successfully.
pub const DEFAULT_COMPLETION_MARKER: &str = "Finished deploy cluster";

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    marker: String,
}

impl CompletionDetector {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Exact substring search over the full content. An empty marker never
    /// matches.
    pub fn scan(&self, content: &[u8]) -> bool {
        !self.marker.is_empty() && memchr::memmem::find(content, self.marker.as_bytes()).is_some()
    }

    /// Re-read the whole log and scan it.
    pub async fn scan_file(&self, path: &Path) -> io::Result<bool> {
        let content = log_store::read_all(path).await?;
        Ok(self.scan(&content))
    }
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETION_MARKER)
    }
}
