//! Cluster host list (`segmenthosts.conf`).
//!
//! Sections are introduced by `##Coordinator hosts` and `##Segment hosts`
//! header lines; each host is an `ip hostname` pair on its own line.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const COORDINATOR_HEADER: &str = "##Coordinator hosts";
const SEGMENT_HEADER: &str = "##Segment hosts";

/// One `ip hostname` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub ip: String,
    pub hostname: String,
}

impl HostEntry {
    pub fn new(ip: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            hostname: hostname.into(),
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let ip = parts.next()?;
        let hostname = parts.next()?;
        ip.parse::<IpAddr>().ok()?;
        Some(Self::new(ip, hostname))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidHost {
            ip: self.ip.clone(),
            hostname: self.hostname.clone(),
            reason: reason.to_string(),
        };
        if self.ip.parse::<IpAddr>().is_err() {
            return Err(invalid("not an IP address"));
        }
        if self.hostname.is_empty() || self.hostname.contains(char::is_whitespace) {
            return Err(invalid("hostname must be a single non-empty word"));
        }
        Ok(())
    }
}

/// Coordinator plus segment hosts of the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTopology {
    pub coordinator: Option<HostEntry>,
    #[serde(default)]
    pub segments: Vec<HostEntry>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Coordinator,
    Segments,
}

impl HostTopology {
    pub fn parse(content: &str) -> Self {
        let mut topology = Self::default();
        let mut section = Section::None;

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with(COORDINATOR_HEADER) {
                section = Section::Coordinator;
                continue;
            }
            if line.starts_with(SEGMENT_HEADER) {
                section = Section::Segments;
                continue;
            }
            if line.starts_with('#') {
                section = Section::None;
                continue;
            }
            let Some(entry) = HostEntry::parse(line) else {
                continue;
            };
            match section {
                Section::Coordinator if topology.coordinator.is_none() => {
                    topology.coordinator = Some(entry);
                }
                Section::Segments => topology.segments.push(entry),
                _ => {}
            }
        }
        topology
    }

    pub fn render(&self) -> Result<String, ConfigError> {
        let mut out = String::from("##Define hosts used for Hashdata\n\n#Hashdata hosts begin\n");
        out.push_str(COORDINATOR_HEADER);
        out.push('\n');
        if let Some(coordinator) = &self.coordinator {
            coordinator.validate()?;
            out.push_str(&format!("{} {}\n", coordinator.ip, coordinator.hostname));
        }
        out.push_str(SEGMENT_HEADER);
        out.push('\n');
        for segment in &self.segments {
            segment.validate()?;
            out.push_str(&format!("{} {}\n", segment.ip, segment.hostname));
        }
        out.push_str("#Hashdata hosts end\n");
        Ok(out)
    }
}

/// Read the host list. A missing file yields an empty topology.
pub async fn load_hosts(path: &Path) -> Result<HostTopology, ConfigError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(HostTopology::parse(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostTopology::default()),
        Err(e) => Err(ConfigError::io(path, e)),
    }
}

pub async fn save_hosts(path: &Path, hosts: &HostTopology) -> Result<(), ConfigError> {
    let rendered = hosts.render()?;
    tokio::fs::write(path, rendered)
        .await
        .map_err(|e| ConfigError::io(path, e))?;
    tracing::info!(
        path = %path.display(),
        segments = hosts.segments.len(),
        "Saved host list"
    );
    Ok(())
}
