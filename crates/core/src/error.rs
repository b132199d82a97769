// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when reading or writing the deployment config files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Permission denied accessing config file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid parameter {key}: {reason}")]
    InvalidParam { key: String, reason: String },

    #[error("Invalid host entry {ip} {hostname}: {reason}")]
    InvalidHost {
        ip: String,
        hostname: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn invalid_param(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_maps_permission_denied() {
        let err = ConfigError::io(
            "/etc/deploy.sh",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, ConfigError::PermissionDenied { .. }));
        assert!(err.to_string().contains("/etc/deploy.sh"));
    }

    #[test]
    fn io_error_keeps_source_for_other_kinds() {
        let err = ConfigError::io(
            "/tmp/hosts.conf",
            std::io::Error::new(std::io::ErrorKind::Other, "disk error"),
        );
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("disk error"));
    }
}
