//! Deployment parameter file (`deploycluster_parameter.sh`).
//!
//! The file is a POSIX shell fragment sourced by the deployment script.
//! Every parameter is one `export KEY="VALUE"` line; anything else is
//! ignored on read and regenerated on write.

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// Parameter that selects the deployment topology (`single` or `multi`).
pub const DEPLOY_TYPE_KEY: &str = "DEPLOY_TYPE";

const HEADER: &str = "## Mandatory options\n";

const LOG_TIME_HELPER: &str = "\n# Utility function for logging with timestamps\n\
function log_time() {\n  \
printf \"[%s] %b\\n\" \"$(date '+%Y-%m-%d %H:%M:%S')\" \"$1\"\n\
}\n\
export -f log_time\n";

/// Ordered key/value view of the parameter file.
///
/// Order is preserved so that a load/save cycle does not reshuffle the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployParams {
    entries: Vec<(String, String)>,
}

impl DeployParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace a parameter. Replacing keeps the original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the contents of a parameter file.
    pub fn parse(content: &str) -> Self {
        let mut params = Self::new();
        for line in content.lines() {
            let Some(rest) = line.strip_prefix("export ") else {
                continue;
            };
            let Some((key, value)) = rest.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            params.set(key, strip_quotes(value.trim()));
        }
        params
    }

    /// Render the parameter file, including the `log_time` helper the
    /// deployment script relies on.
    pub fn render(&self) -> Result<String, ConfigError> {
        let mut out = String::from(HEADER);
        for (key, value) in self.iter() {
            validate(key, value)?;
            out.push_str(&format!("export {key}=\"{value}\"\n"));
        }
        out.push_str(LOG_TIME_HELPER);
        Ok(out)
    }
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'')
}

fn validate(key: &str, value: &str) -> Result<(), ConfigError> {
    let mut chars = key.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::invalid_param(key, "not a shell identifier"));
    }
    if value.contains(['"', '\n', '\r']) {
        return Err(ConfigError::invalid_param(
            key,
            "value may not contain quotes or newlines",
        ));
    }
    Ok(())
}

/// Read the parameter file. A missing file yields an empty set.
pub async fn load_params(path: &Path) -> Result<DeployParams, ConfigError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let params = DeployParams::parse(&content);
            tracing::debug!(path = %path.display(), count = params.len(), "Loaded deployment parameters");
            Ok(params)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Parameter file missing, using empty set");
            Ok(DeployParams::new())
        }
        Err(e) => Err(ConfigError::io(path, e)),
    }
}

/// Overwrite the parameter file with `params`.
pub async fn save_params(path: &Path, params: &DeployParams) -> Result<(), ConfigError> {
    let rendered = params.render()?;
    tokio::fs::write(path, rendered)
        .await
        .map_err(|e| ConfigError::io(path, e))
}

impl Serialize for DeployParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DeployParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = DeployParams;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameter names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut params = DeployParams::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    params.set(k, v);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(ParamsVisitor)
    }
}
