//! # Storage Configuration
//!
//! JSON description of the named services to build at startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{StorageError, StorageResult};
use super::mirror::FanOut;
use crate::http_server::HttpServerConfig;

/// One named service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service")]
pub enum ServiceConfig {
    Disk {
        root: PathBuf,
        /// Public base URL for signed URLs (defaults to the top-level host)
        #[serde(default)]
        host: Option<String>,
        /// Signing secret (defaults to the top-level secret)
        #[serde(default)]
        secret: Option<String>,
    },
    Memory {
        #[serde(default)]
        secret: Option<String>,
    },
    Mirror {
        primary: String,
        mirrors: Vec<String>,
        #[serde(default)]
        fan_out: FanOut,
        #[serde(default)]
        deadline_ms: Option<u64>,
        #[serde(default)]
        spool_threshold: Option<usize>,
    },
}

impl ServiceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceConfig::Disk { .. } => "Disk",
            ServiceConfig::Memory { .. } => "Memory",
            ServiceConfig::Mirror { .. } => "Mirror",
        }
    }

    /// Names of other services this entry depends on
    pub fn references(&self) -> Vec<&str> {
        match self {
            ServiceConfig::Mirror {
                primary, mirrors, ..
            } => std::iter::once(primary.as_str())
                .chain(mirrors.iter().map(String::as_str))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Signing secret shared by services that do not set their own
    #[serde(default)]
    pub secret: Option<String>,

    /// Public base URL of the HTTP server (default: "http://localhost:54321")
    #[serde(default = "default_host")]
    pub host: String,

    /// Service used when a command names none
    #[serde(default)]
    pub default_service: Option<String>,

    #[serde(default)]
    pub http: HttpServerConfig,

    pub services: BTreeMap<String, ServiceConfig>,
}

fn default_host() -> String {
    "http://localhost:54321".to_string()
}

impl StorageConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> StorageResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StorageError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> StorageResult<Self> {
        let config: StorageConfig = serde_json::from_str(content)
            .map_err(|e| StorageError::InvalidConfig(format!("invalid config JSON: {}", e)))?;

        if config.services.is_empty() {
            return Err(StorageError::InvalidConfig(
                "no services configured".to_string(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_services() {
        let config = StorageConfig::from_json(
            r#"{
                "secret": "s",
                "default_service": "mirror",
                "services": {
                    "a": { "service": "Disk", "root": "/tmp/a" },
                    "b": { "service": "Memory" },
                    "mirror": {
                        "service": "Mirror",
                        "primary": "a",
                        "mirrors": ["b"],
                        "fan_out": "sequential",
                        "deadline_ms": 2500
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.host, "http://localhost:54321");
        assert_eq!(config.http.port, 54321);
        assert_eq!(config.services["a"].kind(), "Disk");
        assert_eq!(config.services["mirror"].references(), vec!["a", "b"]);
        assert_eq!(
            config.services["mirror"],
            ServiceConfig::Mirror {
                primary: "a".to_string(),
                mirrors: vec!["b".to_string()],
                fan_out: FanOut::Sequential,
                deadline_ms: Some(2500),
                spool_threshold: None,
            }
        );
    }

    #[test]
    fn test_unknown_service_type() {
        let result = StorageConfig::from_json(
            r#"{ "services": { "a": { "service": "Tape", "root": "/dev/st0" } } }"#,
        );
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_services() {
        let result = StorageConfig::from_json(r#"{ "services": {} }"#);
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
    }
}
