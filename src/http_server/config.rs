//! HTTP Server Configuration
//!
//! Bind address and CORS settings, read from the `http` section of the
//! storage configuration file.

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 54321)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed to PUT direct uploads from a browser.
    /// Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Largest direct upload body accepted, in bytes. Unset means no limit
    /// beyond the length each signed URL already pins.
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    54321
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_upload_bytes: None,
        }
    }
}

impl HttpServerConfig {
    /// Create a new config with specified port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 54321);
        assert!(config.cors_origins.is_empty());
        assert!(config.max_upload_bytes.is_none());
    }

    #[test]
    fn test_partial_json() {
        let config: HttpServerConfig =
            serde_json::from_str(r#"{ "port": 9000, "cors_origins": ["https://app.example"] }"#)
                .unwrap();
        assert_eq!(config.socket_addr(), "0.0.0.0:9000");
        assert_eq!(config.cors_origins.len(), 1);

        let config: HttpServerConfig =
            serde_json::from_str(r#"{ "max_upload_bytes": 1048576 }"#).unwrap();
        assert_eq!(config.max_upload_bytes, Some(1024 * 1024));
    }

    #[test]
    fn test_socket_addr() {
        let config = HttpServerConfig::with_port(8080);
        assert_eq!(config.socket_addr(), "0.0.0.0:8080");
    }
}
