//! Static configuration that cannot be changed at runtime.
//! These settings affect server binding or require restart to change.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Static configuration that cannot be changed at runtime
/// These settings affect server binding or require restart to change
#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_http")]
    pub http: HttpClientConfig,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            limits: default_limits(),
            http: default_http(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// JSON document holding the hot-reloadable generation settings.
    /// Rewritten in full on every update.
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
}

/// Size limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Upper bound for request bodies (base64 images and voice clips are large)
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

/// Outbound HTTP client configuration shared by all model backends
#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl HttpClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    5000
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        config_path: default_config_path(),
    }
}

pub(crate) fn default_config_path() -> PathBuf {
    PathBuf::from("./config.json")
}

pub(crate) fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_request_bytes: default_max_request_bytes(),
    }
}

pub(crate) fn default_max_request_bytes() -> usize {
    64 * 1024 * 1024 // 64MB
}

pub(crate) fn default_http() -> HttpClientConfig {
    HttpClientConfig {
        connect_timeout_secs: default_connect_timeout_secs(),
    }
}

pub(crate) fn default_connect_timeout_secs() -> u64 {
    10
}
