//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! log_format = "json"
//!
//! [controller]
//! manifests_dir = "/etc/httpmon/monitors"
//! rescan_interval_ms = 10000
//! http_client_timeout_ms = 29000
//! default_request_timeout_ms = 5000
//!
//! [globals]
//! env = "staging"
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use httpmon_core::ControllerConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub controller: ControllerSection,

    /// Variables visible to every monitor, overridden by `--set-var`.
    #[serde(default)]
    pub globals: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_format: default_log_format(),
        }
    }
}

pub fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerSection {
    #[serde(default = "default_manifests_dir")]
    pub manifests_dir: PathBuf,

    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,

    #[serde(default = "default_http_client_timeout_ms")]
    pub http_client_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub default_request_timeout_ms: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            manifests_dir: default_manifests_dir(),
            rescan_interval_ms: default_rescan_interval_ms(),
            http_client_timeout_ms: default_http_client_timeout_ms(),
            default_request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_manifests_dir() -> PathBuf {
    PathBuf::from("./monitors")
}

fn default_rescan_interval_ms() -> u64 {
    10_000
}

fn default_http_client_timeout_ms() -> u64 {
    29_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        let c = &self.controller;
        if c.rescan_interval_ms == 0 {
            return Err("controller.rescan_interval_ms must be greater than zero".into());
        }
        if c.http_client_timeout_ms == 0 {
            return Err("controller.http_client_timeout_ms must be greater than zero".into());
        }
        if c.default_request_timeout_ms == 0 {
            return Err("controller.default_request_timeout_ms must be greater than zero".into());
        }

        if self.globals.keys().any(|k| k.is_empty()) {
            return Err("Global variable names must not be empty".into());
        }

        Ok(())
    }

    pub fn to_controller_config(&self) -> ControllerConfig {
        let c = &self.controller;
        ControllerConfig::default()
            .with_http_client_timeout(Duration::from_millis(c.http_client_timeout_ms))
            .with_default_request_timeout(Duration::from_millis(c.default_request_timeout_ms))
            .with_rescan_interval(Duration::from_millis(c.rescan_interval_ms))
            .with_globals(self.globals.clone())
    }
}
