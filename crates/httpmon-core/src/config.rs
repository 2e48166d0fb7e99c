use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-wide settings shared by every monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Upper bound for any single HTTP exchange on the shared client (default: 29s).
    pub http_client_timeout: Duration,
    /// Used when a request leaves `timeout` empty (default: 5s).
    pub default_request_timeout: Duration,
    /// How often the definition source is rescanned (default: 10s).
    pub rescan_interval: Duration,
    /// Variables available to every request of every monitor. A monitor's
    /// own globals take precedence.
    pub globals: BTreeMap<String, String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            http_client_timeout: Duration::from_secs(29),
            default_request_timeout: Duration::from_secs(5),
            rescan_interval: Duration::from_secs(10),
            globals: BTreeMap::new(),
        }
    }
}

impl ControllerConfig {
    pub fn with_http_client_timeout(mut self, timeout: Duration) -> Self {
        self.http_client_timeout = timeout;
        self
    }

    pub fn with_default_request_timeout(mut self, timeout: Duration) -> Self {
        self.default_request_timeout = timeout;
        self
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval.max(Duration::from_millis(100));
        self
    }

    pub fn with_global(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.globals.insert(key.into(), value.into());
        self
    }

    pub fn with_globals(mut self, globals: impl IntoIterator<Item = (String, String)>) -> Self {
        self.globals.extend(globals);
        self
    }
}

/// Parse a `key=value` pair as accepted by `--set-var`.
pub fn parse_set_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("--set-var format must be 'key=value', got '{}'", raw)),
    }
}
