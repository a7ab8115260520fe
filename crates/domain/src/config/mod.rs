mod policy;
mod scanning;
mod server;
mod store;

pub use policy::*;
pub use scanning::*;
pub use server::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub scanning: ScanningConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        // Binding outside loopback defeats the localhost anchoring of the
        // admin surface; allowed, but loudly.
        if let Ok(ip) = self.server.host.parse::<IpAddr>() {
            if !ip.is_loopback() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "server.host".into(),
                    message: format!(
                        "{ip} is not a loopback address; non-loopback requests \
                         are still rejected per-request"
                    ),
                });
            }
        }

        if self.store.state_path.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.state_path".into(),
                message: "state_path must not be empty".into(),
            });
        }

        if self.store.flush_interval_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.flush_interval_secs".into(),
                message: "flush interval must be greater than 0".into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.max_requests == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.max_requests".into(),
                    message: "max_requests must be greater than 0".into(),
                });
            }
            if rl.window_secs == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.window_secs".into(),
                    message: "window_secs must be greater than 0".into(),
                });
            }
        }

        for (field, patterns) in [
            ("scanning.request_patterns", &self.scanning.request_patterns),
            ("scanning.response_patterns", &self.scanning.response_patterns),
        ] {
            for pattern in patterns {
                if let Err(e) = regex::Regex::new(pattern) {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: field.into(),
                        message: format!("invalid regex {pattern:?}: {e}"),
                    });
                }
            }
        }

        errors
    }
}
