//! Configuration data structures for slotgate.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. Every
//! section carries serde defaults so that an empty file is a valid configuration.
//! Durations are humantime strings ("500ms", "30s", "2m").
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error_stream::DEFAULT_ERROR_BUFFER;

/// Root configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SlotgateConfig {
    pub gate: GateConfig,
    pub fetch: FetchConfig,
    pub logging: LoggingConfig,
}

/// Admission gate settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GateConfig {
    /// Maximum number of concurrently running jobs (0 is coerced to 1)
    pub capacity: usize,
    /// Number of job errors buffered before new ones are dropped
    pub error_buffer: usize,
    /// Label attached to logs and metrics
    pub label: String,
    /// Upper bound the CLI waits for the drain after a shutdown signal
    pub shutdown_timeout: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            error_buffer: DEFAULT_ERROR_BUFFER,
            label: "default".to_string(),
            shutdown_timeout: "30s".to_string(),
        }
    }
}

impl GateConfig {
    /// Parsed `shutdown_timeout`.
    pub fn shutdown_timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.shutdown_timeout)
    }
}

/// Settings for HTTP fetch jobs.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    /// HTTP method (GET, HEAD, POST, ...)
    pub method: String,
    /// Per-request timeout
    pub timeout: String,
    /// User-Agent header value
    pub user_agent: String,
    /// Treat non-2xx responses as job failures
    pub fail_on_status: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            timeout: "30s".to_string(),
            user_agent: concat!("slotgate/", env!("CARGO_PKG_VERSION")).to_string(),
            fail_on_status: true,
        }
    }
}

impl FetchConfig {
    /// Parsed per-request `timeout`.
    pub fn timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.timeout)
    }
}

/// Logging settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "slotgate=debug"
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Include span context in JSON output
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            include_spans: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SlotgateConfig::default();
        assert_eq!(cfg.gate.capacity, 8);
        assert_eq!(cfg.gate.error_buffer, 10);
        assert_eq!(cfg.gate.shutdown_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(cfg.fetch.method, "GET");
        assert!(cfg.fetch.user_agent.starts_with("slotgate/"));
    }

    #[test]
    fn test_bad_duration() {
        let fetch = FetchConfig {
            timeout: "soon".to_string(),
            ..FetchConfig::default()
        };
        assert!(fetch.timeout().is_err());
    }
}
