//! Configuration schema definitions.
//!
//! Every section is `#[serde(default)]`, so a file only needs the keys it
//! changes.

use super::error::{ConfigError, ConfigResult};
use crate::port::{PortOptions, DEFAULT_WAKE_INTERVAL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    /// Hardware testing configuration
    pub testing: TestingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values serde cannot reject on its own.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.wake_interval_ms == 0 {
            return Err(ConfigError::validation(
                "serial.wake_interval_ms",
                "must be at least 1",
            ));
        }
        if self.testing.alt_baud == 0 {
            return Err(ConfigError::validation("testing.alt_baud", "must be non-zero"));
        }
        Ok(())
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Longest single wait inside a blocking read or write, in milliseconds
    pub wake_interval_ms: u64,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            wake_interval_ms: DEFAULT_WAKE_INTERVAL.as_millis() as u64,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn wake_interval(&self) -> Duration {
        Duration::from_millis(self.wake_interval_ms)
    }

    /// Session options derived from this section.
    pub fn port_options(&self) -> PortOptions {
        PortOptions {
            wake_interval: self.wake_interval(),
        }
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Hardware testing configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestingConfig {
    /// Device used by the hardware tests; they are skipped when unset
    pub port: Option<String>,
    /// A rate different from the device's current one, used to check that
    /// changing the speed leaves the other fields alone
    pub alt_baud: u32,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            port: None,
            alt_baud: 19200,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set, e.g. "info" or
    /// "serial_line=debug"
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        })
    }
}
