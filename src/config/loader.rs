//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use directories::ProjectDirs;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_LINE";

const CONFIG_FILE_NAME: &str = "serial-line.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_LINE_CONFIG";

/// Device variable understood by older hardware test setups.
const LEGACY_TEST_PORT_ENV: &str = "TEST_SERIAL_DEV";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_LINE_CONFIG` environment variable (explicit path)
    /// 2. `./serial-line.toml` (current directory)
    /// 3. `serial-line.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override values from the file.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides that fail to parse are ignored here.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        if let Err(e) = apply_env_overrides(&mut config) {
            tracing::warn!(error = %e, "ignoring environment override");
        }

        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to the file it was loaded from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired("No config file path set".to_string()))?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            config.validate()?;
            self.config = config;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "serial-line").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_key(section: &str, key: &str) -> String {
    format!("{ENV_PREFIX}_{section}_{key}")
}

fn parse_env<T: FromStr>(var: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}: '{value}'")))
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `SERIAL_LINE_<SECTION>_<KEY>`, e.g.
/// `SERIAL_LINE_SERIAL_WAKE_INTERVAL_MS=5` or
/// `SERIAL_LINE_TESTING_PORT=/dev/ttyUSB0`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    let var = env_key("SERIAL", "WAKE_INTERVAL_MS");
    if let Ok(val) = env::var(&var) {
        config.serial.wake_interval_ms = parse_env(&var, &val, "wake interval")?;
    }

    // Testing overrides (also support the legacy TEST_SERIAL_DEV)
    if let Ok(val) =
        env::var(env_key("TESTING", "PORT")).or_else(|_| env::var(LEGACY_TEST_PORT_ENV))
    {
        if !val.trim().is_empty() {
            config.testing.port = Some(val);
        }
    }
    let var = env_key("TESTING", "ALT_BAUD");
    if let Ok(val) = env::var(&var) {
        config.testing.alt_baud = parse_env(&var, &val, "baud rate")?;
    }

    if let Ok(val) = env::var(env_key("LOGGING", "LEVEL")) {
        config.logging.level = val;
    }
    let var = env_key("LOGGING", "FORMAT");
    if let Ok(val) = env::var(&var) {
        config.logging.format = parse_env::<LogFormat>(&var, &val, "log format")?;
    }

    Ok(())
}
