//! Configuration for serial-line.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_LINE_CONFIG` environment variable (explicit path)
//! 2. `./serial-line.toml` (current directory)
//! 3. `serial-line/serial-line.toml` under the platform config directory
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `SERIAL_LINE_<SECTION>_<KEY>`:
//! - `SERIAL_LINE_SERIAL_WAKE_INTERVAL_MS=5`
//! - `SERIAL_LINE_TESTING_PORT=/dev/ttyUSB0` (or the legacy `TEST_SERIAL_DEV`)
//! - `SERIAL_LINE_LOGGING_FORMAT=json`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_line::config::ConfigLoader;
//! use serial_line::Port;
//!
//! let loader = ConfigLoader::load()?;
//! let serial = &loader.config().serial;
//! let port: Port = Port::open_with(&serial.resolve_port("modem"), serial.port_options())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, TestingConfig};
