//! Serial ports in raw mode, with absolute read/write deadlines and
//! selective line configuration.
//!
//! A [`Port`] owns one open device. Opening switches the device to raw byte
//! mode and remembers how it was configured; closing puts that configuration
//! back and drops the modem control lines unless
//! [`ConfFlags::NO_RESET`] was requested.
//!
//! # Modules
//!
//! - `port`: the session, line configuration model, deadlines and backends
//! - `error`: the error type shared by all port operations
//! - `config`: TOML configuration with environment overrides
//! - `logging`: `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use serial_line::{Conf, ConfFlags, Parity, Port};
//! use std::time::{Duration, Instant};
//!
//! let mut port = Port::open("/dev/ttyUSB0")?;
//! let conf = Conf {
//!     baudrate: 115200,
//!     parity: Parity::Even,
//!     ..port.conf()?
//! };
//! port.configure_some(&conf, ConfFlags::BAUDRATE | ConfFlags::PARITY)?;
//!
//! port.set_deadline(Some(Instant::now() + Duration::from_millis(500)));
//! port.write(b"AT\r")?;
//! let mut reply = [0u8; 64];
//! let n = port.read(&mut reply)?;
//! println!("{:?}", &reply[..n]);
//! port.close()?;
//! # Ok::<(), serial_line::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod port;

pub use error::{Error, Result};
pub use port::{
    Backend, Conf, ConfFlags, DeadlineState, Direction, Flow, FlushSelector, Parity, Port,
    PortOptions, SpeedTable, SystemBackend, VirtualDevice, VirtualPort,
};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
