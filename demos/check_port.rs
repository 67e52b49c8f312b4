//! Print the configuration of a real serial device.
//!
//! Usage: `cargo run --example check_port -- /dev/ttyUSB0`
//!
//! Without an argument the device from the `[testing]` section of the
//! configuration (or `TEST_SERIAL_DEV`) is used. Port aliases from the
//! `[serial]` section are resolved.

use serial_line::config::ConfigLoader;
use serial_line::Port;
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load()?.into_config();
    serial_line::logging::init(&config.logging);

    let Some(name) = env::args().nth(1).or(config.testing.port.clone()) else {
        eprintln!("usage: check_port <device>  (or set TEST_SERIAL_DEV)");
        std::process::exit(2);
    };
    let name = config.serial.resolve_port(&name);

    let mut port: Port = Port::open_with(&name, config.serial.port_options())?;
    println!("Port:     {}", port.name());
    println!("Current:  {}", port.conf()?);
    println!("At open:  {}", port.restore_snapshot());
    port.close()?;
    Ok(())
}
