//! Walk through a port session on an in-memory device.
//!
//! Nothing here needs hardware: the virtual device plays the other end of
//! the line, so the example shows exactly what reaches the "wire".

use serial_line::config::ConfigLoader;
use serial_line::port::VirtualDevice;
use serial_line::{Conf, ConfFlags, Error, Flow, Parity};
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::with_defaults().into_config();
    serial_line::logging::init(&config.logging);

    println!("=== Port Session Example ===\n");

    let device = VirtualDevice::create("demo0");
    let mut port = device.open()?;
    println!("1. Opened {} at {}", port.name(), port.conf()?);

    // Only the speed and parity change; data bits, stop bits and flow control
    // keep whatever the device had.
    let request = Conf {
        baudrate: 115200,
        parity: Parity::Even,
        flow: Flow::None,
        ..Default::default()
    };
    port.configure_some(&request, ConfFlags::BAUDRATE | ConfFlags::PARITY)?;
    println!("2. Reconfigured to {}", port.conf()?);

    device.push_input(b"OK\r\n");
    let mut buffer = [0u8; 64];
    let n = port.read(&mut buffer)?;
    println!("3. Read {:?}", String::from_utf8_lossy(&buffer[..n]));

    port.write(b"AT+GMR\r\n")?;
    println!("4. Device received {:?}", String::from_utf8_lossy(&device.output()));

    port.set_read_deadline(Some(Instant::now() + Duration::from_millis(100)));
    match port.read(&mut buffer) {
        Err(Error::Timeout { .. }) => println!("5. Read timed out as expected"),
        other => println!("5. Unexpected read result: {:?}", other),
    }

    device.set_tx_window(4);
    port.set_write_deadline(Some(Instant::now() + Duration::from_millis(100)));
    if let Err(e) = port.write(b"too much data") {
        println!("6. Partial write: {} ({} byte(s) sent)", e, e.transferred());
    }

    port.close()?;
    println!(
        "7. Closed: line restored to {:?}, DTR {}",
        device.line().speed,
        if device.dtr() { "up" } else { "down" }
    );

    println!("\n=== Example complete ===");
    Ok(())
}
