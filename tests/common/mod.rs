//! Shared test utilities for serial-line integration tests.
//!
//! - Virtual devices with unique names so tests can run in parallel
//! - Logging set up once per test binary
//! - Small timing helpers

#![allow(dead_code)]

use serial_line::config::{LogFormat, LoggingConfig};
use serial_line::port::{PortOptions, VirtualControl, VirtualDevice, VirtualPort};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::{Duration, Instant};

static NEXT_DEVICE: AtomicUsize = AtomicUsize::new(0);
static LOGGING: Once = Once::new();

/// Route crate logs to the test output. `RUST_LOG=serial_line=trace` shows
/// every transfer.
pub fn init_logging() {
    LOGGING.call_once(|| {
        serial_line::logging::init(&LoggingConfig {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        });
    });
}

/// A device name nobody else in this process uses.
pub fn unique_name(prefix: &str) -> String {
    let n = NEXT_DEVICE.fetch_add(1, Ordering::Relaxed);
    format!("virtual-{prefix}-{n}")
}

/// Register a fresh 9600 8N1 device.
pub fn device(prefix: &str) -> VirtualDevice {
    init_logging();
    VirtualDevice::create(unique_name(prefix))
}

/// Register a fresh device whose line starts out as `control`.
pub fn device_with(prefix: &str, control: VirtualControl) -> VirtualDevice {
    init_logging();
    VirtualDevice::with_line(unique_name(prefix), control)
}

/// Register a device and open a port on it.
pub fn open_pair(prefix: &str) -> (VirtualDevice, VirtualPort) {
    let device = device(prefix);
    let port = device.open().expect("failed to open virtual port");
    (device, port)
}

/// Open a port with a short wake interval, for tests that re-arm deadlines.
pub fn open_fast(device: &VirtualDevice) -> VirtualPort {
    VirtualPort::open_with(
        device.name(),
        PortOptions {
            wake_interval: Duration::from_millis(5),
        },
    )
    .expect("failed to open virtual port")
}

/// Deadline `millis` from now.
pub fn in_ms(millis: u64) -> Option<Instant> {
    Some(Instant::now() + Duration::from_millis(millis))
}

/// Run `f` and return its result with the elapsed time.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}
