//! Tests requiring actual serial hardware.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_SERIAL_DEV=/dev/ttyUSB0    # or SERIAL_LINE_TESTING_PORT
//! export SERIAL_LINE_TESTING_ALT_BAUD=19200   # optional
//!
//! cargo test --test integration_hardware -- --ignored --test-threads=1
//! ```
//!
//! Every test opens the device, changes one kind of field and checks that
//! nothing else moved. Values some devices cannot represent (very high
//! rates, 5/6 data bits, mark/space parity, RTS/CTS) are logged instead of
//! failing.

use super::utils::{open_with_baseline, set_single_field, skip_without_hardware, testing_config};
use serial_line::{Conf, ConfFlags, Error, Flow, Parity, Port};
use std::time::{Duration, Instant};

const STANDARD_RATES: [u32; 30] = [
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 460800, 500000, 576000, 921600, 1000000, 1152000, 1500000, 2000000, 2500000,
    3000000, 3500000, 4000000,
];

#[test]
#[ignore] // Run with --ignored flag
fn test_real_port_baudrate() {
    let Some(name) = skip_without_hardware() else {
        return;
    };
    let (mut port, c0) = open_with_baseline(&name);

    for baudrate in STANDARD_RATES {
        let request = Conf {
            baudrate,
            ..Default::default()
        };
        let ok = set_single_field(&mut port, &c0, &request, ConfFlags::BAUDRATE);
        // All devices must go up to 38400
        assert!(ok || baudrate > 38400, "baudrate {} failed", baudrate);
    }

    port.close().expect("Close");
    println!("✅ Baudrate test passed");
}

#[test]
#[ignore]
fn test_real_port_databits() {
    let Some(name) = skip_without_hardware() else {
        return;
    };
    let (mut port, c0) = open_with_baseline(&name);

    for databits in [5, 6, 7, 8] {
        let request = Conf {
            databits,
            ..Default::default()
        };
        let ok = set_single_field(&mut port, &c0, &request, ConfFlags::DATABITS);
        assert!(ok || databits < 7, "databits {} failed", databits);
    }

    port.close().expect("Close");
}

#[test]
#[ignore]
fn test_real_port_parity() {
    let Some(name) = skip_without_hardware() else {
        return;
    };
    let (mut port, c0) = open_with_baseline(&name);

    for parity in [Parity::None, Parity::Even, Parity::Odd, Parity::Mark, Parity::Space] {
        let request = Conf {
            parity,
            ..Default::default()
        };
        let ok = set_single_field(&mut port, &c0, &request, ConfFlags::PARITY);
        assert!(
            ok || matches!(parity, Parity::Mark | Parity::Space),
            "parity {} failed",
            parity
        );
    }

    port.close().expect("Close");
}

#[test]
#[ignore]
fn test_real_port_stopbits() {
    let Some(name) = skip_without_hardware() else {
        return;
    };
    let (mut port, c0) = open_with_baseline(&name);

    for stopbits in [1, 2] {
        let request = Conf {
            stopbits,
            ..Default::default()
        };
        assert!(
            set_single_field(&mut port, &c0, &request, ConfFlags::STOPBITS),
            "stopbits {} failed",
            stopbits
        );
    }

    port.close().expect("Close");
}

#[test]
#[ignore]
fn test_real_port_flow() {
    let Some(name) = skip_without_hardware() else {
        return;
    };
    let (mut port, c0) = open_with_baseline(&name);

    for flow in [Flow::None, Flow::RtsCts, Flow::XonXoff] {
        let request = Conf {
            flow,
            ..Default::default()
        };
        let ok = set_single_field(&mut port, &c0, &request, ConfFlags::FLOW);
        assert!(ok || flow == Flow::RtsCts, "flow {} failed", flow);
    }

    port.close().expect("Close");
}

#[test]
#[ignore]
fn test_real_port_no_reset() {
    let Some(name) = skip_without_hardware() else {
        return;
    };
    let (mut port, c0) = open_with_baseline(&name);

    let alt = testing_config().alt_baud;
    let baudrate = if c0.baudrate == alt { 9600 } else { alt };
    let request = Conf {
        baudrate,
        no_reset: true,
        ..Default::default()
    };
    port.configure_some(&request, ConfFlags::BAUDRATE | ConfFlags::NO_RESET)
        .expect("ConfSome");
    port.close().expect("Close");

    let mut port = Port::open(&name).expect("Open");
    let c = port.conf().expect("GetConf");
    if c.baudrate != baudrate {
        // Some systems reset port parameters no matter what we do.
        println!("   Baudrate {} != {} (OK?)", c.baudrate, baudrate);
    }
    port.close().expect("Close");
}

#[test]
#[ignore]
fn test_real_port_close_restores() {
    let Some(name) = skip_without_hardware() else {
        return;
    };
    let (mut port, c0) = open_with_baseline(&name);

    let alt = testing_config().alt_baud;
    let request = Conf {
        baudrate: if c0.baudrate == alt { 9600 } else { alt },
        ..Default::default()
    };
    port.configure_some(&request, ConfFlags::BAUDRATE)
        .expect("ConfSome");
    port.close().expect("Close");

    let (mut port, c) = open_with_baseline(&name);
    assert_eq!(c, c0, "close must restore the settings found at open");
    port.close().expect("Close");
}

#[test]
#[ignore]
fn test_real_port_read_deadline() {
    let Some(name) = skip_without_hardware() else {
        return;
    };
    let (mut port, _) = open_with_baseline(&name);
    port.flush_input().expect("FlushIn");
    port.set_read_deadline(Some(Instant::now() + Duration::from_millis(200)));

    let start = Instant::now();
    let mut buffer = [0u8; 64];
    match port.read(&mut buffer) {
        Err(Error::Timeout { transferred: 0 }) => {
            assert!(start.elapsed() >= Duration::from_millis(200));
            println!("✅ Read timed out after {:?}", start.elapsed());
        }
        Ok(n) => println!("   Device sent {} byte(s) unprompted (OK?)", n),
        Err(e) => panic!("Read: {}", e),
    }

    port.close().expect("Close");
}
