//! Utility functions for hardware testing.

use serial_line::config::{ConfigLoader, TestingConfig};
use serial_line::{Conf, ConfFlags, Port};

/// Hardware test settings from the configuration file and environment.
pub fn testing_config() -> TestingConfig {
    match ConfigLoader::load() {
        Ok(loader) => loader.into_config().testing,
        Err(e) => {
            println!("⚠️  Ignoring unusable configuration: {}", e);
            ConfigLoader::with_defaults().into_config().testing
        }
    }
}

/// Skip test if no hardware is configured.
pub fn skip_without_hardware() -> Option<String> {
    let port = testing_config().port;
    if port.is_none() {
        println!("⏭️  Skipping hardware test: TEST_SERIAL_DEV / SERIAL_LINE_TESTING_PORT not set");
    }
    port
}

/// Open the test device and read its starting configuration.
pub fn open_with_baseline(name: &str) -> (Port, Conf) {
    let port = Port::open(name).unwrap_or_else(|e| panic!("Open {}: {}", name, e));
    let c0 = port.conf().expect("GetConf");
    (port, c0)
}

/// Apply one field and check that only that field changed.
///
/// Returns `false` when the device refused the value or reported something
/// else back; the caller decides whether that is acceptable.
pub fn set_single_field(port: &mut Port, c0: &Conf, request: &Conf, flag: ConfFlags) -> bool {
    if let Err(e) = port.configure_some(request, flag) {
        println!("   {:?} {}: {} (OK?)", flag, request, e);
        return false;
    }
    let c = port.conf().expect("GetConf");

    let mut expected = *c0;
    expected.merge(request, flag);
    if c != expected {
        let mut others = c;
        others.merge(c0, flag);
        assert_eq!(others, *c0, "fields outside {:?} changed", flag);
        println!("   {:?}: got {} (OK?)", flag, c);
        return false;
    }
    true
}
