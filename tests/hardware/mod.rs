//! Hardware-specific tests requiring a real serial device.
//!
//! These tests are ignored by default. Point them at a device through the
//! configuration file or the environment and run them with `--ignored`.

pub mod real_port_tests;
pub mod utils;
