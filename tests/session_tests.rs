//! Session lifecycle and line configuration tests against virtual devices.
//!
//! Covers:
//! - Opening: raw mode, snapshot, busy and missing devices
//! - Reading the live configuration back
//! - Selective configuration: only selected fields change
//! - Validation before any OS call
//! - OS failures while querying or applying
//! - Closing: restore, hang-up, NO_RESET, drop

mod common;

use common::{device, device_with, open_pair};
use proptest::prelude::*;
use serial_line::port::{LineSpeed, VirtualControl};
use serial_line::{Conf, ConfFlags, Error, Flow, Parity};

fn line_115200_7e2() -> VirtualControl {
    VirtualControl {
        speed: LineSpeed::Code(17),
        data_bits: 7,
        stop_bits: 2,
        parity: Parity::Even,
        flow: Flow::RtsCts,
        raw: false,
    }
}

// ============================================================================
// Open
// ============================================================================

mod open_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_open_missing_device() {
        let result = serial_line::VirtualPort::open_with(
            "virtual-never-registered",
            Default::default(),
        );
        match result {
            Err(Error::OpenFailed { name, .. }) => assert_eq!(name, "virtual-never-registered"),
            other => panic!("Expected OpenFailed, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_open_switches_to_raw_and_keeps_line() {
        // Arrange
        let device = device_with("open-raw", line_115200_7e2());

        // Act
        let port = device.open().unwrap();

        // Assert: raw mode on, nothing else touched
        let live = device.line();
        assert!(live.raw, "open must enable raw mode");
        assert_eq!(VirtualControl { raw: false, ..live }, line_115200_7e2());
        assert!(device.is_open());
        assert!(device.dtr() && device.rts());
        assert_eq!(port.name(), device.name());
        assert!(!port.is_closed());
    }

    #[test]
    fn test_snapshot_is_line_found_at_open() {
        let device = device_with("open-snapshot", line_115200_7e2());
        let mut port = device.open().unwrap();

        port.configure(&Conf {
            baudrate: 9600,
            databits: 8,
            stopbits: 1,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            port.restore_snapshot(),
            Conf {
                baudrate: 115200,
                databits: 7,
                stopbits: 2,
                parity: Parity::Even,
                flow: Flow::RtsCts,
                no_reset: false,
            }
        );
    }

    #[test]
    fn test_open_busy_device_fails() {
        let (device, _port) = open_pair("open-busy");

        let second = device.open();
        assert!(matches!(second, Err(Error::OpenFailed { .. })));
        assert!(device.is_open(), "the first session must stay open");
    }

    #[test]
    fn test_open_releases_device_when_query_fails() {
        let device = device("open-query-fails");
        device.fail_queries(true);

        assert!(matches!(device.open(), Err(Error::OpenFailed { .. })));
        assert!(!device.is_open(), "a failed open must release the device");

        device.fail_queries(false);
        assert!(device.open().is_ok());
    }
}

// ============================================================================
// Query
// ============================================================================

mod query_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_conf_reflects_live_line() {
        let device = device_with("query-live", line_115200_7e2());
        let port = device.open().unwrap();

        let conf = port.conf().unwrap();
        assert_eq!(conf.baudrate, 115200);
        assert_eq!(conf.databits, 7);
        assert_eq!(conf.stopbits, 2);
        assert_eq!(conf.parity, Parity::Even);
        assert_eq!(conf.flow, Flow::RtsCts);
        assert!(!conf.no_reset);
    }

    #[test]
    fn test_conf_sees_changes_made_elsewhere() {
        let (device, port) = open_pair("query-external");
        device.set_line(VirtualControl {
            flow: Flow::Other,
            ..device.line()
        });

        assert_eq!(port.conf().unwrap().flow, Flow::Other);
    }

    #[test]
    fn test_unknown_speed_code_reads_as_zero() {
        let (device, port) = open_pair("query-unknown-code");
        device.set_line(VirtualControl {
            speed: LineSpeed::Code(999),
            ..device.line()
        });

        let conf = port.conf().unwrap();
        assert_eq!(conf.baudrate, 0);
        assert_eq!(conf.databits, 8, "other fields are still decoded");
    }

    #[test]
    fn test_raw_rate_reads_back_verbatim() {
        let (device, port) = open_pair("query-raw-rate");
        device.set_line(VirtualControl {
            speed: LineSpeed::Rate(250000),
            ..device.line()
        });

        assert_eq!(port.conf().unwrap().baudrate, 250000);
    }

    #[test]
    fn test_query_failure() {
        let (device, port) = open_pair("query-fails");
        device.fail_queries(true);

        assert!(matches!(port.conf(), Err(Error::QueryFailed(_))));
    }
}

// ============================================================================
// Selective configuration
// ============================================================================

mod configure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_baudrate_only_changes_baudrate() {
        // Arrange
        let (_device, mut port) = open_pair("conf-baud");
        let c0 = port.conf().unwrap();

        // Act
        let request = Conf {
            baudrate: 115200,
            ..Default::default()
        };
        port.configure_some(&request, ConfFlags::BAUDRATE).unwrap();

        // Assert
        let c = port.conf().unwrap();
        assert_eq!(c.baudrate, 115200);
        assert_eq!(Conf { baudrate: c0.baudrate, ..c }, c0);
    }

    #[test]
    fn test_each_field_changes_alone() {
        let request = Conf {
            baudrate: 57600,
            databits: 6,
            stopbits: 2,
            parity: Parity::Odd,
            flow: Flow::XonXoff,
            no_reset: false,
        };
        let single_flags = [
            ConfFlags::BAUDRATE,
            ConfFlags::DATABITS,
            ConfFlags::STOPBITS,
            ConfFlags::PARITY,
            ConfFlags::FLOW,
        ];

        for flags in single_flags {
            let (_device, mut port) = open_pair("conf-single");
            let c0 = port.conf().unwrap();

            port.configure_some(&request, flags).unwrap();

            let mut expected = c0;
            expected.merge(&request, flags);
            assert_eq!(port.conf().unwrap(), expected, "flags: {flags:?}");
        }
    }

    #[test]
    fn test_mark_and_space_parity() {
        let (_device, mut port) = open_pair("conf-mark-space");
        for parity in [Parity::Mark, Parity::Space] {
            let request = Conf {
                parity,
                ..Default::default()
            };
            port.configure_some(&request, ConfFlags::PARITY).unwrap();
            assert_eq!(port.conf().unwrap().parity, parity);
        }
    }

    #[test]
    fn test_empty_flags_touch_nothing() {
        let (device, mut port) = open_pair("conf-empty");
        let before = device.line();
        // Any OS call would now fail.
        device.fail_queries(true);
        device.reject_configs(true);

        let nonsense = Conf {
            baudrate: 0,
            databits: 42,
            ..Default::default()
        };
        port.configure_some(&nonsense, ConfFlags::empty()).unwrap();

        assert_eq!(device.line(), before);
    }

    #[test]
    fn test_no_reset_alone_is_bookkeeping() {
        let (device, mut port) = open_pair("conf-no-reset-only");
        device.fail_queries(true);

        let request = Conf {
            no_reset: true,
            ..Default::default()
        };
        port.configure_some(&request, ConfFlags::NO_RESET).unwrap();

        device.fail_queries(false);
        assert!(port.conf().unwrap().no_reset);
    }

    #[test]
    fn test_invalid_databits_rejected_before_os() {
        let (device, mut port) = open_pair("conf-bad-databits");
        let before = device.line();
        device.fail_queries(true);

        let request = Conf {
            baudrate: 19200,
            databits: 9,
            ..Default::default()
        };
        let result = port.configure_some(&request, ConfFlags::BAUDRATE | ConfFlags::DATABITS);

        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert_eq!(device.line(), before, "nothing may be applied");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            (
                Conf {
                    baudrate: 0,
                    ..Default::default()
                },
                ConfFlags::BAUDRATE,
            ),
            (
                Conf {
                    stopbits: 3,
                    ..Default::default()
                },
                ConfFlags::STOPBITS,
            ),
            (
                Conf {
                    flow: Flow::Other,
                    ..Default::default()
                },
                ConfFlags::FLOW,
            ),
        ];

        for (request, flags) in cases {
            let (device, mut port) = open_pair("conf-invalid");
            let before = device.line();
            let result = port.configure_some(&request, flags);
            assert!(
                matches!(result, Err(Error::InvalidParameter(_))),
                "{request} with {flags:?} should be rejected"
            );
            assert_eq!(device.line(), before);
        }
    }

    #[test]
    fn test_unlisted_rate_needs_raw_rate_support() {
        let (device, mut port) = open_pair("conf-raw-rate");
        let request = Conf {
            baudrate: 250000,
            ..Default::default()
        };

        let result = port.configure_some(&request, ConfFlags::BAUDRATE);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        device.allow_raw_rates(true);
        port.configure_some(&request, ConfFlags::BAUDRATE).unwrap();
        assert_eq!(device.line().speed, LineSpeed::Rate(250000));
        assert_eq!(port.conf().unwrap().baudrate, 250000);
    }

    #[test]
    fn test_unselected_other_flow_survives() {
        let (device, mut port) = open_pair("conf-flow-other");
        device.set_line(VirtualControl {
            flow: Flow::Other,
            ..device.line()
        });

        let request = Conf {
            baudrate: 38400,
            ..Default::default()
        };
        port.configure_some(&request, ConfFlags::BAUDRATE).unwrap();

        let conf = port.conf().unwrap();
        assert_eq!(conf.baudrate, 38400);
        assert_eq!(conf.flow, Flow::Other);
    }

    #[test]
    fn test_apply_rejected() {
        let (device, mut port) = open_pair("conf-rejected");
        let before = device.line();
        device.reject_configs(true);

        let request = Conf {
            baudrate: 115200,
            ..Default::default()
        };
        let result = port.configure_some(&request, ConfFlags::BAUDRATE);

        assert!(matches!(result, Err(Error::ApplyFailed(_))));
        assert_eq!(device.line(), before);
    }

    #[test]
    fn test_partially_applied_state_is_observable() {
        let (device, mut port) = open_pair("conf-partial");
        device.reject_configs(true);
        device.partial_apply(true);

        let request = Conf {
            baudrate: 115200,
            databits: 7,
            stopbits: 1,
            parity: Parity::Odd,
            ..Default::default()
        };
        let result = port.configure_some(&request, ConfFlags::BAUDRATE | ConfFlags::FORMAT);
        assert!(matches!(result, Err(Error::ApplyFailed(_))));

        let conf = port.conf().unwrap();
        assert_eq!(conf.baudrate, 115200, "the speed went through");
        assert_eq!(conf.databits, 8, "the format did not");
        assert_eq!(conf.parity, Parity::None);
    }

    #[test]
    fn test_query_failure_during_configure() {
        let (device, mut port) = open_pair("conf-query-fails");
        device.fail_queries(true);

        let request = Conf {
            baudrate: 115200,
            ..Default::default()
        };
        let result = port.configure_some(&request, ConfFlags::BAUDRATE);
        assert!(matches!(result, Err(Error::QueryFailed(_))));
    }

    #[test]
    fn test_configure_applies_everything() {
        let (device, mut port) = open_pair("conf-all");
        let request = Conf {
            baudrate: 230400,
            databits: 5,
            stopbits: 2,
            parity: Parity::Even,
            flow: Flow::RtsCts,
            no_reset: true,
        };

        port.configure(&request).unwrap();

        assert_eq!(port.conf().unwrap(), request);
        assert_eq!(
            device.line(),
            VirtualControl {
                speed: LineSpeed::Code(18),
                data_bits: 5,
                stop_bits: 2,
                parity: Parity::Even,
                flow: Flow::RtsCts,
                raw: true,
            }
        );
    }

    fn arb_rate() -> impl Strategy<Value = u32> {
        prop::sample::select(vec![
            50u32, 300, 1200, 9600, 19200, 38400, 57600, 115200, 460800, 921600,
        ])
    }

    fn arb_parity() -> impl Strategy<Value = Parity> {
        prop::sample::select(vec![
            Parity::None,
            Parity::Even,
            Parity::Odd,
            Parity::Mark,
            Parity::Space,
        ])
    }

    fn arb_flow() -> impl Strategy<Value = Flow> {
        prop::sample::select(vec![Flow::None, Flow::RtsCts, Flow::XonXoff])
    }

    prop_compose! {
        fn arb_conf()(
            baudrate in arb_rate(),
            databits in 5u8..=8,
            stopbits in 1u8..=2,
            parity in arb_parity(),
            flow in arb_flow(),
        ) -> Conf {
            Conf { baudrate, databits, stopbits, parity, flow, no_reset: false }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_configure_some_is_a_merge(
            initial in arb_conf(),
            request in arb_conf(),
            bits in any::<u8>(),
        ) {
            let flags = ConfFlags::from_bits_truncate(bits) & ConfFlags::LINE;
            let (_device, mut port) = open_pair("conf-prop");
            port.configure(&initial).unwrap();

            port.configure_some(&request, flags).unwrap();

            let mut expected = initial;
            expected.merge(&request, flags);
            prop_assert_eq!(port.conf().unwrap(), expected);
        }
    }
}

// ============================================================================
// Close
// ============================================================================

mod close_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reconfigure(port: &mut serial_line::VirtualPort) {
        port.configure(&Conf {
            baudrate: 115200,
            databits: 7,
            stopbits: 1,
            parity: Parity::Even,
            flow: Flow::None,
            no_reset: false,
        })
        .unwrap();
    }

    #[test]
    fn test_close_restores_and_hangs_up() {
        // Arrange
        let (device, mut port) = open_pair("close-restore");
        reconfigure(&mut port);

        // Act
        port.close().unwrap();

        // Assert
        assert_eq!(device.line(), VirtualControl::default());
        assert!(!device.dtr());
        assert!(!device.rts());
        assert_eq!(device.hangups(), 1);
        assert!(!device.is_open());
        assert!(port.is_closed());
    }

    #[test]
    fn test_no_reset_keeps_settings_across_reopen() {
        let (device, mut port) = open_pair("close-no-reset");
        let request = Conf {
            baudrate: 19200,
            no_reset: true,
            ..Default::default()
        };
        port.configure_some(&request, ConfFlags::BAUDRATE | ConfFlags::NO_RESET)
            .unwrap();
        port.close().unwrap();

        assert_eq!(device.hangups(), 0);
        assert!(device.dtr(), "modem lines stay up");

        let mut reopened = device.open().unwrap();
        assert_eq!(reopened.conf().unwrap().baudrate, 19200);
        assert!(!reopened.conf().unwrap().no_reset, "NO_RESET is per session");
        reopened.close().unwrap();
    }

    #[test]
    fn test_no_reset_can_be_withdrawn() {
        let (device, mut port) = open_pair("close-no-reset-withdrawn");
        let mut request = Conf {
            baudrate: 19200,
            no_reset: true,
            ..Default::default()
        };
        port.configure_some(&request, ConfFlags::BAUDRATE | ConfFlags::NO_RESET)
            .unwrap();
        request.no_reset = false;
        port.configure_some(&request, ConfFlags::NO_RESET).unwrap();

        port.close().unwrap();
        assert_eq!(device.line(), VirtualControl::default());
        assert_eq!(device.hangups(), 1);
    }

    #[test]
    fn test_failed_configure_does_not_set_no_reset() {
        let (device, mut port) = open_pair("close-no-reset-failed");
        let request = Conf {
            databits: 9,
            no_reset: true,
            ..Default::default()
        };
        assert!(port
            .configure_some(&request, ConfFlags::DATABITS | ConfFlags::NO_RESET)
            .is_err());

        port.close().unwrap();
        assert_eq!(device.hangups(), 1, "close still resets");
    }

    #[test]
    fn test_operations_after_close() {
        let (_device, mut port) = open_pair("close-twice");
        port.close().unwrap();

        assert!(matches!(port.close(), Err(Error::AlreadyClosed)));
        assert!(matches!(port.conf(), Err(Error::AlreadyClosed)));
        assert!(matches!(port.read(&mut [0u8; 4]), Err(Error::AlreadyClosed)));
        assert!(matches!(port.write(b"x"), Err(Error::AlreadyClosed)));
        assert!(matches!(port.flush_input(), Err(Error::AlreadyClosed)));
        assert!(matches!(
            port.configure_some(&Conf::default(), ConfFlags::empty()),
            Err(Error::AlreadyClosed)
        ));
    }

    #[test]
    fn test_restore_failure_still_releases() {
        let (device, mut port) = open_pair("close-restore-fails");
        reconfigure(&mut port);
        device.reject_configs(true);

        let result = port.close();

        assert!(matches!(result, Err(Error::ApplyFailed(_))));
        assert!(!device.is_open());
        assert_eq!(device.hangups(), 1, "hang-up is still attempted");
        assert!(matches!(port.close(), Err(Error::AlreadyClosed)));
    }

    #[test]
    fn test_drop_closes() {
        let device = device("close-drop");
        {
            let mut port = device.open().unwrap();
            reconfigure(&mut port);
        }

        assert!(!device.is_open());
        assert_eq!(device.line(), VirtualControl::default());
        assert!(device.open().is_ok());
    }

    #[test]
    fn test_reopen_takes_fresh_snapshot() {
        let device = device_with("close-reopen", line_115200_7e2());
        device.open().unwrap().close().unwrap();

        device.set_line(VirtualControl {
            speed: LineSpeed::Code(13),
            ..line_115200_7e2()
        });
        let mut port = device.open().unwrap();
        assert_eq!(port.restore_snapshot().baudrate, 9600);
        port.close().unwrap();
    }
}
