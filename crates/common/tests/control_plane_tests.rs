//! Control Plane Integration Tests
//!
//! Exercises topology building, serial matching, listing and port control
//! end to end against a scripted host.
//!
//! Run with: `cargo test -p common --test control_plane_tests`

use common::test_utils::{
    MockHost, MockRequest, create_mock_device, create_mock_hub, create_serial_port,
};
use common::{Error, HardwareError, PortCommand, TopologyBuilder, UsbWatch};
use protocol::{HubFeature, Location, PortStatus, USB_REQ_GET_STATUS};

const POWERED: u16 = 0x0100;
const ACTIVE: u16 = 0x0103;
const SS_POWERED: u16 = 0x0200;
const SS_ACTIVE: u16 = 0x0203;

/// Two buses: a USB 2.0 root with an external 4-port hub on port 1, and a
/// USB 3.0 root with a device on port 2
fn lab_host() -> MockHost {
    let mut ftdi = create_mock_device(1, 4, &[1, 2]);
    ftdi.vendor_id = 0x0403;
    ftdi.product_id = 0x6001;
    ftdi.manufacturer = Some("FTDI".to_string());
    ftdi.product = Some("FT232R USB UART".to_string());
    ftdi.serial_number = Some("A50285BI".to_string());

    let mut disk = create_mock_device(2, 2, &[2]);
    disk.usb_level = 3;
    disk.product = Some("Disk".to_string());

    MockHost::new()
        .with_hub(create_mock_hub(1, 1, &[], 2), &[ACTIVE, POWERED])
        .with_hub(
            create_mock_hub(1, 3, &[1], 2),
            &[POWERED, ACTIVE, POWERED, POWERED],
        )
        .with_device(ftdi)
        .with_hub(create_mock_hub(2, 1, &[], 3), &[SS_POWERED, SS_ACTIVE])
        .with_device(disk)
        .with_serial_port(create_serial_port("ttyUSB0", "1-1.2:1.0"))
}

mod topology {
    use super::*;

    #[test]
    fn test_hub_with_one_occupied_port_has_three_ghosts() {
        let host = lab_host();
        let table = TopologyBuilder::new(&host).build().unwrap();
        let hub = Location::new(1, [1]);

        let children: Vec<_> = table.children(&hub).collect();
        assert_eq!(children.len(), 4);
        assert_eq!(children.iter().filter(|p| p.is_ghost()).count(), 3);
    }

    #[test]
    fn test_successive_builds_are_identical() {
        let host = lab_host();
        let first = TopologyBuilder::new(&host).build().unwrap();
        let second = TopologyBuilder::new(&host).build().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_superspeed_power_bit() {
        let host = lab_host();
        let table = TopologyBuilder::new(&host).build().unwrap();

        let ghost = table.get(&Location::new(2, [1])).unwrap();
        assert_eq!(ghost.status, Some(PortStatus::POWER));
        let disk = table.get(&Location::new(2, [2])).unwrap();
        assert_eq!(
            disk.status,
            Some(PortStatus::POWER | PortStatus::CONNECTION | PortStatus::ENABLE)
        );
    }

    #[test]
    fn test_port_status_read_per_hub_port() {
        let host = lab_host();
        TopologyBuilder::new(&host).build().unwrap();

        let status_reads = host
            .requests()
            .into_iter()
            .filter(|r| matches!(r, MockRequest::ControlIn { setup, .. } if setup.request == USB_REQ_GET_STATUS))
            .count();
        assert_eq!(status_reads, 2 + 4 + 2);
    }

    #[test]
    fn test_enumeration_failure_aborts_build() {
        let host = MockHost::new().with_enumeration_error("no usb subsystem");
        let err = TopologyBuilder::new(&host).build().unwrap_err();
        assert!(matches!(err, Error::Enumeration(_)));
    }

    #[test]
    fn test_timing_out_hub_is_isolated() {
        let host = lab_host().with_timeouts(Location::new(1, [1]));
        let table = TopologyBuilder::new(&host).build().unwrap();

        assert_eq!(table.children(&Location::new(1, [1])).count(), 1);
        assert_eq!(table.children(&Location::root(2)).count(), 2);
    }
}

mod listing {
    use super::*;

    #[test]
    fn test_listing_follows_location_order() {
        let lines = UsbWatch::new(lab_host()).list().unwrap();
        let addresses: Vec<&str> = lines
            .iter()
            .map(|line| line.split_whitespace().next().unwrap())
            .collect();

        assert_eq!(
            addresses,
            vec!["1-01.01", "1-01.02", "1-01.03", "1-01.04", "1-02", "2-01", "2-02"]
        );
    }

    #[test]
    fn test_listing_lines() {
        let lines = UsbWatch::new(lab_host()).list().unwrap();
        assert_eq!(
            lines[1],
            "1-01.02       [PCE] 0403:6001 ttyUSB0 - FTDI FT232R USB UART (A50285BI)"
        );
        assert_eq!(lines[4], "1-02          [P]");
        assert_eq!(lines[6], "2-02          [PCE] 1234:5678 Disk");
    }
}

mod control {
    use super::*;

    #[test]
    fn test_every_command_reaches_the_hub() {
        for command in PortCommand::ALL {
            let watch = UsbWatch::new(lab_host());
            watch.execute(command, "1-1.2").unwrap();

            let actions = watch.host().control_actions();
            assert_eq!(actions.len(), 1, "{} issued {:?}", command, actions);
            match command.hub_feature() {
                None => assert_eq!(actions[0], MockRequest::Reset(Location::new(1, [1, 2]))),
                Some((feature, _)) => assert!(matches!(
                    &actions[0],
                    MockRequest::ControlOut { target, setup }
                        if *target == Location::new(1, [1])
                            && setup.value == feature.value()
                            && setup.index == 2
                )),
            }
        }
    }

    #[test]
    fn test_set_feature_on_absent_location_opens_nothing() {
        let watch = UsbWatch::new(lab_host());
        watch.host().clear_requests();

        let err = watch
            .set_feature("1-1.9", HubFeature::Power, false)
            .unwrap_err();
        assert!(err.is_location_error());
        assert!(
            !watch
                .host()
                .requests()
                .iter()
                .any(|r| matches!(r, MockRequest::ControlOut { .. }))
        );
    }

    #[test]
    fn test_timeout_is_reported_not_retried() {
        let watch = UsbWatch::new(lab_host().with_timeouts(Location::new(1, [1])));
        let err = watch.execute(PortCommand::Off, "1-1.2").unwrap_err();

        assert!(matches!(
            err,
            Error::Hardware(HardwareError::Timeout { .. })
        ));
        assert_eq!(watch.host().control_actions().len(), 1);
    }

    #[test]
    fn test_reset_without_enumerated_hub() {
        let host = MockHost::new().with_device(create_mock_device(3, 2, &[4, 1]));
        let err = UsbWatch::new(host).soft_reset("3-4.1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot talk to the hub of 3-04.01, usb hub never enumerated"
        );
    }
}
