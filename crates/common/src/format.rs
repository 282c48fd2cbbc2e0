//! Human-readable port listing
//!
//! One line per non-hub port, in location order:
//!
//! ```text
//! 1-01.02       [PCE] 0403:6001 ttyUSB0 - FTDI FT232R USB UART (A50285BI)
//! 1-01.03       [P]
//! ```

use crate::topology::{Port, PortTable};

const ADDRESS_WIDTH: usize = 13;
const STATUS_WIDTH: usize = 5;

/// Render every non-hub port of `table`
///
/// Hubs are left out of the listing; they stay addressable for control
/// requests.
pub fn render_ports(table: &PortTable) -> Vec<String> {
    table
        .iter()
        .filter(|port| !port.is_hub())
        .map(format_line)
        .collect()
}

fn format_line(port: &Port) -> String {
    let status = format!(
        "[{}]",
        port.status.map(|s| s.to_string()).unwrap_or_default()
    );
    let ids = port
        .device
        .as_ref()
        .map(|d| format!("{:04x}:{:04x}", d.vendor_id, d.product_id))
        .unwrap_or_default();

    let line = format!(
        "{:<aw$} {:<sw$} {} {}",
        port.location.to_string(),
        status,
        ids,
        describe_port(port),
        aw = ADDRESS_WIDTH,
        sw = STATUS_WIDTH
    );
    line.trim_end().to_string()
}

/// Label of a port: `[serial - ][manufacturer ]product[ (serial number)]`
///
/// A port without a device has an empty label; a device without a readable
/// product string shows `?`.
pub fn describe_port(port: &Port) -> String {
    let mut label = match &port.device {
        None => String::new(),
        Some(device) => {
            let mut label = non_empty(&device.product).unwrap_or("?").to_string();
            if let Some(serial_number) = non_empty(&device.serial_number) {
                label = format!("{} ({})", label, serial_number);
            }
            if let Some(manufacturer) = non_empty(&device.manufacturer) {
                label = format!("{} {}", manufacturer, label);
            }
            label
        }
    };

    if let Some(name) = port.serial_name() {
        label = format!("{} - {}", name, label);
    }
    label
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockHost, create_mock_device, create_mock_hub};
    use crate::topology::TopologyBuilder;
    use protocol::{Location, PortStatus};

    #[test]
    fn test_full_line() {
        let mut device = create_mock_device(1, 4, &[1, 2]);
        device.vendor_id = 0x0403;
        device.product_id = 0x6001;
        device.manufacturer = Some("FTDI".to_string());
        device.product = Some("FT232R USB UART".to_string());
        device.serial_number = Some("A50285BI".to_string());

        let mut table = PortTable::from_devices(vec![device]);
        let location = Location::new(1, [1, 2]);
        let port = table.get_mut(&location).unwrap();
        port.status = Some(PortStatus::POWER | PortStatus::CONNECTION | PortStatus::ENABLE);
        port.serial_ports.push("ttyUSB0".to_string());

        assert_eq!(
            render_ports(&table),
            vec!["1-01.02       [PCE] 0403:6001 ttyUSB0 - FTDI FT232R USB UART (A50285BI)"]
        );
    }

    #[test]
    fn test_missing_product_shows_question_mark() {
        let mut device = create_mock_device(2, 9, &[3]);
        device.serial_number = Some("123".to_string());
        let port = PortTable::from_devices(vec![device]);

        assert_eq!(describe_port(port.iter().next().unwrap()), "? (123)");
    }

    #[test]
    fn test_padded_strings_are_trimmed() {
        let mut device = create_mock_device(1, 4, &[2]);
        device.manufacturer = Some("FTDI ".to_string());
        device.product = Some(" FT232R USB UART  ".to_string());
        device.serial_number = Some("   ".to_string());
        let port = PortTable::from_devices(vec![device]);

        assert_eq!(describe_port(port.iter().next().unwrap()), "FTDI FT232R USB UART");
    }

    #[test]
    fn test_ghost_port_has_no_ids_or_label() {
        let host = MockHost::new().with_hub(create_mock_hub(1, 1, &[], 2), &[0x0100]);
        let table = TopologyBuilder::new(&host).build().unwrap();

        assert_eq!(render_ports(&table), vec!["1-01          [P]"]);
    }

    #[test]
    fn test_unknown_status_renders_empty_brackets() {
        let table = PortTable::from_devices(vec![create_mock_device(1, 2, &[1])]);
        assert_eq!(render_ports(&table), vec!["1-01          []    1234:5678 ?"]);
    }

    #[test]
    fn test_lines_follow_location_order_and_skip_hubs() {
        let host = MockHost::new()
            .with_hub(create_mock_hub(1, 1, &[], 2), &[0x0103, 0x0100])
            .with_hub(create_mock_hub(1, 2, &[1], 2), &[0x0100])
            .with_device(create_mock_device(1, 3, &[1, 1]))
            .with_hub(create_mock_hub(2, 1, &[], 2), &[0x0100])
            .with_device(create_mock_device(2, 2, &[1]));

        let table = TopologyBuilder::new(&host).build().unwrap();
        let addresses: Vec<String> = render_ports(&table)
            .iter()
            .map(|line| line.split_whitespace().next().unwrap().to_string())
            .collect();

        assert_eq!(addresses, vec!["1-01.01", "1-02", "2-01"]);
    }
}
