//! Serial port discovery
//!
//! `serialport` lists the ttys and their USB identity; the interface
//! location (`1-1.2:1.0`) comes from the tty's sysfs device link.

use common::SerialPortEntry;
use serialport::SerialPortType;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SYSFS_TTY_CLASS: &str = "/sys/class/tty";

/// Serial ports known to the OS, in enumeration order
pub fn available_serial_ports() -> Vec<SerialPortEntry> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Serial port enumeration failed: {}", e);
            return Vec::new();
        }
    };

    ports
        .into_iter()
        .map(|port| {
            let name = tty_name(&port.port_name);
            let (vendor_id, product_id) = match &port.port_type {
                SerialPortType::UsbPort(info) => (Some(info.vid), Some(info.pid)),
                _ => (None, None),
            };
            let location = vendor_id
                .and_then(|_| usb_interface_location(Path::new(SYSFS_TTY_CLASS), &name));
            debug!("Serial port {} at {:?}", name, location);

            SerialPortEntry {
                name,
                location,
                vendor_id,
                product_id,
            }
        })
        .collect()
}

/// `/dev/ttyUSB0` -> `ttyUSB0`
fn tty_name(port_name: &str) -> String {
    port_name
        .rsplit('/')
        .next()
        .unwrap_or(port_name)
        .to_string()
}

/// Location of the USB interface behind tty `name`
///
/// usb-serial ttys hang one level below the interface, cdc-acm ttys
/// directly on it.
fn usb_interface_location(class_root: &Path, name: &str) -> Option<String> {
    let device = fs::canonicalize(class_root.join(name).join("device")).ok()?;

    let interface: PathBuf = match subsystem(&device)?.as_str() {
        "usb-serial" => device.parent()?.to_path_buf(),
        "usb" => device,
        _ => return None,
    };

    interface
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

fn subsystem(dir: &Path) -> Option<String> {
    let link = fs::read_link(dir.join("subsystem")).ok()?;
    link.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}
