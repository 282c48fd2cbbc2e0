//! USB type abstractions shared by the backend and the control plane

use protocol::Location;
use std::path::PathBuf;

/// Root of the usbdevfs control nodes
pub const DEVFS_ROOT: &str = "/dev/bus/usb";

/// One enumerated USB device
///
/// Only valid for the discovery pass that produced it: the OS reuses
/// addresses, so nothing here identifies a device across passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Bus number
    pub bus: u8,
    /// Device address on the bus
    pub address: u8,
    /// Hub ports from the root hub; empty for the root hub itself
    pub port_path: Vec<u8>,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Major USB revision (1, 2 or 3) from the high byte of bcdUSB
    pub usb_level: u8,
    /// Device class is hub
    pub is_hub: bool,
    /// Manufacturer string (if readable)
    pub manufacturer: Option<String>,
    /// Product string (if readable)
    pub product: Option<String>,
    /// Serial number string (if readable)
    pub serial_number: Option<String>,
}

impl Device {
    pub fn location(&self) -> Location {
        Location::new(self.bus, self.port_path.clone())
    }

    /// usbdevfs control node, `/dev/bus/usb/BBB/AAA`
    pub fn device_file(&self) -> PathBuf {
        PathBuf::from(DEVFS_ROOT)
            .join(format!("{:03}", self.bus))
            .join(format!("{:03}", self.address))
    }
}

/// A serial port as reported by the platform's serial port enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortEntry {
    /// Short device name, e.g. `ttyUSB0`
    pub name: String,
    /// Location string of the USB interface the port belongs to (`1-1.4:1.0`)
    pub location: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}
