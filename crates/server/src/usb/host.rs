//! Linux USB host
//!
//! Ties libusb enumeration, usbdevfs control nodes and tty discovery
//! together behind [`UsbHost`].

use crate::usb::control::UsbDevFsChannel;
use crate::usb::device::DeviceEnumerator;
use crate::usb::serial::available_serial_ports;
use common::{Device, Error, HardwareError, Result, SerialPortEntry, UsbHost};
use std::time::Duration;

pub struct LinuxUsbHost {
    enumerator: DeviceEnumerator,
    control_timeout: Duration,
}

impl LinuxUsbHost {
    pub fn new(control_timeout: Duration) -> Result<Self> {
        let enumerator = DeviceEnumerator::new()
            .map_err(|e| Error::Enumeration(format!("cannot initialize libusb: {}", e)))?;
        Ok(Self {
            enumerator,
            control_timeout,
        })
    }
}

impl UsbHost for LinuxUsbHost {
    type Channel = UsbDevFsChannel;

    fn enumerate(&self) -> Result<Vec<Device>> {
        self.enumerator
            .enumerate()
            .map_err(|e| Error::Enumeration(e.to_string()))
    }

    fn open(&self, device: &Device) -> std::result::Result<UsbDevFsChannel, HardwareError> {
        UsbDevFsChannel::open(device, self.control_timeout)
    }

    fn serial_ports(&self) -> Vec<SerialPortEntry> {
        available_serial_ports()
    }
}
