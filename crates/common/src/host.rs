//! Platform seams
//!
//! The control plane never touches the OS directly. A backend provides
//! device enumeration, serial port enumeration, and a way to open a
//! device's control node; everything else is built on top of these.

use crate::error::{HardwareError, Result};
use crate::usb_types::{Device, SerialPortEntry};
use protocol::ControlSetup;

/// An open control node of one device
///
/// Dropping the channel closes the node, so a channel is only kept for
/// the duration of one operation.
pub trait ControlChannel {
    /// Bus reset of the device itself, no payload
    fn reset(&mut self) -> std::result::Result<(), HardwareError>;

    /// Control transfer with a device-to-host data stage of up to `buf.len()` bytes
    ///
    /// Returns the number of bytes the device actually sent.
    fn control_in(
        &mut self,
        setup: ControlSetup,
        buf: &mut [u8],
    ) -> std::result::Result<usize, HardwareError>;

    /// Control transfer without a data stage
    fn control_out(&mut self, setup: ControlSetup) -> std::result::Result<(), HardwareError>;
}

/// A USB host controller stack
pub trait UsbHost {
    type Channel: ControlChannel;

    /// List every device currently attached
    fn enumerate(&self) -> Result<Vec<Device>>;

    /// Open the control node of `device` for reading and writing
    fn open(&self, device: &Device) -> std::result::Result<Self::Channel, HardwareError>;

    /// Serial ports known to the OS, in enumeration order
    fn serial_ports(&self) -> Vec<SerialPortEntry>;
}
