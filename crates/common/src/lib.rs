//! Common utilities for usbwatch
//!
//! This crate holds the host-independent USB topology and control plane:
//! the [`UsbHost`] / [`ControlChannel`] seams a platform backend implements,
//! the hub operations issued through a control channel, topology building,
//! serial port matching, listing rendering, and the async bridge used by
//! the servers to funnel every hardware request through one worker thread.

pub mod channel;
pub mod comports;
pub mod control;
pub mod error;
pub mod format;
pub mod host;
pub mod logging;
pub mod test_utils;
pub mod topology;
pub mod usb_types;
pub mod watch;

pub use channel::{CommandResult, UsbBridge, UsbCommand, UsbWorker, create_usb_bridge};
pub use comports::match_serial_ports;
pub use error::{Error, HardwareError, Result};
pub use format::{describe_port, render_ports};
pub use host::{ControlChannel, UsbHost};
pub use logging::setup_logging;
pub use topology::{Port, PortTable, TopologyBuilder};
pub use usb_types::{DEVFS_ROOT, Device, SerialPortEntry};
pub use watch::{PortCommand, UsbWatch};
