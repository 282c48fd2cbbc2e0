//! USB subsystem
//!
//! Linux backend for the control plane:
//! - Device enumeration through libusb
//! - Control transfers and resets through usbdevfs
//! - tty discovery for serial port matching
//!
//! All of it is owned by one dedicated worker thread so the Tokio runtime
//! never blocks on hardware.

pub mod control;
pub mod device;
pub mod host;
pub mod serial;
pub mod worker;

pub use host::LinuxUsbHost;
pub use worker::spawn_usb_worker;
