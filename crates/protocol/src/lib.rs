//! Protocol library for usbwatch
//!
//! This crate defines the pieces of the USB hub class protocol that the
//! control plane speaks through a device's control node, plus the
//! hierarchical `bus-port.port` addressing used to name physical
//! attachment points. Nothing in here touches hardware: every type is a
//! plain value that can be built, encoded and decoded in isolation.
//!
//! # Example
//!
//! ```
//! use protocol::{ControlSetup, HubFeature, Location, PortStatus, RawPortStatus};
//!
//! // Parse an address as reported by sysfs
//! let location = Location::parse("1-1.4:1.0").unwrap();
//! assert_eq!(location.to_string(), "1-01.04");
//!
//! // Build the request that powers that port off on its parent hub
//! let port = location.port_number().unwrap();
//! let setup = ControlSetup::port_feature(port, HubFeature::Power, false);
//! assert_eq!(setup.index, 4);
//!
//! // Decode a GET_STATUS answer from a USB 2.0 hub
//! let raw = RawPortStatus::parse(&[0x03, 0x01, 0x00, 0x00]).unwrap();
//! assert_eq!(
//!     raw.flags(2),
//!     PortStatus::POWER | PortStatus::CONNECTION | PortStatus::ENABLE
//! );
//! ```

pub mod error;
pub mod hub;
pub mod location;
pub mod setup;

pub use error::{LocationError, ProtocolError, Result};
pub use hub::{HUB_DESCRIPTOR_LEN, HubDescriptor, HubFeature, PORT_STATUS_LEN, PortStatus, RawPortStatus};
pub use location::Location;
pub use setup::{
    ControlSetup, DEFAULT_TIMEOUT, USB_CLASS_HUB, USB_DIR_IN, USB_DIR_OUT, USB_DT_HUB,
    USB_DT_SUPERSPEED_HUB, USB_RECIP_DEVICE, USB_RECIP_OTHER, USB_REQ_CLEAR_FEATURE,
    USB_REQ_GET_DESCRIPTOR, USB_REQ_GET_STATUS, USB_REQ_SET_FEATURE, USB_TYPE_CLASS,
    hub_descriptor_type,
};
