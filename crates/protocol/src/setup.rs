//! Control request setup construction
//!
//! Every hub operation is a control transfer on endpoint 0. The setup
//! stage carries five fields (request type, request, value, index,
//! length); this module builds the ones the hub class needs.

use crate::hub::{HUB_DESCRIPTOR_LEN, HubFeature, PORT_STATUS_LEN};
use byteorder::{ByteOrder, LittleEndian};
use std::time::Duration;

/// Default bound on every control request (5 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Device class code of hubs
pub const USB_CLASS_HUB: u8 = 0x09;

// bmRequestType fields
pub const USB_DIR_OUT: u8 = 0x00;
pub const USB_DIR_IN: u8 = 0x80;
pub const USB_TYPE_CLASS: u8 = 0x20;
pub const USB_RECIP_DEVICE: u8 = 0x00;
pub const USB_RECIP_OTHER: u8 = 0x03;

// bRequest codes
pub const USB_REQ_GET_STATUS: u8 = 0x00;
pub const USB_REQ_CLEAR_FEATURE: u8 = 0x01;
pub const USB_REQ_SET_FEATURE: u8 = 0x03;
pub const USB_REQ_GET_DESCRIPTOR: u8 = 0x06;

// Hub descriptor types
pub const USB_DT_HUB: u8 = 0x29;
pub const USB_DT_SUPERSPEED_HUB: u8 = 0x2a;

/// Hub descriptor type to request from a hub of the given USB level
///
/// SuperSpeed hubs only answer for their own descriptor type.
pub fn hub_descriptor_type(usb_level: u8) -> u8 {
    if usb_level >= 3 {
        USB_DT_SUPERSPEED_HUB
    } else {
        USB_DT_HUB
    }
}

/// Setup stage of a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlSetup {
    /// bmRequestType
    pub request_type: u8,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
    /// wLength, also the size of the data stage
    pub length: u16,
}

impl ControlSetup {
    /// Class GET_DESCRIPTOR for the hub descriptor
    pub fn get_hub_descriptor(usb_level: u8) -> Self {
        Self {
            request_type: USB_DIR_IN | USB_TYPE_CLASS | USB_RECIP_DEVICE,
            request: USB_REQ_GET_DESCRIPTOR,
            value: u16::from(hub_descriptor_type(usb_level)) << 8,
            index: 0,
            length: HUB_DESCRIPTOR_LEN as u16,
        }
    }

    /// Class GET_STATUS addressed to one hub port
    pub fn get_port_status(port: u8) -> Self {
        Self {
            request_type: USB_DIR_IN | USB_TYPE_CLASS | USB_RECIP_OTHER,
            request: USB_REQ_GET_STATUS,
            value: 0,
            index: u16::from(port),
            length: PORT_STATUS_LEN as u16,
        }
    }

    /// Class SET_FEATURE (`enable`) or CLEAR_FEATURE addressed to one hub port
    pub fn port_feature(port: u8, feature: HubFeature, enable: bool) -> Self {
        Self {
            request_type: USB_DIR_OUT | USB_TYPE_CLASS | USB_RECIP_OTHER,
            request: if enable {
                USB_REQ_SET_FEATURE
            } else {
                USB_REQ_CLEAR_FEATURE
            },
            value: feature.value(),
            index: u16::from(port),
            length: 0,
        }
    }

    /// True when the data stage flows from device to host
    pub fn is_device_to_host(&self) -> bool {
        self.request_type & USB_DIR_IN != 0
    }

    /// The 8-byte SETUP packet as it appears on the wire
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0] = self.request_type;
        bytes[1] = self.request;
        LittleEndian::write_u16(&mut bytes[2..4], self.value);
        LittleEndian::write_u16(&mut bytes[4..6], self.index);
        LittleEndian::write_u16(&mut bytes[6..8], self.length);
        bytes
    }
}
