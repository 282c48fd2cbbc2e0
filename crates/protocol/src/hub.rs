//! Hub class payloads
//!
//! Layouts follow USB 2.0 section 11.23/11.24 and USB 3.0 section 10.13/10.16.
//! All multi-byte fields are little-endian and are extracted field by field.

use crate::error::{ProtocolError, Result};
use crate::setup::{USB_DT_HUB, USB_DT_SUPERSPEED_HUB};
use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

/// Bytes requested for a hub descriptor (the fixed part, without port bitmaps)
pub const HUB_DESCRIPTOR_LEN: usize = 7;

/// Bytes of a GET_STATUS answer: wPortStatus then wPortChange
pub const PORT_STATUS_LEN: usize = 4;

// wPortStatus bits
const PORT_STAT_CONNECTION: u16 = 0x0001;
const PORT_STAT_ENABLE: u16 = 0x0002;
const PORT_STAT_SUSPEND: u16 = 0x0004;
const PORT_STAT_RESET: u16 = 0x0010;
const PORT_STAT_POWER: u16 = 0x0100;
// USB 3.0 moves the power bit up by one
const PORT_STAT_POWER_SS: u16 = 0x0200;

/// Fixed part of a hub class descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubDescriptor {
    /// bDescriptorType, 0x29 or 0x2a
    pub descriptor_type: u8,
    /// bNbrPorts
    pub port_count: u8,
    /// wHubCharacteristics (power switching, over-current mode)
    pub characteristics: u16,
    /// bPwrOn2PwrGood, in units of 2 ms
    pub power_on_to_good: u8,
    /// bHubContrCurrent, in mA
    pub controller_current: u8,
}

impl HubDescriptor {
    /// Decode a hub descriptor answer
    ///
    /// Only the header and port count are mandatory; hubs that answer with a
    /// truncated descriptor leave the trailing fields at zero.
    pub fn parse(bytes: &[u8], expected_type: u8) -> Result<Self> {
        if bytes.len() < 3 {
            return Err(ProtocolError::ShortPayload {
                needed: 3,
                actual: bytes.len(),
            });
        }

        let descriptor_type = bytes[1];
        if descriptor_type != expected_type
            || !matches!(descriptor_type, USB_DT_HUB | USB_DT_SUPERSPEED_HUB)
        {
            return Err(ProtocolError::UnexpectedDescriptor {
                expected: expected_type,
                actual: descriptor_type,
            });
        }

        let characteristics = bytes
            .get(3..5)
            .map(LittleEndian::read_u16)
            .unwrap_or_default();

        Ok(Self {
            descriptor_type,
            port_count: bytes[2],
            characteristics,
            power_on_to_good: bytes.get(5).copied().unwrap_or_default(),
            controller_current: bytes.get(6).copied().unwrap_or_default(),
        })
    }

    /// Encode the fixed part, as a hub would send it
    pub fn to_bytes(&self) -> [u8; HUB_DESCRIPTOR_LEN] {
        let mut bytes = [0u8; HUB_DESCRIPTOR_LEN];
        bytes[0] = HUB_DESCRIPTOR_LEN as u8;
        bytes[1] = self.descriptor_type;
        bytes[2] = self.port_count;
        LittleEndian::write_u16(&mut bytes[3..5], self.characteristics);
        bytes[5] = self.power_on_to_good;
        bytes[6] = self.controller_current;
        bytes
    }
}

bitflags! {
    /// Decoded hub port status
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PortStatus: u8 {
        const POWER = 1 << 0;
        const CONNECTION = 1 << 1;
        const ENABLE = 1 << 2;
        const RESET = 1 << 3;
        const SUSPEND = 1 << 4;
    }
}

impl PortStatus {
    /// Decode the wPortStatus word of a hub at `usb_level`
    pub fn from_status_word(word: u16, usb_level: u8) -> Self {
        let power_bit = if usb_level >= 3 {
            PORT_STAT_POWER_SS
        } else {
            PORT_STAT_POWER
        };

        let mut status = Self::empty();
        status.set(Self::POWER, word & power_bit != 0);
        status.set(Self::CONNECTION, word & PORT_STAT_CONNECTION != 0);
        status.set(Self::ENABLE, word & PORT_STAT_ENABLE != 0);
        status.set(Self::RESET, word & PORT_STAT_RESET != 0);
        status.set(Self::SUSPEND, word & PORT_STAT_SUSPEND != 0);
        status
    }
}

/// One letter per flag, in `P C E R S` order
impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LETTERS: [(PortStatus, char); 5] = [
            (PortStatus::POWER, 'P'),
            (PortStatus::CONNECTION, 'C'),
            (PortStatus::ENABLE, 'E'),
            (PortStatus::RESET, 'R'),
            (PortStatus::SUSPEND, 'S'),
        ];
        for (flag, letter) in LETTERS {
            if self.contains(flag) {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

/// Raw GET_STATUS answer for one hub port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPortStatus {
    /// wPortStatus
    pub status: u16,
    /// wPortChange
    pub change: u16,
}

impl RawPortStatus {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PORT_STATUS_LEN {
            return Err(ProtocolError::ShortPayload {
                needed: PORT_STATUS_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            status: LittleEndian::read_u16(&bytes[0..2]),
            change: LittleEndian::read_u16(&bytes[2..4]),
        })
    }

    pub fn to_bytes(&self) -> [u8; PORT_STATUS_LEN] {
        let mut bytes = [0u8; PORT_STATUS_LEN];
        LittleEndian::write_u16(&mut bytes[0..2], self.status);
        LittleEndian::write_u16(&mut bytes[2..4], self.change);
        bytes
    }

    /// Status flags as seen by a hub at `usb_level`
    pub fn flags(&self, usb_level: u8) -> PortStatus {
        PortStatus::from_status_word(self.status, usb_level)
    }
}

/// Settable hub port feature selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubFeature {
    /// PORT_ENABLE; only clearing is meaningful
    Enable,
    /// PORT_RESET
    Reset,
    /// PORT_POWER
    Power,
}

impl HubFeature {
    /// wValue selector
    pub fn value(self) -> u16 {
        match self {
            HubFeature::Enable => 1,
            HubFeature::Reset => 4,
            HubFeature::Power => 8,
        }
    }
}

impl fmt::Display for HubFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HubFeature::Enable => "PORT_ENABLE",
            HubFeature::Reset => "PORT_RESET",
            HubFeature::Power => "PORT_POWER",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usb2_hub_descriptor() {
        let bytes = [0x09, 0x29, 0x04, 0xe0, 0x00, 0x32, 0x64];
        let descriptor = HubDescriptor::parse(&bytes, USB_DT_HUB).unwrap();
        assert_eq!(descriptor.port_count, 4);
        assert_eq!(descriptor.characteristics, 0x00e0);
        assert_eq!(descriptor.power_on_to_good, 0x32);
        assert_eq!(descriptor.controller_current, 0x64);
    }

    #[test]
    fn test_parse_truncated_descriptor() {
        let descriptor = HubDescriptor::parse(&[0x0c, 0x2a, 0x02], USB_DT_SUPERSPEED_HUB).unwrap();
        assert_eq!(descriptor.port_count, 2);
        assert_eq!(descriptor.characteristics, 0);

        assert_eq!(
            HubDescriptor::parse(&[0x09, 0x29], USB_DT_HUB),
            Err(ProtocolError::ShortPayload {
                needed: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_parse_rejects_other_descriptor_types() {
        let bytes = [0x12, 0x01, 0x00, 0x02, 0x09, 0x00, 0x01];
        assert!(matches!(
            HubDescriptor::parse(&bytes, USB_DT_HUB),
            Err(ProtocolError::UnexpectedDescriptor { actual: 0x01, .. })
        ));

        // a USB 2.0 descriptor is not what a SuperSpeed request asked for
        let bytes = [0x09, 0x29, 0x04, 0x00, 0x00, 0x00, 0x00];
        assert!(HubDescriptor::parse(&bytes, USB_DT_SUPERSPEED_HUB).is_err());
    }

    #[test]
    fn test_descriptor_encoding_matches_layout() {
        let descriptor = HubDescriptor {
            descriptor_type: USB_DT_HUB,
            port_count: 7,
            characteristics: 0x0109,
            power_on_to_good: 50,
            controller_current: 100,
        };
        assert_eq!(descriptor.to_bytes(), [7, 0x29, 7, 0x09, 0x01, 50, 100]);
    }

    #[test]
    fn test_usb2_status_decoding() {
        let raw = RawPortStatus::parse(&[0x03, 0x01, 0x00, 0x00]).unwrap();
        assert_eq!(raw.status, 0x0103);
        assert_eq!(
            raw.flags(2),
            PortStatus::POWER | PortStatus::CONNECTION | PortStatus::ENABLE
        );
    }

    #[test]
    fn test_usb3_power_bit_moves() {
        let flags = PortStatus::from_status_word(0x0201, 3);
        assert!(flags.contains(PortStatus::POWER));

        // bit 8 is not power on a SuperSpeed hub
        assert!(!PortStatus::from_status_word(0x0100, 3).contains(PortStatus::POWER));
        // and bit 9 is not power below USB 3
        assert!(!PortStatus::from_status_word(0x0200, 2).contains(PortStatus::POWER));
        assert!(PortStatus::from_status_word(0x0100, 1).contains(PortStatus::POWER));
    }

    #[test]
    fn test_reset_and_suspend_bits() {
        let flags = PortStatus::from_status_word(0x0014, 2);
        assert_eq!(flags, PortStatus::RESET | PortStatus::SUSPEND);
    }

    #[test]
    fn test_status_change_word_is_kept() {
        let raw = RawPortStatus::parse(&[0x01, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(raw.change, 0x0001);
        assert_eq!(raw.to_bytes(), [0x01, 0x00, 0x01, 0x00]);
        assert!(RawPortStatus::parse(&[0x01, 0x00]).is_err());
    }

    #[test]
    fn test_status_letters() {
        assert_eq!(PortStatus::all().to_string(), "PCERS");
        assert_eq!((PortStatus::SUSPEND | PortStatus::POWER).to_string(), "PS");
        assert_eq!(PortStatus::empty().to_string(), "");
    }

    #[test]
    fn test_feature_selectors() {
        assert_eq!(HubFeature::Enable.value(), 1);
        assert_eq!(HubFeature::Reset.value(), 4);
        assert_eq!(HubFeature::Power.value(), 8);
        assert_eq!(HubFeature::Power.to_string(), "PORT_POWER");
    }
}
