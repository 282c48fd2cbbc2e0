//! Hub class operations over a control channel
//!
//! These are the four requests the control plane issues: device reset,
//! hub descriptor read, port status read, and port feature set/clear.
//! None of them retries; after a timeout the caller must re-read state
//! before assuming anything about the port.

use crate::error::HardwareError;
use crate::host::ControlChannel;
use protocol::{
    ControlSetup, HUB_DESCRIPTOR_LEN, HubDescriptor, HubFeature, PORT_STATUS_LEN, PortStatus,
    RawPortStatus, hub_descriptor_type,
};
use tracing::{debug, warn};

/// Bus-reset the device behind `channel`
///
/// Returns as soon as the request is accepted; the link renegotiates
/// asynchronously afterwards.
pub fn reset_device<C: ControlChannel>(channel: &mut C) -> Result<(), HardwareError> {
    channel.reset()
}

/// Read the hub descriptor, or `None` if the device cannot be expanded
///
/// Any failure means "not expandable" to the caller. The reason is only
/// logged: a rejected request usually means the device is not a hub,
/// while a timeout or disconnect points at a misbehaving one.
pub fn read_hub_descriptor<C: ControlChannel>(
    channel: &mut C,
    usb_level: u8,
) -> Option<HubDescriptor> {
    match try_read_hub_descriptor(channel, usb_level) {
        Ok(descriptor) => Some(descriptor),
        Err(e) if e.is_transient() => {
            warn!("Hub descriptor read failed: {}", e);
            None
        }
        Err(e) => {
            debug!("Hub descriptor not available: {}", e);
            None
        }
    }
}

fn try_read_hub_descriptor<C: ControlChannel>(
    channel: &mut C,
    usb_level: u8,
) -> Result<HubDescriptor, HardwareError> {
    let mut buf = [0u8; HUB_DESCRIPTOR_LEN];
    let received = channel.control_in(ControlSetup::get_hub_descriptor(usb_level), &mut buf)?;
    let descriptor = HubDescriptor::parse(&buf[..received], hub_descriptor_type(usb_level))?;
    Ok(descriptor)
}

/// Read the status of hub port `port` (1-based)
pub fn read_port_status<C: ControlChannel>(
    channel: &mut C,
    port: u8,
    usb_level: u8,
) -> Result<PortStatus, HardwareError> {
    let mut buf = [0u8; PORT_STATUS_LEN];
    let received = channel.control_in(ControlSetup::get_port_status(port), &mut buf)?;
    let raw = RawPortStatus::parse(&buf[..received])?;
    Ok(raw.flags(usb_level))
}

/// SET_FEATURE (`enable`) or CLEAR_FEATURE on hub port `port`
pub fn set_port_feature<C: ControlChannel>(
    channel: &mut C,
    port: u8,
    feature: HubFeature,
    enable: bool,
) -> Result<(), HardwareError> {
    debug!(
        "{} {} on port {}",
        if enable { "SET_FEATURE" } else { "CLEAR_FEATURE" },
        feature,
        port
    );
    channel.control_out(ControlSetup::port_feature(port, feature, enable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{USB_DT_SUPERSPEED_HUB, USB_REQ_CLEAR_FEATURE};

    /// Channel answering every IN request with a fixed payload
    struct ScriptedChannel {
        answer: Result<Vec<u8>, fn() -> HardwareError>,
        sent: Vec<ControlSetup>,
    }

    impl ScriptedChannel {
        fn answering(bytes: &[u8]) -> Self {
            Self {
                answer: Ok(bytes.to_vec()),
                sent: Vec::new(),
            }
        }

        fn failing(error: fn() -> HardwareError) -> Self {
            Self {
                answer: Err(error),
                sent: Vec::new(),
            }
        }
    }

    impl ControlChannel for ScriptedChannel {
        fn reset(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }

        fn control_in(
            &mut self,
            setup: ControlSetup,
            buf: &mut [u8],
        ) -> Result<usize, HardwareError> {
            self.sent.push(setup);
            let bytes = self.answer.as_ref().map_err(|make| make())?;
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
            Ok(n)
        }

        fn control_out(&mut self, setup: ControlSetup) -> Result<(), HardwareError> {
            self.sent.push(setup);
            Ok(())
        }
    }

    #[test]
    fn test_read_hub_descriptor() {
        let mut channel = ScriptedChannel::answering(&[0x09, 0x29, 0x04, 0x00, 0x00, 0x32, 0x64]);
        let descriptor = read_hub_descriptor(&mut channel, 2).unwrap();
        assert_eq!(descriptor.port_count, 4);
        assert_eq!(channel.sent[0].value, 0x2900);
    }

    #[test]
    fn test_superspeed_hub_descriptor_type() {
        let mut channel = ScriptedChannel::answering(&[0x0c, USB_DT_SUPERSPEED_HUB, 0x02]);
        let descriptor = read_hub_descriptor(&mut channel, 3).unwrap();
        assert_eq!(descriptor.port_count, 2);
        assert_eq!(channel.sent[0].value, 0x2a00);
    }

    #[test]
    fn test_hub_descriptor_failures_are_not_expandable() {
        let mut rejected = ScriptedChannel::failing(|| HardwareError::Rejected {
            operation: "GET_DESCRIPTOR",
            source: std::io::Error::from_raw_os_error(32),
        });
        assert!(read_hub_descriptor(&mut rejected, 2).is_none());

        let mut timed_out = ScriptedChannel::failing(|| HardwareError::Timeout {
            operation: "GET_DESCRIPTOR",
            timeout_ms: 5000,
        });
        assert!(read_hub_descriptor(&mut timed_out, 2).is_none());

        // a device descriptor is not a hub descriptor
        let mut wrong_type = ScriptedChannel::answering(&[0x12, 0x01, 0x00, 0x02]);
        assert!(read_hub_descriptor(&mut wrong_type, 2).is_none());
    }

    #[test]
    fn test_read_port_status() {
        let mut channel = ScriptedChannel::answering(&[0x03, 0x01, 0x00, 0x00]);
        let status = read_port_status(&mut channel, 3, 2).unwrap();
        assert_eq!(
            status,
            PortStatus::POWER | PortStatus::CONNECTION | PortStatus::ENABLE
        );
        assert_eq!(channel.sent[0].index, 3);
    }

    #[test]
    fn test_short_port_status_is_an_error() {
        let mut channel = ScriptedChannel::answering(&[0x03]);
        let err = read_port_status(&mut channel, 1, 2).unwrap_err();
        assert!(matches!(err, HardwareError::Payload(_)));
    }

    #[test]
    fn test_set_port_feature() {
        let mut channel = ScriptedChannel::answering(&[]);
        set_port_feature(&mut channel, 2, HubFeature::Power, false).unwrap();
        assert_eq!(channel.sent.len(), 1);
        assert_eq!(channel.sent[0].request, USB_REQ_CLEAR_FEATURE);
        assert_eq!(channel.sent[0].value, HubFeature::Power.value());
        assert_eq!(channel.sent[0].index, 2);
    }
}
