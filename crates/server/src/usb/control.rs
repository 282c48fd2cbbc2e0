//! usbdevfs control node
//!
//! Control transfers and device resets are issued straight through the
//! kernel's `/dev/bus/usb/BBB/AAA` nodes. No interface is claimed, so the
//! bound kernel drivers keep running while a hub is queried.

use common::{ControlChannel, Device, HardwareError};
use nix::errno::Errno;
use protocol::ControlSetup;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

mod sys {
    use std::os::raw::c_void;

    /// `struct usbdevfs_ctrltransfer` from `<linux/usbdevice_fs.h>`
    #[repr(C)]
    pub struct CtrlTransfer {
        pub request_type: u8,
        pub request: u8,
        pub value: u16,
        pub index: u16,
        pub length: u16,
        /// milliseconds
        pub timeout: u32,
        pub data: *mut c_void,
    }

    nix::ioctl_readwrite!(usbdevfs_control, b'U', 0, CtrlTransfer);
    nix::ioctl_none!(usbdevfs_reset, b'U', 20);
}

/// An open usbdevfs node
///
/// The node is closed when the channel is dropped.
pub struct UsbDevFsChannel {
    file: File,
    timeout: Duration,
}

impl UsbDevFsChannel {
    /// Open the node of `device` read/write
    pub fn open(device: &Device, timeout: Duration) -> Result<Self, HardwareError> {
        Self::open_path(Path::new(&device.device_file()), timeout)
    }

    pub fn open_path(path: &Path, timeout: Duration) -> Result<Self, HardwareError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| HardwareError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Opened {}", path.display());
        Ok(Self { file, timeout })
    }

    fn timeout_ms(&self) -> u32 {
        u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX)
    }

    fn transfer(
        &mut self,
        operation: &'static str,
        setup: ControlSetup,
        data: &mut [u8],
    ) -> Result<usize, HardwareError> {
        let length = u16::try_from(data.len()).unwrap_or(u16::MAX).min(setup.length);
        let mut request = sys::CtrlTransfer {
            request_type: setup.request_type,
            request: setup.request,
            value: setup.value,
            index: setup.index,
            length,
            timeout: self.timeout_ms(),
            data: if length == 0 {
                std::ptr::null_mut()
            } else {
                data.as_mut_ptr().cast()
            },
        };

        // SAFETY: `request` points at `data`, which outlives the call and
        // holds at least `length` bytes.
        let received = unsafe { sys::usbdevfs_control(self.file.as_raw_fd(), &mut request) }
            .map_err(|errno| map_errno(operation, errno, self.timeout_ms()))?;

        Ok(usize::try_from(received).unwrap_or(0))
    }
}

impl ControlChannel for UsbDevFsChannel {
    fn reset(&mut self) -> Result<(), HardwareError> {
        // SAFETY: USBDEVFS_RESET takes no argument.
        unsafe { sys::usbdevfs_reset(self.file.as_raw_fd()) }
            .map_err(|errno| map_errno("USBDEVFS_RESET", errno, self.timeout_ms()))?;
        Ok(())
    }

    fn control_in(&mut self, setup: ControlSetup, buf: &mut [u8]) -> Result<usize, HardwareError> {
        self.transfer(operation_name(&setup), setup, buf)
    }

    fn control_out(&mut self, setup: ControlSetup) -> Result<(), HardwareError> {
        self.transfer(operation_name(&setup), setup, &mut [])?;
        Ok(())
    }
}

fn operation_name(setup: &ControlSetup) -> &'static str {
    match setup.request {
        protocol::USB_REQ_GET_STATUS => "GET_STATUS",
        protocol::USB_REQ_CLEAR_FEATURE => "CLEAR_FEATURE",
        protocol::USB_REQ_SET_FEATURE => "SET_FEATURE",
        protocol::USB_REQ_GET_DESCRIPTOR => "GET_DESCRIPTOR",
        _ => "CONTROL",
    }
}

/// Split kernel failures into timeouts, disconnects and rejections
pub fn map_errno(operation: &'static str, errno: Errno, timeout_ms: u32) -> HardwareError {
    match errno {
        Errno::ETIMEDOUT => HardwareError::Timeout {
            operation,
            timeout_ms: u64::from(timeout_ms),
        },
        Errno::ENODEV | Errno::ESHUTDOWN => HardwareError::Disconnected { operation },
        other => HardwareError::Rejected {
            operation,
            source: std::io::Error::from(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctrltransfer_layout() {
        // matches the kernel ABI on 64-bit targets
        #[cfg(target_pointer_width = "64")]
        assert_eq!(std::mem::size_of::<sys::CtrlTransfer>(), 24);
        assert_eq!(std::mem::align_of::<sys::CtrlTransfer>(), std::mem::align_of::<usize>());
    }

    #[test]
    fn test_map_errno() {
        assert!(matches!(
            map_errno("GET_STATUS", Errno::ETIMEDOUT, 5000),
            HardwareError::Timeout {
                timeout_ms: 5000,
                ..
            }
        ));
        assert!(matches!(
            map_errno("SET_FEATURE", Errno::ENODEV, 5000),
            HardwareError::Disconnected { .. }
        ));
        assert!(matches!(
            map_errno("GET_DESCRIPTOR", Errno::EPIPE, 5000),
            HardwareError::Rejected { .. }
        ));
    }

    #[test]
    fn test_open_missing_node() {
        let err = UsbDevFsChannel::open_path(
            Path::new("/nonexistent/bus/usb/001/001"),
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, HardwareError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/bus/usb/001/001"));
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(operation_name(&ControlSetup::get_port_status(1)), "GET_STATUS");
        assert_eq!(
            operation_name(&ControlSetup::port_feature(1, protocol::HubFeature::Power, false)),
            "CLEAR_FEATURE"
        );
    }
}
