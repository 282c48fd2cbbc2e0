//! Test utilities for usbwatch
//!
//! Provides a scriptable [`MockHost`] standing in for the platform backend,
//! plus helpers to build devices, hubs and serial port entries.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{MockHost, create_mock_device, create_mock_hub};
//! use common::TopologyBuilder;
//!
//! # fn main() {
//! let host = MockHost::new()
//!     .with_hub(create_mock_hub(1, 1, &[], 2), &[0x0103, 0x0100])
//!     .with_device(create_mock_device(1, 2, &[1]));
//!
//! let table = TopologyBuilder::new(&host).build().unwrap();
//! assert_eq!(table.len(), 3);
//! # }
//! ```

use crate::error::{Error, HardwareError, Result};
use crate::host::{ControlChannel, UsbHost};
use crate::usb_types::{Device, SerialPortEntry};
use protocol::{
    ControlSetup, HubDescriptor, Location, RawPortStatus, USB_REQ_GET_DESCRIPTOR,
    USB_REQ_GET_STATUS, hub_descriptor_type,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// errno the kernel returns when a device stalls a control request
const EPIPE: i32 = 32;
/// errno for a failed open of a control node without permission
const EACCES: i32 = 13;

/// Create a non-hub device with no descriptor strings
///
/// # Example
/// ```
/// use common::test_utils::create_mock_device;
///
/// let device = create_mock_device(1, 4, &[2, 3]);
/// assert_eq!(device.location().to_string(), "1-02.03");
/// assert!(!device.is_hub);
/// ```
pub fn create_mock_device(bus: u8, address: u8, port_path: &[u8]) -> Device {
    Device {
        bus,
        address,
        port_path: port_path.to_vec(),
        vendor_id: 0x1234,
        product_id: 0x5678,
        usb_level: 2,
        is_hub: false,
        manufacturer: None,
        product: None,
        serial_number: None,
    }
}

/// Create a hub device at the given USB level
pub fn create_mock_hub(bus: u8, address: u8, port_path: &[u8], usb_level: u8) -> Device {
    Device {
        vendor_id: 0x1d6b,
        product_id: if usb_level >= 3 { 0x0003 } else { 0x0002 },
        usb_level,
        is_hub: true,
        ..create_mock_device(bus, address, port_path)
    }
}

/// Create a USB serial port entry reporting `location`
pub fn create_serial_port(name: &str, location: &str) -> SerialPortEntry {
    SerialPortEntry {
        name: name.to_string(),
        location: Some(location.to_string()),
        vendor_id: Some(0x0403),
        product_id: Some(0x6001),
    }
}

/// Request observed by a [`MockHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    Open(Location),
    Reset(Location),
    ControlIn { target: Location, setup: ControlSetup },
    ControlOut { target: Location, setup: ControlSetup },
}

#[derive(Debug, Clone, Default)]
struct MockHub {
    descriptor: Vec<u8>,
    /// wPortStatus per port, index 0 is port 1
    port_status: Vec<u16>,
    failing_ports: HashSet<u8>,
}

/// Scriptable stand-in for a USB host
///
/// Devices added with [`MockHost::with_hub`] answer hub descriptor and port
/// status requests; every other device stalls them. All requests are
/// recorded and can be inspected with [`MockHost::requests`].
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    devices: Vec<Device>,
    hubs: HashMap<Location, MockHub>,
    unopenable: HashSet<Location>,
    timing_out: HashSet<Location>,
    serial_ports: Vec<SerialPortEntry>,
    enumeration_error: Option<String>,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    /// Add a hub reporting one port per entry of `port_status`
    pub fn with_hub(mut self, hub: Device, port_status: &[u16]) -> Self {
        let descriptor = HubDescriptor {
            descriptor_type: hub_descriptor_type(hub.usb_level),
            port_count: port_status.len() as u8,
            characteristics: 0,
            power_on_to_good: 50,
            controller_current: 100,
        };
        self.hubs.insert(
            hub.location(),
            MockHub {
                descriptor: descriptor.to_bytes().to_vec(),
                port_status: port_status.to_vec(),
                failing_ports: HashSet::new(),
            },
        );
        self.devices.push(hub);
        self
    }

    /// Opening the control node at `location` fails with a permission error
    pub fn with_unopenable(mut self, location: Location) -> Self {
        self.unopenable.insert(location);
        self
    }

    /// Every request to the device at `location` times out
    pub fn with_timeouts(mut self, location: Location) -> Self {
        self.timing_out.insert(location);
        self
    }

    /// GET_STATUS for `port` of the hub at `hub` is rejected
    pub fn with_status_failure(mut self, hub: Location, port: u8) -> Self {
        if let Some(mock) = self.hubs.get_mut(&hub) {
            mock.failing_ports.insert(port);
        }
        self
    }

    pub fn with_serial_port(mut self, entry: SerialPortEntry) -> Self {
        self.serial_ports.push(entry);
        self
    }

    /// Enumeration itself fails
    pub fn with_enumeration_error(mut self, message: &str) -> Self {
        self.enumeration_error = Some(message.to_string());
        self
    }

    /// Every request seen so far, oldest first
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().expect("mock request log poisoned").clone()
    }

    /// Only the SET_FEATURE / CLEAR_FEATURE and reset requests
    pub fn control_actions(&self) -> Vec<MockRequest> {
        self.requests()
            .into_iter()
            .filter(|r| matches!(r, MockRequest::Reset(_) | MockRequest::ControlOut { .. }))
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().expect("mock request log poisoned").clear();
    }

    fn record(&self, request: MockRequest) {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .push(request);
    }
}

impl UsbHost for MockHost {
    type Channel = MockChannel;

    fn enumerate(&self) -> Result<Vec<Device>> {
        match &self.enumeration_error {
            Some(message) => Err(Error::Enumeration(message.clone())),
            None => Ok(self.devices.clone()),
        }
    }

    fn open(&self, device: &Device) -> std::result::Result<MockChannel, HardwareError> {
        let location = device.location();
        self.record(MockRequest::Open(location.clone()));

        if self.unopenable.contains(&location) {
            return Err(HardwareError::Open {
                path: PathBuf::from(device.device_file()),
                source: std::io::Error::from_raw_os_error(EACCES),
            });
        }

        Ok(MockChannel {
            hub: self.hubs.get(&location).cloned(),
            times_out: self.timing_out.contains(&location),
            location,
            requests: Arc::clone(&self.requests),
        })
    }

    fn serial_ports(&self) -> Vec<SerialPortEntry> {
        self.serial_ports.clone()
    }
}

/// Control channel handed out by [`MockHost`]
#[derive(Debug)]
pub struct MockChannel {
    location: Location,
    hub: Option<MockHub>,
    times_out: bool,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockChannel {
    fn record(&self, request: MockRequest) {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .push(request);
    }

    fn check_timeout(&self, operation: &'static str) -> std::result::Result<(), HardwareError> {
        if self.times_out {
            return Err(HardwareError::Timeout {
                operation,
                timeout_ms: DEFAULT_TEST_TIMEOUT.as_millis() as u64,
            });
        }
        Ok(())
    }
}

fn stall(operation: &'static str) -> HardwareError {
    HardwareError::Rejected {
        operation,
        source: std::io::Error::from_raw_os_error(EPIPE),
    }
}

impl ControlChannel for MockChannel {
    fn reset(&mut self) -> std::result::Result<(), HardwareError> {
        self.record(MockRequest::Reset(self.location.clone()));
        self.check_timeout("USBDEVFS_RESET")
    }

    fn control_in(
        &mut self,
        setup: ControlSetup,
        buf: &mut [u8],
    ) -> std::result::Result<usize, HardwareError> {
        self.record(MockRequest::ControlIn {
            target: self.location.clone(),
            setup,
        });

        let answer = match (setup.request, &self.hub) {
            (USB_REQ_GET_DESCRIPTOR, Some(hub)) => {
                self.check_timeout("GET_DESCRIPTOR")?;
                hub.descriptor.clone()
            }
            (USB_REQ_GET_STATUS, Some(hub)) => {
                self.check_timeout("GET_STATUS")?;
                let port = setup.index as u8;
                if hub.failing_ports.contains(&port) {
                    return Err(stall("GET_STATUS"));
                }
                let status = usize::from(port)
                    .checked_sub(1)
                    .and_then(|i| hub.port_status.get(i))
                    .copied()
                    .ok_or_else(|| stall("GET_STATUS"))?;
                RawPortStatus { status, change: 0 }.to_bytes().to_vec()
            }
            (USB_REQ_GET_DESCRIPTOR, None) => return Err(stall("GET_DESCRIPTOR")),
            _ => return Err(stall("CONTROL")),
        };

        let n = answer.len().min(buf.len());
        buf[..n].copy_from_slice(&answer[..n]);
        Ok(n)
    }

    fn control_out(&mut self, setup: ControlSetup) -> std::result::Result<(), HardwareError> {
        self.record(MockRequest::ControlOut {
            target: self.location.clone(),
            setup,
        });
        self.check_timeout("SET_FEATURE")?;
        if self.hub.is_none() {
            return Err(stall("SET_FEATURE"));
        }
        Ok(())
    }
}

/// Helper to run an async test with timeout
///
/// Returns Err if the future doesn't complete within the timeout.
pub async fn with_timeout<F, T>(
    timeout: Duration,
    future: F,
) -> std::result::Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(timeout, future).await
}
