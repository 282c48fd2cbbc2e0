//! USB device enumeration
//!
//! Lists attached devices through libusb and converts them into the
//! host-independent [`Device`] model.

use common::Device;
use protocol::USB_CLASS_HUB;
use rusb::{Context, DeviceDescriptor, DeviceHandle, UsbContext};
use tracing::{debug, warn};

/// Enumerates attached USB devices
pub struct DeviceEnumerator {
    context: Context,
}

impl DeviceEnumerator {
    /// Create a new enumerator with its own libusb context
    pub fn new() -> Result<Self, rusb::Error> {
        Ok(Self {
            context: Context::new()?,
        })
    }

    /// All currently attached devices
    ///
    /// A device whose descriptor or port path cannot be read is skipped;
    /// missing string descriptors only leave the matching field unset.
    pub fn enumerate(&self) -> Result<Vec<Device>, rusb::Error> {
        let list = self.context.devices()?;
        let mut devices = Vec::with_capacity(list.len());

        for device in list.iter() {
            match convert_device(&device) {
                Ok(converted) => devices.push(converted),
                Err(e) => warn!(
                    "Skipping device {:03}/{:03}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }

        debug!("libusb reported {} devices", devices.len());
        Ok(devices)
    }
}

fn convert_device(device: &rusb::Device<Context>) -> Result<Device, rusb::Error> {
    let descriptor = device.device_descriptor()?;
    let port_path = device.port_numbers()?;

    let (manufacturer, product, serial_number) = device
        .open()
        .map(|handle| read_string_descriptors(&handle, &descriptor))
        .unwrap_or_else(|e| {
            debug!(
                "No descriptor strings for {:03}/{:03}: {}",
                device.bus_number(),
                device.address(),
                e
            );
            (None, None, None)
        });

    Ok(Device {
        bus: device.bus_number(),
        address: device.address(),
        port_path,
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        usb_level: descriptor.usb_version().major(),
        is_hub: descriptor.class_code() == USB_CLASS_HUB,
        manufacturer,
        product,
        serial_number,
    })
}

/// Read string descriptors from device
fn read_string_descriptors(
    handle: &DeviceHandle<Context>,
    descriptor: &DeviceDescriptor,
) -> (Option<String>, Option<String>, Option<String>) {
    let manufacturer = descriptor
        .manufacturer_string_index()
        .and_then(|idx| read_trimmed(handle, idx));

    let product = descriptor
        .product_string_index()
        .and_then(|idx| read_trimmed(handle, idx));

    let serial_number = descriptor
        .serial_number_string_index()
        .and_then(|idx| read_trimmed(handle, idx));

    (manufacturer, product, serial_number)
}

/// Devices pad their strings with spaces, keep only the text
fn read_trimmed(handle: &DeviceHandle<Context>, index: u8) -> Option<String> {
    handle
        .read_string_descriptor_ascii(index)
        .ok()
        .map(|s| s.trim().to_string())
}
