//! Serial port matching
//!
//! USB serial adapters show up twice: once as a USB device and once as a
//! tty. The tty side reports the location of its USB interface, which is
//! enough to pin the tty name onto the port it is plugged into.

use crate::topology::PortTable;
use crate::usb_types::SerialPortEntry;
use protocol::Location;
use tracing::debug;

/// Attach serial port names to the ports they live on
///
/// Entries without a vendor/product pair are not USB serial adapters and
/// are skipped, as are entries whose location is missing, malformed, or
/// not present in `table`. Returns the number of names attached.
pub fn match_serial_ports(table: &mut PortTable, entries: &[SerialPortEntry]) -> usize {
    let mut matched = 0;

    for entry in entries {
        if entry.vendor_id.is_none() || entry.product_id.is_none() {
            continue;
        }
        let Some(text) = entry.location.as_deref() else {
            debug!("Serial port {} has no USB location", entry.name);
            continue;
        };
        let location = match Location::parse(text) {
            Ok(location) => location,
            Err(e) => {
                debug!(
                    "Serial port {} has unusable location '{}': {}",
                    entry.name, text, e
                );
                continue;
            }
        };

        if let Some(port) = table.get_mut(&location) {
            port.serial_ports.push(entry.name.clone());
            matched += 1;
        }
    }

    matched
}
