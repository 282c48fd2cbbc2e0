//! Port topology
//!
//! The OS reports a flat device list; hubs know which of their ports are
//! powered, connected or enabled even when nothing enumerates behind them.
//! [`TopologyBuilder`] merges both views into a [`PortTable`] keyed by
//! [`Location`]. A table is built fresh for every request and never updated
//! in place afterwards.

use crate::control;
use crate::error::{HardwareError, Result};
use crate::host::UsbHost;
use crate::usb_types::Device;
use protocol::{Location, PortStatus};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// One addressable attachment point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub location: Location,
    /// Device enumerated at this location, `None` for a ghost port
    pub device: Option<Device>,
    /// Status reported by the parent hub, if it could be read
    pub status: Option<PortStatus>,
    /// Serial port names matched to this location, in enumeration order
    pub serial_ports: Vec<String>,
}

impl Port {
    fn enumerated(device: Device) -> Self {
        Self {
            location: device.location(),
            device: Some(device),
            status: None,
            serial_ports: Vec::new(),
        }
    }

    fn ghost(location: Location, status: PortStatus) -> Self {
        Self {
            location,
            device: None,
            status: Some(status),
            serial_ports: Vec::new(),
        }
    }

    /// A hub port with nothing enumerated behind it
    pub fn is_ghost(&self) -> bool {
        self.device.is_none()
    }

    pub fn is_hub(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_hub)
    }

    /// Matched serial port names joined by a space
    pub fn serial_name(&self) -> Option<String> {
        if self.serial_ports.is_empty() {
            None
        } else {
            Some(self.serial_ports.join(" "))
        }
    }
}

/// Ports ordered by location, one entry per location
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortTable {
    ports: BTreeMap<Location, Port>,
}

impl PortTable {
    /// Table holding one enumerated port per device
    ///
    /// A second device claiming an already taken location is dropped.
    pub fn from_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let mut ports = BTreeMap::new();
        for device in devices {
            let location = device.location();
            if ports.contains_key(&location) {
                warn!(
                    "Ignoring device {:03}/{:03}, location {} already taken",
                    device.bus, device.address, location
                );
                continue;
            }
            ports.insert(location, Port::enumerated(device));
        }
        Self { ports }
    }

    pub fn get(&self, location: &Location) -> Option<&Port> {
        self.ports.get(location)
    }

    pub fn get_mut(&mut self, location: &Location) -> Option<&mut Port> {
        self.ports.get_mut(location)
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.ports.contains_key(location)
    }

    /// Ports in location order
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// Direct children of the hub at `hub`
    pub fn children<'a>(&'a self, hub: &'a Location) -> impl Iterator<Item = &'a Port> + 'a {
        self.ports
            .values()
            .filter(move |port| port.location.parent().as_ref() == Some(hub))
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Record the status of every port of the hub at `hub`
    ///
    /// Ports without an enumerated device become ghost entries.
    fn apply_hub_ports(&mut self, hub: &Location, statuses: Vec<(u8, PortStatus)>) {
        for (port, status) in statuses {
            let location = hub.child(port);
            match self.ports.get_mut(&location) {
                Some(existing) => existing.status = Some(status),
                None => {
                    self.ports
                        .insert(location.clone(), Port::ghost(location, status));
                }
            }
        }
    }
}

impl<'a> IntoIterator for &'a PortTable {
    type Item = &'a Port;
    type IntoIter = std::collections::btree_map::Values<'a, Location, Port>;

    fn into_iter(self) -> Self::IntoIter {
        self.ports.values()
    }
}

/// Builds a [`PortTable`] from the live system
pub struct TopologyBuilder<'a, H: UsbHost> {
    host: &'a H,
}

impl<'a, H: UsbHost> TopologyBuilder<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Enumerate devices and expand every hub into its ports
    ///
    /// Only enumeration failure aborts the build. A hub that cannot be
    /// opened or answers a status request with an error keeps its own
    /// entry but contributes no ports.
    pub fn build(&self) -> Result<PortTable> {
        let devices = self.host.enumerate()?;
        debug!("Enumerated {} devices", devices.len());

        let hubs: Vec<Device> = devices.iter().filter(|d| d.is_hub).cloned().collect();
        let mut table = PortTable::from_devices(devices);

        for hub in &hubs {
            let location = hub.location();
            match self.expand_hub(hub) {
                Ok(Some(statuses)) => {
                    debug!("Hub {} has {} ports", location, statuses.len());
                    table.apply_hub_ports(&location, statuses);
                }
                Ok(None) => {
                    debug!("Hub {} is not expandable", location);
                }
                Err(e) => {
                    warn!("Skipping ports of hub {}: {}", location, e);
                }
            }
        }

        info!("Topology built with {} ports", table.len());
        Ok(table)
    }

    /// Status of every port of `hub`, `None` when it has no readable descriptor
    fn expand_hub(
        &self,
        hub: &Device,
    ) -> std::result::Result<Option<Vec<(u8, PortStatus)>>, HardwareError> {
        let mut channel = self.host.open(hub)?;

        let Some(descriptor) = control::read_hub_descriptor(&mut channel, hub.usb_level) else {
            return Ok(None);
        };

        let mut statuses = Vec::with_capacity(usize::from(descriptor.port_count));
        for port in 1..=descriptor.port_count {
            let status = control::read_port_status(&mut channel, port, hub.usb_level)?;
            statuses.push((port, status));
        }
        Ok(Some(statuses))
    }
}
