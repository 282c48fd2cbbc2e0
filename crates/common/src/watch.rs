//! Control plane facade
//!
//! [`UsbWatch`] is what every front end talks to. Each call rebuilds the
//! topology from scratch, resolves the target location in it, and only then
//! opens a control node. Location problems are therefore reported before any
//! hardware is touched.

use crate::comports::match_serial_ports;
use crate::control;
use crate::error::{Error, HardwareError, Result};
use crate::format::render_ports;
use crate::host::UsbHost;
use crate::topology::{Port, PortTable, TopologyBuilder};
use crate::usb_types::Device;
use protocol::{HubFeature, Location};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Operator command applied to one port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortCommand {
    /// Ask the kernel to reset the device itself
    Reset,
    /// Hub-driven port reset
    Hard,
    /// Disable the port, the device drops off the bus
    Disable,
    /// Power the port on
    On,
    /// Power the port off
    Off,
}

impl PortCommand {
    pub const ALL: [PortCommand; 5] = [
        PortCommand::Reset,
        PortCommand::Hard,
        PortCommand::Disable,
        PortCommand::On,
        PortCommand::Off,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PortCommand::Reset => "reset",
            PortCommand::Hard => "hard",
            PortCommand::Disable => "disable",
            PortCommand::On => "on",
            PortCommand::Off => "off",
        }
    }

    /// Hub feature and value behind this command, `None` for a soft reset
    pub fn hub_feature(&self) -> Option<(HubFeature, bool)> {
        match self {
            PortCommand::Reset => None,
            PortCommand::Hard => Some((HubFeature::Reset, true)),
            PortCommand::Disable => Some((HubFeature::Enable, false)),
            PortCommand::On => Some((HubFeature::Power, true)),
            PortCommand::Off => Some((HubFeature::Power, false)),
        }
    }
}

impl fmt::Display for PortCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PortCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        PortCommand::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownCommand(wanted.to_string()))
    }
}

/// List, reset and switch USB ports of one host
pub struct UsbWatch<H: UsbHost> {
    host: H,
}

impl<H: UsbHost> UsbWatch<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Full topology with serial port names attached
    pub fn ports(&self) -> Result<PortTable> {
        let mut table = TopologyBuilder::new(&self.host).build()?;
        let matched = match_serial_ports(&mut table, &self.host.serial_ports());
        debug!("Matched {} serial ports", matched);
        Ok(table)
    }

    /// Rendered listing, one line per non-hub port
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(render_ports(&self.ports()?))
    }

    /// Ask the kernel to reset the device at `location`
    pub fn soft_reset(&self, location: &str) -> Result<()> {
        let location = Location::parse(location)?;
        let table = TopologyBuilder::new(&self.host).build()?;

        let port = find_port(&table, &location)?;
        if let Some(parent) = location.parent() {
            enumerated_hub(&table, &parent, &location)?;
        }
        let Some(device) = &port.device else {
            return Err(HardwareError::NotEnumerated { location }.into());
        };

        let mut channel = self.host.open(device)?;
        control::reset_device(&mut channel)?;
        info!("Reset device at {}", location);
        Ok(())
    }

    /// SET_FEATURE (`enable`) or CLEAR_FEATURE on the hub port behind `location`
    pub fn set_feature(&self, location: &str, feature: HubFeature, enable: bool) -> Result<()> {
        let location = Location::parse(location)?;
        let table = TopologyBuilder::new(&self.host).build()?;

        find_port(&table, &location)?;
        let (Some(parent), Some(port_number)) = (location.parent(), location.port_number()) else {
            return Err(Error::RootHubPort { location });
        };
        let hub = enumerated_hub(&table, &parent, &location)?;

        let mut channel = self.host.open(hub)?;
        control::set_port_feature(&mut channel, port_number, feature, enable)?;
        info!(
            "{} {} on {}",
            if enable { "Set" } else { "Cleared" },
            feature,
            location
        );
        Ok(())
    }

    /// Run `command` against `location`
    pub fn execute(&self, command: PortCommand, location: &str) -> Result<()> {
        match command.hub_feature() {
            None => self.soft_reset(location),
            Some((feature, enable)) => self.set_feature(location, feature, enable),
        }
    }
}

fn find_port<'a>(table: &'a PortTable, location: &Location) -> Result<&'a Port> {
    table.get(location).ok_or_else(|| Error::PortNotFound {
        location: location.clone(),
    })
}

/// Enumerated hub device at `parent`, the upstream hub of `location`
fn enumerated_hub<'a>(
    table: &'a PortTable,
    parent: &Location,
    location: &Location,
) -> Result<&'a Device> {
    table
        .get(parent)
        .and_then(|port| port.device.as_ref())
        .ok_or_else(|| {
            HardwareError::HubNotEnumerated {
                location: location.clone(),
            }
            .into()
        })
}
