//! Hierarchical port addressing
//!
//! A [`Location`] names a physical attachment point: the bus number plus
//! the chain of hub port numbers leading from the root hub to the device.
//! The text form is `<bus>[-<port>(.<port>)*][:<suffix>]`, which is what
//! sysfs uses for USB device and interface directories (`1-1.4:1.0`).

use crate::error::LocationError;
use std::fmt;
use std::str::FromStr;

/// Physical USB attachment point
///
/// Ordering is lexicographic over `(bus, ports[0], ports[1], ...)` with a
/// prefix sorting before its children, so a hub always sorts directly in
/// front of the ports below it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    bus: u8,
    ports: Vec<u8>,
}

impl Location {
    /// Location of the root hub of `bus`
    pub fn root(bus: u8) -> Self {
        Self {
            bus,
            ports: Vec::new(),
        }
    }

    pub fn new(bus: u8, ports: impl Into<Vec<u8>>) -> Self {
        Self {
            bus,
            ports: ports.into(),
        }
    }

    /// Parse the text form, ignoring one trailing `:suffix`
    pub fn parse(text: &str) -> Result<Self, LocationError> {
        let address = text.trim().split(':').next().unwrap_or_default().trim();
        if address.is_empty() {
            return Err(LocationError::Empty);
        }

        let (bus, ports) = match address.split_once('-') {
            Some((bus, ports)) => (bus, Some(ports)),
            None => (address, None),
        };
        if bus.is_empty() {
            return Err(LocationError::EmptyBus);
        }

        let bus = parse_segment(bus)?;
        let ports = match ports {
            Some(ports) => ports
                .split('.')
                .map(parse_segment)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self { bus, ports })
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// Hub port numbers from the root hub downwards
    pub fn ports(&self) -> &[u8] {
        &self.ports
    }

    /// True for a root hub, which hangs off no hub port
    pub fn is_root(&self) -> bool {
        self.ports.is_empty()
    }

    /// Number of the port on the parent hub, `None` for a root hub
    pub fn port_number(&self) -> Option<u8> {
        self.ports.last().copied()
    }

    /// Location of the hub this location is plugged into
    pub fn parent(&self) -> Option<Location> {
        let (_, parent_ports) = self.ports.split_last()?;
        Some(Self::new(self.bus, parent_ports))
    }

    /// Location of port `port` of the hub at this location
    pub fn child(&self, port: u8) -> Location {
        let mut ports = Vec::with_capacity(self.ports.len() + 1);
        ports.extend_from_slice(&self.ports);
        ports.push(port);
        Self::new(self.bus, ports)
    }
}

fn parse_segment(segment: &str) -> Result<u8, LocationError> {
    let invalid = || LocationError::InvalidSegment {
        segment: segment.to_string(),
    };
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    segment.parse().map_err(|_| invalid())
}

/// Renders the normalized form: ports zero-padded to two digits
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bus)?;
        for (i, port) in self.ports.iter().enumerate() {
            let separator = if i == 0 { '-' } else { '.' };
            write!(f, "{}{:02}", separator, port)?;
        }
        Ok(())
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
