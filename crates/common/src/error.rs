//! Common error types
//!
//! Two families reach the operator: location errors, raised before any
//! hardware is touched, and hardware errors from the control node.

use protocol::{Location, LocationError, ProtocolError};
use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to a device through its control node
#[derive(Debug, Error)]
pub enum HardwareError {
    /// The control node could not be opened (permissions, device gone)
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request did not complete in time; the hub state is unknown
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The kernel or the device refused the request
    #[error("{operation} rejected: {source}")]
    Rejected {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The device vanished while the request was in flight
    #[error("{operation} failed, device disconnected")]
    Disconnected { operation: &'static str },

    #[error("usb device at {location} not enumerated or plugged in, use the hub commands")]
    NotEnumerated { location: Location },

    #[error("cannot talk to the hub of {location}, usb hub never enumerated")]
    HubNotEnumerated { location: Location },

    #[error("malformed hub response: {0}")]
    Payload(#[from] ProtocolError),
}

impl HardwareError {
    /// True for timeouts and disconnects, where the device may be gone
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HardwareError::Timeout { .. } | HardwareError::Disconnected { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad usb port location: {0}")]
    Location(#[from] LocationError),

    #[error("bad usb port location, port {location} not found")]
    PortNotFound { location: Location },

    #[error("bad usb port location, {location} is a root hub without an upstream port")]
    RootHubPort { location: Location },

    #[error("command not recognized: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("USB enumeration error: {0}")]
    Enumeration(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the request was refused before any hardware access
    pub fn is_location_error(&self) -> bool {
        matches!(
            self,
            Error::Location(_) | Error::PortNotFound { .. } | Error::RootHubPort { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
