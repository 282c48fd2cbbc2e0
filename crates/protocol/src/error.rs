//! Protocol error types

use thiserror::Error;

/// Malformed port location text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Nothing but whitespace (or a bare suffix) was given
    #[error("empty location")]
    Empty,

    /// The bus field in front of the first `-` is missing
    #[error("missing bus number")]
    EmptyBus,

    /// A bus or port field is not a number in range
    #[error("invalid location segment '{segment}'")]
    InvalidSegment { segment: String },
}

/// Hub class payload errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The device answered with fewer bytes than the layout requires
    #[error("Short payload: needed {needed} bytes, got {actual}")]
    ShortPayload { needed: usize, actual: usize },

    /// The device answered a descriptor request with another descriptor type
    #[error("Unexpected descriptor type {actual:#04x} (expected {expected:#04x})")]
    UnexpectedDescriptor { expected: u8, actual: u8 },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
