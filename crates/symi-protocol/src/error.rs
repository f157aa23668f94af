//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding gateway frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload does not fit in the single length byte.
    #[error("payload too long: maximum {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// Payload is too short for the message it claims to carry.
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Invalid data in a payload.
    #[error("invalid frame data: {0}")]
    InvalidData(String),

    /// A MAC address string could not be parsed.
    #[error("invalid MAC address: {0:?}")]
    InvalidMac(String),
}

impl ProtocolError {
    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        ProtocolError::InvalidData(msg.into())
    }
}
