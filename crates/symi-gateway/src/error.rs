//! Error types for the gateway session.

use std::io;
use std::path::PathBuf;

use symi_protocol::ProtocolError;
use symi_registry::RegistryError;
use thiserror::Error;

/// Errors raised by the byte-stream transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No stream is open and reconnecting failed.
    #[error("not connected to gateway")]
    NotConnected,

    /// The connect attempt did not finish in time.
    #[error("connect to {endpoint} timed out after {timeout_ms} ms")]
    ConnectTimeout {
        /// Endpoint that was dialled.
        endpoint: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Underlying I/O failure.
    #[error("gateway I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config file is not valid YAML for [`crate::GatewayConfig`].
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Errors surfaced by [`crate::GatewaySession`].
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The device exists but has no network address yet.
    #[error("device {0} is not paired")]
    NotPaired(String),

    /// A channel index beyond what the device or protocol supports.
    #[error("device {device} has no switch channel {channel}")]
    InvalidChannel {
        device: String,
        channel: u8,
    },
}
