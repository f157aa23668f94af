//! Registry error types.

use thiserror::Error;

/// Errors that can occur when querying or updating the registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No device holds this network address.
    #[error("no device with network address 0x{0:04X}")]
    UnknownNetworkAddress(u16),

    /// No device with this id or MAC.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// A snapshot entry's key does not match the id derived from its MAC.
    #[error("snapshot key {key} does not match device id {derived}")]
    IdentityMismatch {
        /// Key the entry was stored under.
        key: String,
        /// Id derived from the stored MAC.
        derived: String,
    },

    /// Snapshot (de)serialization failed.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
