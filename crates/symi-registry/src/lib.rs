//! Device registry for Symi mesh nodes.
//!
//! This crate folds device-list records, scan sightings and node state
//! reports into a consistent set of [`DeviceRecord`]s keyed by MAC.
//!
//! - [`capability`] - The `(type, sub_type)` → capability table
//! - [`DeviceRecord`] - One node: identity, address, capabilities, state
//! - [`DeviceRegistry`] - Insert/refresh, state application, queries and
//!   JSON snapshots

pub mod capability;
mod device;
mod error;
mod registry;

pub use capability::{derive_profile, CapabilityProfile};
pub use device::*;
pub use error::*;
pub use registry::*;
