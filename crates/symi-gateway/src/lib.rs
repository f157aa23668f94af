//! Symi mesh gateway session.
//!
//! Connects to a Symi Bluetooth-mesh gateway over its TCP serial bridge, keeps
//! a [`symi_registry::DeviceRegistry`] in sync with what the gateway reports and
//! pushes [`GatewayEvent`]s to whoever presents the devices.
//!
//! ```rust,no_run
//! use symi_gateway::{event_channel, GatewayConfig, GatewaySession, TcpConnector};
//!
//! # async fn run() -> Result<(), symi_gateway::GatewayError> {
//! let config = GatewayConfig::load("gateway.yaml")?;
//! let (events_tx, mut events) = event_channel();
//! let session = GatewaySession::new(TcpConnector::from_config(&config), config, events_tx);
//!
//! session.connect().await?;
//! session.read_device_list().await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
mod events;
mod session;
mod sync;
pub mod transport;

pub use config::GatewayConfig;
pub use error::*;
pub use events::*;
pub use session::*;
pub use sync::*;
pub use transport::{Connector, TcpConnector, TransportEvent, TransportSession};

pub use symi_protocol;
pub use symi_registry;
