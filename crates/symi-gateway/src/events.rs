//! Notifications pushed to the presentation layer.

use std::fmt;

use symi_protocol::MacAddress;
use symi_registry::{DeviceRecord, TypeAnomaly};
use tokio::sync::mpsc;
use tracing::trace;

/// Identity and counters reported by the gateway itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayInfo {
    /// Firmware version, `a.b.c.d`.
    pub software_version: Option<String>,
    /// The gateway's own MAC.
    pub mac_address: Option<MacAddress>,
    /// Paired devices according to the gateway.
    pub device_count: Option<u8>,
}

impl fmt::Display for GatewayInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_unknown<T: ToString>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown".to_string())
        }
        write!(
            f,
            "version {}, mac {}, {} devices",
            or_unknown(&self.software_version),
            or_unknown(&self.mac_address),
            or_unknown(&self.device_count)
        )
    }
}

/// Something the presentation layer may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// The link to the gateway came up or went down.
    ConnectionChanged { connected: bool },

    /// Scan mode started or ended (including by timeout).
    ScanStateChanged { scanning: bool },

    /// A device was seen for the first time.
    DeviceDiscovered(DeviceRecord),

    /// A known device changed address or online state.
    DeviceUpdated(DeviceRecord),

    /// A node reported new state.
    DeviceStateChanged {
        device: DeviceRecord,
        /// State keys that were written.
        changed: Vec<String>,
    },

    /// A known device reported a different type than when first seen.
    DeviceAnomaly(TypeAnomaly),

    /// A gateway info response arrived.
    GatewayInfoUpdated(GatewayInfo),
}

/// Sending half handed to [`crate::GatewaySession::new`].
pub type EventSender = mpsc::UnboundedSender<GatewayEvent>;

/// Receiving half kept by the presentation layer.
pub type EventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Create a notification channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

pub(crate) fn emit(sender: &EventSender, event: GatewayEvent) {
    if sender.send(event).is_err() {
        trace!("event receiver dropped");
    }
}
