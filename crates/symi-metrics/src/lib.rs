//! Metrics for the Symi gateway bridge.
//!
//! Every series the bridge records is declared in [`metric_defs`], each with
//! the label keys callers attach. Recording goes through the `metrics` facade
//! (re-exported here), so nothing is kept until a recorder is installed:
//! [`InMemoryRecorder`] for end-of-run summaries and tests, or the Prometheus
//! exporter behind the `prometheus` feature.
//!
//! ```rust
//! use symi_metrics::{metric_defs, GatewayLabels};
//!
//! let labels = GatewayLabels::new("192.168.1.50:4196");
//! metrics::counter!(
//!     metric_defs::COMMANDS_SENT.name,
//!     &labels.with(&[("command", "start_scan".to_string())])
//! )
//! .increment(1);
//! ```

mod export;

pub use export::{HistogramSummary, InMemoryRecorder, MetricsSnapshot};
pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// One declared series.
#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub help: &'static str,
    /// Label keys callers attach; `gateway` is always first.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn counter(
        name: &'static str,
        unit: Unit,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Metric {
            name,
            kind: MetricKind::Counter,
            unit,
            help,
            labels,
        }
    }

    const fn gauge(name: &'static str, help: &'static str) -> Self {
        Metric {
            name,
            kind: MetricKind::Gauge,
            unit: Unit::Count,
            help,
            labels: &["gateway"],
        }
    }

    const fn histogram(name: &'static str, unit: Unit, help: &'static str) -> Self {
        Metric {
            name,
            kind: MetricKind::Histogram,
            unit,
            help,
            labels: &["gateway"],
        }
    }

    /// Register unit and help text with the installed recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.help),
            MetricKind::Gauge => describe_gauge!(self.name, self.unit, self.help),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.help),
        }
    }
}

/// All metric definitions for the bridge.
pub mod metric_defs {
    use super::{Metric, Unit};

    const GATEWAY: &[&str] = &["gateway"];

    // ========================================================================
    // Link / Framing
    // ========================================================================

    /// Labels: gateway, opcode
    pub const FRAMES_DECODED: Metric = Metric::counter(
        "symi.link.frames_decoded",
        Unit::Count,
        "Valid frames reassembled from the gateway link",
        &["gateway", "opcode"],
    );

    pub const FRAMES_CORRUPT: Metric = Metric::counter(
        "symi.link.frames_corrupt",
        Unit::Count,
        "Frame candidates rejected by checksum",
        GATEWAY,
    );

    pub const BYTES_DISCARDED: Metric = Metric::counter(
        "symi.link.bytes_discarded",
        Unit::Bytes,
        "Bytes discarded while hunting for a frame header",
        GATEWAY,
    );

    pub const BYTES_RECEIVED: Metric = Metric::counter(
        "symi.link.bytes_received",
        Unit::Bytes,
        "Bytes read from the gateway link",
        GATEWAY,
    );

    /// Includes reconnects made by a send.
    pub const CONNECTS: Metric = Metric::counter(
        "symi.link.connects",
        Unit::Count,
        "Successful connections to the gateway",
        GATEWAY,
    );

    pub const DISCONNECTS: Metric = Metric::counter(
        "symi.link.disconnects",
        Unit::Count,
        "Connections lost or closed",
        GATEWAY,
    );

    // ========================================================================
    // Commands
    // ========================================================================

    /// Labels: gateway, command
    pub const COMMANDS_SENT: Metric = Metric::counter(
        "symi.commands.sent",
        Unit::Count,
        "Command frames written to the gateway",
        &["gateway", "command"],
    );

    /// Labels: gateway, command
    pub const COMMANDS_FAILED: Metric = Metric::counter(
        "symi.commands.failed",
        Unit::Count,
        "Command frames that could not be written",
        &["gateway", "command"],
    );

    pub const COMMAND_WRITE_TIME: Metric = Metric::histogram(
        "symi.commands.write_time_ms",
        Unit::Milliseconds,
        "Time to write one command frame, including any reconnect",
    );

    // ========================================================================
    // Registry
    // ========================================================================

    pub const REGISTRY_DEVICES: Metric =
        Metric::gauge("symi.registry.devices", "Devices currently known to the registry");

    pub const NODE_EVENTS_DROPPED: Metric = Metric::counter(
        "symi.registry.node_events_dropped",
        Unit::Count,
        "Node events dropped because the address is unknown",
        GATEWAY,
    );

    pub const DEVICE_ANOMALIES: Metric = Metric::counter(
        "symi.registry.anomalies",
        Unit::Count,
        "Device re-sightings reporting a different type",
        GATEWAY,
    );

    pub const STATUS_SYNCS: Metric = Metric::counter(
        "symi.registry.status_syncs",
        Unit::Count,
        "Debounced device-list resyncs issued",
        GATEWAY,
    );

    pub const ALL: &[Metric] = &[
        FRAMES_DECODED,
        FRAMES_CORRUPT,
        BYTES_DISCARDED,
        BYTES_RECEIVED,
        CONNECTS,
        DISCONNECTS,
        COMMANDS_SENT,
        COMMANDS_FAILED,
        COMMAND_WRITE_TIME,
        REGISTRY_DEVICES,
        NODE_EVENTS_DROPPED,
        DEVICE_ANOMALIES,
        STATUS_SYNCS,
    ];
}

/// Labels identifying one gateway connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayLabels {
    /// Gateway endpoint, e.g. `host:port`.
    pub gateway: String,
}

impl GatewayLabels {
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
        }
    }

    /// Label pairs for the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("gateway", self.gateway.clone())]
    }

    /// Label pairs plus extra key/value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describe every metric in [`metric_defs::ALL`]. Call once after installing
/// a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Serve `/metrics` in Prometheus text format on `listen` and describe every
/// metric. Must run inside a tokio runtime.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    listen: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()?;
    describe_metrics();
    Ok(())
}
