//! Byte-stream link to the gateway.
//!
//! A [`TransportSession`] owns one stream produced by a [`Connector`]. Inbound
//! bytes are read by a single task, reassembled into frames and pushed into a
//! channel in wire order. Outbound frames go through one async mutex around the
//! write half, so concurrent callers never interleave partial frames.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use symi_metrics::{metric_defs, metrics, GatewayLabels};
use symi_protocol::{opcode_name, Frame, FrameReassembler, ReassemblerStats};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::GatewayConfig;
use crate::error::TransportError;

// ============================================================================
// Connectors
// ============================================================================

/// Opens the underlying stream (TCP socket, serial port, in-memory pipe).
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a fresh stream.
    fn connect(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Human-readable endpoint, used in logs and metric labels.
    fn describe(&self) -> String;
}

/// Connects to the gateway's TCP serial bridge.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: String,
}

impl TcpConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        TcpConnector {
            endpoint: endpoint.into(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.endpoint())
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> impl Future<Output = io::Result<TcpStream>> + Send {
        async move {
            let stream = TcpStream::connect(self.endpoint.as_str()).await?;
            // Frames are small; don't let Nagle hold them back.
            stream.set_nodelay(true)?;
            Ok(stream)
        }
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

// ============================================================================
// Transport Session
// ============================================================================

/// What the read loop reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete, checksum-valid frame.
    Frame(Frame),
    /// The stream ended or failed.
    Disconnected { reason: String },
}

#[derive(Debug, Default)]
struct LinkStatus {
    /// Bumped on every connect and teardown so a stale read loop can tell it
    /// no longer owns the link.
    generation: u64,
    connected: bool,
}

#[derive(Debug)]
struct Shared {
    link: Mutex<LinkStatus>,
    reassembler: Mutex<FrameReassembler>,
}

impl Shared {
    /// Mark the link down if `generation` still owns it. Returns true if this
    /// call performed the transition.
    fn mark_lost(&self, generation: u64) -> bool {
        let mut link = self.link.lock();
        if link.generation == generation && link.connected {
            link.connected = false;
            true
        } else {
            false
        }
    }
}

/// One connection to one gateway.
pub struct TransportSession<C: Connector> {
    connector: C,
    connect_timeout: Duration,
    read_buffer_size: usize,
    writer: tokio::sync::Mutex<Option<WriteHalf<C::Stream>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<TransportEvent>,
    labels: GatewayLabels,
}

impl<C: Connector> TransportSession<C> {
    /// Create a disconnected session. Frames and disconnects are pushed into
    /// `events`.
    pub fn new(
        connector: C,
        config: &GatewayConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        let labels = GatewayLabels::new(connector.describe());
        TransportSession {
            connector,
            connect_timeout: config.connect_timeout(),
            read_buffer_size: config.read_buffer_size.max(1),
            writer: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            shared: Arc::new(Shared {
                link: Mutex::new(LinkStatus::default()),
                reassembler: Mutex::new(FrameReassembler::new()),
            }),
            events,
            labels,
        }
    }

    /// Endpoint description from the connector.
    pub fn endpoint(&self) -> &str {
        &self.labels.gateway
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link.lock().connected
    }

    /// Cumulative framing statistics.
    pub fn reassembler_stats(&self) -> ReassemblerStats {
        self.shared.reassembler.lock().stats()
    }

    /// Open the stream and start the read loop. A no-op if already connected.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        self.connect_locked(&mut writer).await
    }

    /// Write one complete frame.
    ///
    /// If the link is down, exactly one reconnect is attempted first. A write
    /// failure tears the link down and is returned to the caller; nothing is
    /// queued for a later connection.
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;

        if writer.is_none() || !self.is_connected() {
            debug!(endpoint = %self.endpoint(), "link down; reconnecting before send");
            self.connect_locked(&mut writer).await?;
        }
        let Some(stream) = writer.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        trace!(endpoint = %self.endpoint(), data = %hex::encode(bytes), "tx");
        let result = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = result {
            error!(endpoint = %self.endpoint(), error = %e, "write failed");
            self.teardown(&mut writer, format!("write failed: {}", e)).await;
            return Err(TransportError::Io(e));
        }
        Ok(())
    }

    /// Stop the read loop, close the stream and drop any partial frame.
    /// Calling this when already disconnected does nothing.
    pub async fn disconnect(&self) {
        let mut writer = self.writer.lock().await;
        self.teardown(&mut writer, "disconnect requested".to_string())
            .await;
    }

    async fn connect_locked(
        &self,
        writer: &mut Option<WriteHalf<C::Stream>>,
    ) -> Result<(), TransportError> {
        if writer.is_some() && self.is_connected() {
            return Ok(());
        }
        // Clean up whatever a failed read loop left behind.
        self.teardown(writer, "reconnecting".to_string()).await;

        let endpoint = self.endpoint().to_string();
        debug!(endpoint = %endpoint, "connecting");
        let stream = match tokio::time::timeout(self.connect_timeout, self.connector.connect()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(endpoint = %endpoint, error = %e, "connect failed");
                return Err(TransportError::Io(e));
            }
            Err(_) => {
                warn!(endpoint = %endpoint, "connect timed out");
                return Err(TransportError::ConnectTimeout {
                    endpoint,
                    timeout_ms: self.connect_timeout.as_millis() as u64,
                });
            }
        };

        let (read_half, write_half) = tokio::io::split(stream);
        self.shared.reassembler.lock().clear();
        let generation = {
            let mut link = self.shared.link.lock();
            link.generation += 1;
            link.connected = true;
            link.generation
        };

        let handle = tokio::spawn(read_loop(
            read_half,
            generation,
            self.read_buffer_size,
            Arc::clone(&self.shared),
            self.events.clone(),
            self.labels.clone(),
        ));
        *self.reader.lock() = Some(handle);
        *writer = Some(write_half);

        metrics::counter!(metric_defs::CONNECTS.name, &self.labels.to_labels()).increment(1);
        info!(endpoint = %endpoint, "connected to gateway");
        Ok(())
    }

    async fn teardown(&self, writer: &mut Option<WriteHalf<C::Stream>>, reason: String) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        if let Some(mut stream) = writer.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(endpoint = %self.endpoint(), error = %e, "shutdown failed");
            }
        }
        self.shared.reassembler.lock().clear();

        let was_connected = {
            let mut link = self.shared.link.lock();
            link.generation += 1;
            std::mem::replace(&mut link.connected, false)
        };
        if was_connected {
            metrics::counter!(metric_defs::DISCONNECTS.name, &self.labels.to_labels()).increment(1);
            info!(endpoint = %self.endpoint(), reason = %reason, "disconnected from gateway");
            let _ = self.events.send(TransportEvent::Disconnected { reason });
        }
    }
}

impl<C: Connector> Drop for TransportSession<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.abort();
        }
    }
}

// ============================================================================
// Read Loop
// ============================================================================

async fn read_loop<S>(
    mut reader: ReadHalf<S>,
    generation: u64,
    buffer_size: usize,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<TransportEvent>,
    labels: GatewayLabels,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut buf = vec![0u8; buffer_size];

    let reason = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break "connection closed by gateway".to_string(),
            Ok(n) => n,
            Err(e) => break format!("read failed: {}", e),
        };
        let chunk = &buf[..n];
        trace!(endpoint = %labels.gateway, data = %hex::encode(chunk), "rx");
        metrics::counter!(metric_defs::BYTES_RECEIVED.name, &labels.to_labels()).increment(n as u64);

        let started = Instant::now();
        let (frames, before, after) = {
            let mut reassembler = shared.reassembler.lock();
            let before = reassembler.stats();
            let frames = reassembler.feed(chunk);
            (frames, before, reassembler.stats())
        };
        record_framing(&labels, before, after);

        for frame in frames {
            metrics::counter!(
                metric_defs::FRAMES_DECODED.name,
                &labels.with(&[("opcode", opcode_name(frame.opcode).to_string())])
            )
            .increment(1);
            if events.send(TransportEvent::Frame(frame)).is_err() {
                debug!(endpoint = %labels.gateway, "frame receiver dropped; stopping read loop");
                return;
            }
        }
        trace!(elapsed_us = started.elapsed().as_micros() as u64, "chunk dispatched");
    };

    if shared.mark_lost(generation) {
        shared.reassembler.lock().clear();
        metrics::counter!(metric_defs::DISCONNECTS.name, &labels.to_labels()).increment(1);
        warn!(endpoint = %labels.gateway, reason = %reason, "gateway link lost");
        let _ = events.send(TransportEvent::Disconnected { reason });
    } else {
        debug!(endpoint = %labels.gateway, reason = %reason, "stale read loop ended");
    }
}

fn record_framing(labels: &GatewayLabels, before: ReassemblerStats, after: ReassemblerStats) {
    let corrupt = after.corrupt.saturating_sub(before.corrupt);
    let discarded = after.discarded_bytes.saturating_sub(before.discarded_bytes);
    if corrupt > 0 {
        metrics::counter!(metric_defs::FRAMES_CORRUPT.name, &labels.to_labels()).increment(corrupt);
    }
    if discarded > 0 {
        metrics::counter!(metric_defs::BYTES_DISCARDED.name, &labels.to_labels())
            .increment(discarded);
    }
}
