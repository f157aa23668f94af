//! Gateway session: link state, command surface and frame dispatch.
//!
//! A [`GatewaySession`] owns one [`TransportSession`], the [`DeviceRegistry`]
//! for that gateway and the [`StatusSyncScheduler`]. Frames from the read loop
//! are handled one at a time by a dispatch task, in wire order. Registry
//! changes are pushed into the [`EventSender`] given to [`GatewaySession::new`].
//!
//! Sends only report whether the bytes left the socket. The protocol has no
//! request ids, so the effect of a command shows up later as a response or
//! event frame matched by opcode alone.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use symi_metrics::{metric_defs, metrics, GatewayLabels};
use symi_protocol::{
    opcode_name, switch_all_param, switch_channel_param, Command, CurtainAction, Frame,
    MacAddress, Message, MsgType, ReassemblerStats,
};
use symi_registry::{
    DeviceRecord, DeviceRegistry, DiscoveryOutcome, RegistryError, UpsertOutcome,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::events::{emit, EventSender, GatewayEvent, GatewayInfo};
use crate::sync::{triggers_status_sync, StatusSyncScheduler};
use crate::transport::{Connector, TransportEvent, TransportSession};

/// Gap between the three gateway info queries.
pub const INFO_QUERY_SPACING: Duration = Duration::from_millis(500);

/// Highest brightness / colour temperature / curtain position value.
const PERCENT_MAX: u8 = 100;

// ============================================================================
// Link State
// ============================================================================

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Ready,
    Scanning,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Ready => "ready",
            LinkState::Scanning => "scanning",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct LinkStatus {
    state: LinkState,
    /// When the current scan window opened.
    scan_started: Option<Instant>,
}

// ============================================================================
// Gateway Session
// ============================================================================

/// Handle to one gateway. Cheap to clone; clones share the session.
///
/// Must be created inside a tokio runtime.
pub struct GatewaySession<C: Connector> {
    inner: Arc<SessionInner<C>>,
}

impl<C: Connector> Clone for GatewaySession<C> {
    fn clone(&self) -> Self {
        GatewaySession {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<C: Connector> {
    config: GatewayConfig,
    transport: TransportSession<C>,
    registry: RwLock<DeviceRegistry>,
    link: Mutex<LinkStatus>,
    info: Mutex<GatewayInfo>,
    sync: StatusSyncScheduler,
    events: EventSender,
    labels: GatewayLabels,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connector> GatewaySession<C> {
    /// Create a disconnected session and start its dispatch task.
    pub fn new(connector: C, config: GatewayConfig, events: EventSender) -> Self {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let transport = TransportSession::new(connector, &config, frame_tx);
        let labels = GatewayLabels::new(transport.endpoint());

        let inner = Arc::new(SessionInner {
            sync: StatusSyncScheduler::new(config.status_sync_delay()),
            config,
            transport,
            registry: RwLock::new(DeviceRegistry::new()),
            link: Mutex::new(LinkStatus {
                state: LinkState::Disconnected,
                scan_started: None,
            }),
            info: Mutex::new(GatewayInfo::default()),
            events,
            labels,
            dispatcher: Mutex::new(None),
        });

        let handle = tokio::spawn(dispatch_loop(Arc::downgrade(&inner), frame_rx));
        *inner.dispatcher.lock() = Some(handle);

        GatewaySession { inner }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Current state. An expired scan window is closed here.
    pub fn link_state(&self) -> LinkState {
        self.inner.refresh_scan_state()
    }

    pub fn is_scanning(&self) -> bool {
        self.link_state() == LinkState::Scanning
    }

    /// Time left in the scan window, or `None` when not scanning.
    pub fn scan_remaining(&self) -> Option<Duration> {
        self.inner.refresh_scan_state();
        let link = self.inner.link.lock();
        let started = link.scan_started?;
        Some(self.inner.config.scan_timeout().saturating_sub(started.elapsed()))
    }

    /// Cumulative framing statistics for the link.
    pub fn link_stats(&self) -> ReassemblerStats {
        self.inner.transport.reassembler_stats()
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Connect to the gateway.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        {
            let mut link = self.inner.link.lock();
            if link.state == LinkState::Disconnected {
                link.state = LinkState::Connecting;
            }
        }
        match self.inner.transport.connect().await {
            Ok(()) => {
                self.inner.mark_connected();
                Ok(())
            }
            Err(e) => {
                let mut link = self.inner.link.lock();
                if link.state == LinkState::Connecting {
                    link.state = LinkState::Disconnected;
                }
                Err(e.into())
            }
        }
    }

    /// Close the link and cancel any pending resync. Idempotent.
    pub async fn disconnect(&self) {
        self.inner.transport.disconnect().await;
        self.inner.mark_disconnected("disconnect requested");
    }

    // ========================================================================
    // Gateway Commands
    // ========================================================================

    /// Enter scan mode. A no-op while already scanning.
    pub async fn start_scan(&self) -> Result<(), GatewayError> {
        if self.is_scanning() {
            debug!("already scanning");
            return Ok(());
        }
        self.inner.send(&Command::StartScan).await
    }

    /// Leave scan mode. A no-op while not scanning.
    pub async fn stop_scan(&self) -> Result<(), GatewayError> {
        if !self.is_scanning() {
            debug!("not scanning");
            return Ok(());
        }
        self.inner.send(&Command::StopScan).await
    }

    pub async fn read_device_list(&self) -> Result<(), GatewayError> {
        self.inner.send(&Command::ReadDeviceList).await
    }

    pub async fn read_software_version(&self) -> Result<(), GatewayError> {
        self.inner.send(&Command::ReadSoftwareVersion).await
    }

    pub async fn read_mac_address(&self) -> Result<(), GatewayError> {
        self.inner.send(&Command::ReadMacAddress).await
    }

    pub async fn read_device_count(&self) -> Result<(), GatewayError> {
        self.inner.send(&Command::ReadDeviceCount).await
    }

    /// Query version, MAC and device count, spaced out so the gateway
    /// answers each one.
    pub async fn read_gateway_info(&self) -> Result<(), GatewayError> {
        self.read_software_version().await?;
        tokio::time::sleep(INFO_QUERY_SPACING).await;
        self.read_mac_address().await?;
        tokio::time::sleep(INFO_QUERY_SPACING).await;
        self.read_device_count().await
    }

    /// Wipe every paired node from the gateway.
    pub async fn factory_reset(&self) -> Result<(), GatewayError> {
        warn!(endpoint = %self.inner.labels.gateway, "factory reset requested");
        self.inner.send(&Command::FactoryReset).await
    }

    pub async fn reboot(&self) -> Result<(), GatewayError> {
        info!(endpoint = %self.inner.labels.gateway, "reboot requested");
        self.inner.send(&Command::Reboot).await
    }

    /// Add a node to the whitelist; address 0 lets the gateway pick.
    pub async fn add_device(&self, mac: MacAddress, network_address: u16) -> Result<(), GatewayError> {
        self.inner
            .send(&Command::AddDevice {
                mac,
                network_address,
            })
            .await
    }

    pub async fn delete_device(&self, network_address: u16) -> Result<(), GatewayError> {
        self.inner
            .send(&Command::DeleteDevice { network_address })
            .await
    }

    pub async fn clear_devices(&self) -> Result<(), GatewayError> {
        self.inner.send(&Command::ClearDevices).await
    }

    // ========================================================================
    // Device Commands
    // ========================================================================

    pub async fn control_device(
        &self,
        network_address: u16,
        msg_type: MsgType,
        params: &[u8],
    ) -> Result<(), GatewayError> {
        self.inner
            .send(&Command::Control {
                network_address,
                msg_type,
                params: params.to_vec(),
            })
            .await
    }

    pub async fn query_device_status(
        &self,
        network_address: u16,
        msg_type: MsgType,
    ) -> Result<(), GatewayError> {
        self.inner
            .send(&Command::QueryStatus {
                network_address,
                msg_type,
            })
            .await
    }

    pub async fn control_scene(&self, scene_id: u8) -> Result<(), GatewayError> {
        self.inner.send(&Command::SceneControl { scene_id }).await
    }

    /// Control a device by registry id.
    pub async fn control_device_by_id(
        &self,
        unique_id: &str,
        msg_type: MsgType,
        params: &[u8],
    ) -> Result<(), GatewayError> {
        let device = self.inner.paired_device(unique_id)?;
        self.control_device(device.network_address, msg_type, params)
            .await
    }

    /// Switch one channel (0-based), or every channel when `channel` is `None`.
    pub async fn set_switch(
        &self,
        unique_id: &str,
        channel: Option<u8>,
        on: bool,
    ) -> Result<(), GatewayError> {
        let device = self.inner.paired_device(unique_id)?;
        let param = match channel {
            None if device.channel_count > 1 => switch_all_param(on),
            None => switch_channel_param(0, on).unwrap_or_else(|| switch_all_param(on)),
            Some(ch) if ch < device.channel_count.max(1) => switch_channel_param(ch as usize, on)
                .ok_or_else(|| GatewayError::InvalidChannel {
                    device: unique_id.to_string(),
                    channel: ch,
                })?,
            Some(ch) => {
                return Err(GatewayError::InvalidChannel {
                    device: unique_id.to_string(),
                    channel: ch,
                })
            }
        };
        self.control_device(device.network_address, MsgType::Switch, &[param])
            .await
    }

    /// Brightness in percent, clamped to 100.
    pub async fn set_brightness(&self, unique_id: &str, percent: u8) -> Result<(), GatewayError> {
        self.control_device_by_id(unique_id, MsgType::Brightness, &[percent.min(PERCENT_MAX)])
            .await
    }

    /// Colour temperature in percent of the lamp's range, clamped to 100.
    pub async fn set_color_temp(&self, unique_id: &str, percent: u8) -> Result<(), GatewayError> {
        self.control_device_by_id(unique_id, MsgType::ColorTemp, &[percent.min(PERCENT_MAX)])
            .await
    }

    pub async fn set_curtain(&self, unique_id: &str, action: CurtainAction) -> Result<(), GatewayError> {
        self.control_device_by_id(unique_id, MsgType::CurtainControl, &[action.into()])
            .await
    }

    pub async fn set_curtain_position(&self, unique_id: &str, percent: u8) -> Result<(), GatewayError> {
        self.control_device_by_id(
            unique_id,
            MsgType::CurtainPosition,
            &[percent.min(PERCENT_MAX)],
        )
        .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every known device, ordered by id.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.inner.registry.read().get_all().into_iter().cloned().collect()
    }

    pub fn device(&self, unique_id: &str) -> Option<DeviceRecord> {
        self.inner.registry.read().get_by_id(unique_id).cloned()
    }

    pub fn device_by_network_address(&self, network_address: u16) -> Option<DeviceRecord> {
        self.inner
            .registry
            .read()
            .get_by_network_address(network_address)
            .cloned()
    }

    pub fn devices_with_capability(&self, capability: &str) -> Vec<DeviceRecord> {
        self.inner
            .registry
            .read()
            .get_by_capability(capability)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Last info reported by the gateway.
    pub fn gateway_info(&self) -> GatewayInfo {
        self.inner.info.lock().clone()
    }

    /// Run `f` against the registry under a read lock.
    pub fn with_registry<R>(&self, f: impl FnOnce(&DeviceRegistry) -> R) -> R {
        f(&self.inner.registry.read())
    }

    /// Replace the registry, e.g. with one restored from a snapshot.
    pub fn replace_registry(&self, registry: DeviceRegistry) {
        let count = registry.len();
        *self.inner.registry.write() = registry;
        self.inner.record_registry_size(count);
        info!(devices = count, "registry replaced");
    }

    /// Forget every device locally. The gateway's whitelist is untouched.
    pub fn clear_registry(&self) -> usize {
        let removed = self.inner.registry.write().clear();
        self.inner.record_registry_size(0);
        removed
    }
}

// ============================================================================
// Dispatch
// ============================================================================

async fn dispatch_loop<C: Connector>(
    inner: Weak<SessionInner<C>>,
    mut frames: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = frames.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            TransportEvent::Frame(frame) => inner.handle_frame(frame),
            TransportEvent::Disconnected { reason } => {
                // A send may already have reconnected.
                if inner.transport.is_connected() {
                    debug!(reason = %reason, "ignoring stale disconnect");
                } else {
                    inner.mark_disconnected(&reason);
                }
            }
        }
    }
    trace!("dispatch loop ended");
}

impl<C: Connector> SessionInner<C> {
    async fn send(&self, command: &Command) -> Result<(), GatewayError> {
        let bytes = command.encode()?;
        let labels = self.labels.with(&[("command", command.name().to_string())]);
        let was_connected = self.transport.is_connected();
        let started = std::time::Instant::now();

        match self.transport.send_raw(&bytes).await {
            Ok(()) => {
                metrics::counter!(metric_defs::COMMANDS_SENT.name, &labels).increment(1);
                metrics::histogram!(metric_defs::COMMAND_WRITE_TIME.name, &self.labels.to_labels())
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                debug!(command = command.name(), data = %hex::encode(&bytes), "command sent");
                if !was_connected {
                    self.mark_connected();
                }
                Ok(())
            }
            Err(e) => {
                metrics::counter!(metric_defs::COMMANDS_FAILED.name, &labels).increment(1);
                warn!(command = command.name(), error = %e, "command not sent");
                if !self.transport.is_connected() {
                    self.mark_disconnected("send failed");
                }
                Err(e.into())
            }
        }
    }

    fn mark_connected(&self) {
        let changed = {
            let mut link = self.link.lock();
            match link.state {
                LinkState::Disconnected | LinkState::Connecting => {
                    link.state = LinkState::Ready;
                    true
                }
                LinkState::Ready | LinkState::Scanning => false,
            }
        };
        if changed {
            emit(&self.events, GatewayEvent::ConnectionChanged { connected: true });
        }
    }

    fn mark_disconnected(&self, reason: &str) {
        self.sync.cancel();
        let previous = {
            let mut link = self.link.lock();
            link.scan_started = None;
            std::mem::replace(&mut link.state, LinkState::Disconnected)
        };
        if previous != LinkState::Disconnected {
            info!(reason = %reason, "session disconnected");
            emit(&self.events, GatewayEvent::ConnectionChanged { connected: false });
        }
    }

    /// Close an expired scan window and return the current state.
    fn refresh_scan_state(&self) -> LinkState {
        let timeout = self.config.scan_timeout();
        let (state, expired) = {
            let mut link = self.link.lock();
            let expired = link.state == LinkState::Scanning
                && link.scan_started.is_some_and(|t| t.elapsed() >= timeout);
            if expired {
                link.state = LinkState::Ready;
                link.scan_started = None;
            }
            (link.state, expired)
        };
        if expired {
            info!(timeout_secs = timeout.as_secs(), "scan window elapsed");
            emit(&self.events, GatewayEvent::ScanStateChanged { scanning: false });
        }
        state
    }

    fn set_scanning(&self, scanning: bool) {
        let changed = {
            let mut link = self.link.lock();
            match (link.state, scanning) {
                (LinkState::Scanning, true) => {
                    // Gateway confirmed again; restart the window.
                    link.scan_started = Some(Instant::now());
                    false
                }
                (LinkState::Scanning, false) => {
                    link.state = LinkState::Ready;
                    link.scan_started = None;
                    true
                }
                (_, true) => {
                    link.state = LinkState::Scanning;
                    link.scan_started = Some(Instant::now());
                    true
                }
                (_, false) => false,
            }
        };
        if changed {
            info!(scanning, "scan state changed");
            emit(&self.events, GatewayEvent::ScanStateChanged { scanning });
        }
    }

    fn paired_device(&self, unique_id: &str) -> Result<DeviceRecord, GatewayError> {
        let device = self
            .registry
            .read()
            .get_by_id(unique_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownDevice(unique_id.to_string()))?;
        if device.network_address == 0 {
            return Err(GatewayError::NotPaired(unique_id.to_string()));
        }
        Ok(device)
    }

    fn record_registry_size(&self, count: usize) {
        metrics::gauge!(metric_defs::REGISTRY_DEVICES.name, &self.labels.to_labels()).set(count as f64);
    }

    fn schedule_status_sync(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.sync.schedule(move || async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            metrics::counter!(metric_defs::STATUS_SYNCS.name, &inner.labels.to_labels()).increment(1);
            debug!("status sync: re-reading device list");
            if let Err(e) = inner.send(&Command::ReadDeviceList).await {
                warn!(error = %e, "status sync failed");
            }
        });
    }

    // ========================================================================
    // Frame Handlers
    // ========================================================================

    fn handle_frame(self: &Arc<Self>, frame: Frame) {
        trace!(frame = %frame, "frame received");
        self.refresh_scan_state();

        if triggers_status_sync(frame.opcode) {
            self.schedule_status_sync();
        }

        match Message::decode(&frame) {
            Ok(message) => self.handle_message(message),
            Err(e) => warn!(frame = %frame, error = %e, "failed to decode frame"),
        }
    }

    fn handle_message(self: &Arc<Self>, message: Message) {
        match message {
            Message::ScanStarted => self.set_scanning(true),
            Message::ScanStopped => self.set_scanning(false),

            Message::DeviceDiscovered(report) => {
                if report.vendor_id != self.config.accepted_vendor_id {
                    trace!(
                        mac = %report.mac,
                        vendor_id = format_args!("0x{:04X}", report.vendor_id),
                        "ignoring foreign vendor"
                    );
                    return;
                }
                let (outcome, device, count) = {
                    let mut registry = self.registry.write();
                    let outcome = registry.record_discovery(&report);
                    let device = registry.get_by_mac(&report.mac).cloned();
                    (outcome, device, registry.len())
                };
                if outcome == DiscoveryOutcome::Known {
                    trace!(mac = %report.mac, rssi = report.rssi, "device seen again");
                    return;
                }
                self.record_registry_size(count);
                if let Some(device) = device {
                    emit(&self.events, GatewayEvent::DeviceDiscovered(device));
                }
                if self.config.auto_whitelist {
                    self.spawn_auto_whitelist(report.mac);
                }
            }

            Message::DeviceList(records) => {
                if records.is_empty() {
                    debug!("end of device list");
                    return;
                }
                for record in &records {
                    self.apply_list_record(record);
                }
                self.record_registry_size(self.registry.read().len());
            }

            Message::DevicePaired(report) => {
                let result = self
                    .registry
                    .write()
                    .assign_network_address(&report.mac, report.network_address)
                    .cloned();
                match result {
                    Ok(device) => emit(&self.events, GatewayEvent::DeviceUpdated(device)),
                    Err(e) => warn!(
                        mac = %report.mac,
                        naddr = format_args!("0x{:04X}", report.network_address),
                        error = %e,
                        "pairing reported for an untracked device; waiting for the device list"
                    ),
                }
            }

            Message::PairingFailed { payload } => {
                warn!(payload = %hex::encode(&payload), "pairing failed");
            }

            Message::NodeStatus(event) => {
                let value = event.primary_value();
                let result = {
                    let mut registry = self.registry.write();
                    registry
                        .apply_node_event(event.network_address, event.msg_type, value)
                        .map(|change| {
                            let device = registry.get_by_id(&change.unique_id).cloned();
                            (change, device)
                        })
                };
                match result {
                    Ok((change, Some(device))) if !change.changed.is_empty() => {
                        debug!(id = %change.unique_id, changed = ?change.changed, "device state changed");
                        emit(
                            &self.events,
                            GatewayEvent::DeviceStateChanged {
                                device,
                                changed: change.changed,
                            },
                        );
                    }
                    Ok((change, _)) => {
                        trace!(id = %change.unique_id, msg_type = ?event.msg_type, "untracked message type");
                    }
                    Err(e) => {
                        metrics::counter!(metric_defs::NODE_EVENTS_DROPPED.name, &self.labels.to_labels())
                            .increment(1);
                        warn!(
                            naddr = format_args!("0x{:04X}", event.network_address),
                            msg_type = ?event.msg_type,
                            error = %e,
                            "dropping node event"
                        );
                    }
                }
            }

            Message::NodeAck { payload } => {
                debug!(payload = %hex::encode(&payload), "node acknowledged");
            }

            Message::SoftwareVersion(version) => {
                self.update_info(|info| info.software_version = Some(version.to_string()));
            }
            Message::GatewayMac(mac) => {
                self.update_info(|info| info.mac_address = Some(mac));
            }
            Message::DeviceCount(count) => {
                self.update_info(|info| info.device_count = Some(count));
            }

            Message::CommandResult {
                opcode,
                status,
                payload,
            } => {
                if status.is_success() {
                    debug!(response = opcode_name(opcode), "command acknowledged");
                } else {
                    warn!(
                        response = opcode_name(opcode),
                        status = %status,
                        payload = %hex::encode(&payload),
                        "command rejected by gateway"
                    );
                }
            }

            Message::Unknown(frame) => {
                debug!(frame = %frame, "ignoring unrecognised frame");
            }
        }
    }

    fn apply_list_record(&self, record: &symi_protocol::DeviceListRecord) {
        let (outcome, before, device) = {
            let mut registry = self.registry.write();
            let before = registry
                .get_by_mac(&record.mac)
                .map(|d| (d.network_address, d.online));
            let outcome = registry.upsert(record);
            let device = registry.get_by_mac(&record.mac).cloned();
            (outcome, before, device)
        };
        let Some(device) = device else {
            return;
        };

        match outcome {
            UpsertOutcome::Inserted => emit(&self.events, GatewayEvent::DeviceDiscovered(device)),
            UpsertOutcome::Updated { anomaly } => {
                if let Some(anomaly) = anomaly {
                    metrics::counter!(metric_defs::DEVICE_ANOMALIES.name, &self.labels.to_labels())
                        .increment(1);
                    emit(&self.events, GatewayEvent::DeviceAnomaly(anomaly));
                }
                if before != Some((device.network_address, device.online)) {
                    emit(&self.events, GatewayEvent::DeviceUpdated(device));
                }
            }
        }
    }

    fn update_info(&self, update: impl FnOnce(&mut GatewayInfo)) {
        let info = {
            let mut info = self.info.lock();
            update(&mut *info);
            info.clone()
        };
        info!(info = %info, "gateway info updated");
        emit(&self.events, GatewayEvent::GatewayInfoUpdated(info));
    }

    fn spawn_auto_whitelist(self: &Arc<Self>, mac: MacAddress) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            info!(mac = %mac, "adding discovered device to whitelist");
            let command = Command::AddDevice {
                mac,
                network_address: 0,
            };
            if let Err(e) = inner.send(&command).await {
                warn!(mac = %mac, error = %e, "auto whitelist failed");
            }
        });
    }
}

impl<C: Connector> Drop for SessionInner<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
    }
}
