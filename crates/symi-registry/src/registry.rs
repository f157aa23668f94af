//! The device registry.
//!
//! Records are keyed by [`DeviceRecord::unique_id`]; a MAC is never stored
//! twice. Nothing here deletes records except [`DeviceRegistry::clear`].

use std::collections::BTreeMap;

use chrono::Utc;
use symi_protocol::{DeviceListRecord, DiscoveryReport, MacAddress, MsgType};
use tracing::{debug, info, warn};

use crate::device::DeviceRecord;
use crate::error::RegistryError;

/// Serializable form of the registry: device id → record.
pub type RegistrySnapshot = BTreeMap<String, DeviceRecord>;

/// A re-sighted device reported a different type or sub-type than it had
/// when first seen. The stored values are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnomaly {
    pub unique_id: String,
    pub stored_type: u8,
    pub stored_sub_type: u8,
    pub reported_type: u8,
    pub reported_sub_type: u8,
}

/// Result of [`DeviceRegistry::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting; a record was created.
    Inserted,
    /// Known device; address, online flag and last-seen were refreshed.
    Updated {
        /// Set if the reported type/sub-type disagrees with the stored one.
        anomaly: Option<TypeAnomaly>,
    },
}

impl UpsertOutcome {
    /// Returns true if a record was created.
    pub fn is_new(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted)
    }
}

/// Result of [`DeviceRegistry::record_discovery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Never seen before; a record without an address was created.
    New,
    /// Already known; only last-seen and RSSI were refreshed.
    Known,
}

/// State keys written by a node event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub unique_id: String,
    pub network_address: u16,
    /// Keys written; empty if the message type carries no tracked state.
    pub changed: Vec<String>,
}

/// Canonical set of known devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if no device is known.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Insert a device-list entry, or refresh the matching record.
    pub fn upsert(&mut self, record: &DeviceListRecord) -> UpsertOutcome {
        let now = Utc::now();
        let id = record.mac.unique_id();

        let Some(existing) = self.devices.get_mut(&id) else {
            let device = DeviceRecord::from_list_record(record, now);
            info!(
                id = %device.unique_id,
                mac = %device.mac,
                naddr = format_args!("0x{:04X}", device.network_address),
                device_type = device.device_type,
                channels = device.channel_count,
                "new device"
            );
            self.devices.insert(id, device);
            return UpsertOutcome::Inserted;
        };

        let anomaly = (existing.device_type != record.device_type
            || existing.device_sub_type != record.device_sub_type)
            .then(|| TypeAnomaly {
                unique_id: id.clone(),
                stored_type: existing.device_type,
                stored_sub_type: existing.device_sub_type,
                reported_type: record.device_type,
                reported_sub_type: record.device_sub_type,
            });
        if let Some(anomaly) = &anomaly {
            warn!(?anomaly, "device reported a different type; keeping stored profile");
        }

        existing.network_address = record.network_address;
        existing.online = record.online;
        existing.last_seen = now;
        debug!(id = %id, online = record.online, "device refreshed");

        UpsertOutcome::Updated { anomaly }
    }

    /// Record a scan sighting. Unknown MACs get a record with address 0.
    pub fn record_discovery(&mut self, report: &DiscoveryReport) -> DiscoveryOutcome {
        let now = Utc::now();
        let id = report.mac.unique_id();

        match self.devices.get_mut(&id) {
            Some(existing) => {
                existing.rssi = Some(report.rssi);
                existing.last_seen = now;
                DiscoveryOutcome::Known
            }
            None => {
                let device = DeviceRecord::from_discovery(report, now);
                info!(id = %id, mac = %device.mac, rssi = report.rssi, "device discovered");
                self.devices.insert(id, device);
                DiscoveryOutcome::New
            }
        }
    }

    /// Finalize pairing: store the assigned address and mark the device online.
    pub fn assign_network_address(
        &mut self,
        mac: &MacAddress,
        network_address: u16,
    ) -> Result<&DeviceRecord, RegistryError> {
        let id = mac.unique_id();
        let device = self
            .devices
            .get_mut(&id)
            .ok_or_else(|| RegistryError::UnknownDevice(mac.to_string()))?;
        device.network_address = network_address;
        device.online = true;
        device.last_seen = Utc::now();
        info!(id = %id, naddr = format_args!("0x{:04X}", network_address), "device paired");
        Ok(device)
    }

    /// Apply a node state report to the device holding `network_address`.
    pub fn apply_node_event(
        &mut self,
        network_address: u16,
        msg_type: MsgType,
        value: u8,
    ) -> Result<StateChange, RegistryError> {
        let id = self
            .id_for_address(network_address)
            .ok_or(RegistryError::UnknownNetworkAddress(network_address))?;
        let device = self
            .devices
            .get_mut(&id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.clone()))?;

        let changed = device.apply_event(msg_type, value);
        device.last_seen = Utc::now();

        Ok(StateChange {
            unique_id: id,
            network_address,
            changed,
        })
    }

    fn id_for_address(&self, network_address: u16) -> Option<String> {
        if network_address == 0 {
            return None;
        }
        let mut matches = self
            .devices
            .values()
            .filter(|d| d.network_address == network_address);
        let first = matches.next()?;
        if matches.next().is_some() {
            warn!(
                naddr = format_args!("0x{:04X}", network_address),
                chosen = %first.unique_id,
                "several devices share a network address"
            );
        }
        Some(first.unique_id.clone())
    }

    /// Forget every device. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.devices.len();
        self.devices.clear();
        removed
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Look up by identity key.
    pub fn get_by_id(&self, unique_id: &str) -> Option<&DeviceRecord> {
        self.devices.get(unique_id)
    }

    /// Look up by MAC address.
    pub fn get_by_mac(&self, mac: &MacAddress) -> Option<&DeviceRecord> {
        self.devices.get(&mac.unique_id())
    }

    /// Look up by network address. Address 0 never matches.
    pub fn get_by_network_address(&self, network_address: u16) -> Option<&DeviceRecord> {
        self.id_for_address(network_address)
            .and_then(|id| self.devices.get(&id))
    }

    /// Every device, ordered by id.
    pub fn get_all(&self) -> Vec<&DeviceRecord> {
        self.devices.values().collect()
    }

    /// Devices carrying a capability tag.
    pub fn get_by_capability(&self, capability: &str) -> Vec<&DeviceRecord> {
        self.devices
            .values()
            .filter(|d| d.has_capability(capability))
            .collect()
    }

    /// Devices of one type code.
    pub fn get_by_type(&self, device_type: u8) -> Vec<&DeviceRecord> {
        self.devices
            .values()
            .filter(|d| d.device_type == device_type)
            .collect()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Copy of every record, keyed by id.
    pub fn to_snapshot(&self) -> RegistrySnapshot {
        self.devices.clone()
    }

    /// Rebuild from a snapshot. Keys must match the id of the stored MAC.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Result<Self, RegistryError> {
        for (key, device) in &snapshot {
            let derived = device.mac.unique_id();
            if *key != derived || device.unique_id != derived {
                return Err(RegistryError::IdentityMismatch {
                    key: key.clone(),
                    derived,
                });
            }
        }
        Ok(DeviceRegistry { devices: snapshot })
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, RegistryError> {
        Ok(serde_json::to_string_pretty(&self.devices)?)
    }

    /// Parse a JSON snapshot.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let snapshot: RegistrySnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }
}
