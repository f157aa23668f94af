//! Device records and state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use symi_protocol::{
    DeviceListRecord, DiscoveryReport, MacAddress, MsgType, CURTAIN_CLOSING, CURTAIN_OPENING,
    CURTAIN_STOPPED,
};

use crate::capability::*;

// ============================================================================
// State Values
// ============================================================================

/// State key for the curtain motion.
pub const STATE_COVER: &str = "cover_state";

/// Upper bound for percentage-valued state.
const PERCENT_MAX: u8 = 100;

/// Curtain motion reported by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverMotion {
    Opening,
    Closing,
    Stopped,
}

impl CoverMotion {
    /// Map a curtain-control value; unknown codes yield `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            CURTAIN_OPENING => Some(CoverMotion::Opening),
            CURTAIN_CLOSING => Some(CoverMotion::Closing),
            CURTAIN_STOPPED => Some(CoverMotion::Stopped),
            _ => None,
        }
    }
}

/// A single state value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// On/off.
    Bool(bool),
    /// Percentage, 0-100.
    Percent(u8),
    /// Curtain motion.
    Cover(CoverMotion),
}

impl StateValue {
    /// Convert to bool if possible.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(v) => write!(f, "{}", if *v { "on" } else { "off" }),
            StateValue::Percent(v) => write!(f, "{}%", v),
            StateValue::Cover(v) => write!(f, "{:?}", v),
        }
    }
}

// ============================================================================
// Device Record
// ============================================================================

/// Everything the bridge knows about one mesh node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Node MAC address, serialized as `AA:BB:CC:DD:EE:FF`.
    #[serde(with = "mac_string")]
    pub mac: MacAddress,
    /// Identity key: lowercase MAC without separators.
    pub unique_id: String,
    /// Display name.
    pub name: String,
    /// Mesh network address; 0 while unassigned.
    pub network_address: u16,
    pub vendor_id: u16,
    pub device_type: u8,
    pub device_sub_type: u8,
    pub online: bool,
    /// Signal strength of the latest scan sighting.
    #[serde(default)]
    pub rssi: Option<i8>,
    /// Capability tags, fixed at first sight.
    pub capabilities: BTreeSet<String>,
    /// Switchable channels, fixed at first sight.
    pub channel_count: u8,
    #[serde(default)]
    pub state: BTreeMap<String, StateValue>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    /// Create a record, deriving capabilities, channel count and name.
    pub fn new(
        mac: MacAddress,
        network_address: u16,
        vendor_id: u16,
        device_type: u8,
        device_sub_type: u8,
        online: bool,
        last_seen: DateTime<Utc>,
    ) -> Self {
        let profile = derive_profile(device_type, device_sub_type);
        DeviceRecord {
            mac,
            unique_id: mac.unique_id(),
            name: default_name(device_type, device_sub_type, &mac),
            network_address,
            vendor_id,
            device_type,
            device_sub_type,
            online,
            rssi: None,
            capabilities: profile.capabilities,
            channel_count: profile.channel_count,
            state: BTreeMap::new(),
            last_seen,
        }
    }

    /// Build from a device-list entry.
    pub fn from_list_record(record: &DeviceListRecord, seen: DateTime<Utc>) -> Self {
        DeviceRecord::new(
            record.mac,
            record.network_address,
            record.vendor_id,
            record.device_type,
            record.device_sub_type,
            record.online,
            seen,
        )
    }

    /// Build from a scan sighting. The node has no address and is not yet
    /// online.
    pub fn from_discovery(report: &DiscoveryReport, seen: DateTime<Utc>) -> Self {
        let mut record = DeviceRecord::new(
            report.mac,
            0,
            report.vendor_id,
            report.device_type,
            report.device_sub_type,
            false,
            seen,
        );
        record.rssi = Some(report.rssi);
        record
    }

    /// Returns true if the device has the capability tag.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Look up one state value.
    pub fn state_value(&self, key: &str) -> Option<StateValue> {
        self.state.get(key).copied()
    }

    /// State key for a switch channel (0-based).
    pub fn switch_key(&self, channel: u8) -> String {
        if self.channel_count <= 1 {
            CAP_SWITCH.to_string()
        } else {
            switch_channel_key(channel + 1)
        }
    }

    /// Fold a node state report into `state`.
    ///
    /// Returns the keys that were written; empty when the message type
    /// carries no tracked state.
    pub fn apply_event(&mut self, msg_type: MsgType, value: u8) -> Vec<String> {
        let mut written = Vec::new();

        match msg_type {
            MsgType::Switch => {
                // Channel i is bit (i + 1); a single-channel switch uses bit 1.
                for channel in 0..self.channel_count.max(1) {
                    let on = (value as u16) & (1u16 << (channel + 1)) != 0;
                    let key = self.switch_key(channel);
                    self.state.insert(key.clone(), StateValue::Bool(on));
                    written.push(key);
                }
            }
            MsgType::Brightness => {
                written.push(self.set_percent(CAP_BRIGHTNESS, value));
            }
            MsgType::ColorTemp => {
                written.push(self.set_percent(CAP_COLOR_TEMP, value));
            }
            MsgType::CurtainPosition => {
                written.push(self.set_percent(CAP_POSITION, value));
            }
            MsgType::CurtainControl => {
                if let Some(motion) = CoverMotion::from_code(value) {
                    self.state
                        .insert(STATE_COVER.to_string(), StateValue::Cover(motion));
                    written.push(STATE_COVER.to_string());
                }
            }
            _ => {}
        }

        written
    }

    fn set_percent(&mut self, key: &str, value: u8) -> String {
        self.state
            .insert(key.to_string(), StateValue::Percent(value.min(PERCENT_MAX)));
        key.to_string()
    }
}

/// Serialize a [`MacAddress`] as its colon-separated string form.
mod mac_string {
    use super::*;

    pub fn serialize<S>(mac: &MacAddress, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&mac.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<MacAddress, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symi_protocol::*;

    fn switch(sub_type: u8) -> DeviceRecord {
        DeviceRecord::new(
            MacAddress::new([0x14, 0x27, 0xC9, 0x20, 0xDA, 0xCC]),
            0x0131,
            SYMI_VENDOR_ID,
            DEVICE_TYPE_ZERO_FIRE_SWITCH,
            sub_type,
            true,
            Utc::now(),
        )
    }

    #[test]
    fn test_three_channel_switch_bits() {
        let mut device = switch(3);
        let written = device.apply_event(MsgType::Switch, 0b0000_0110);
        assert_eq!(written, vec!["switch_1", "switch_2", "switch_3"]);
        assert_eq!(device.state_value("switch_1"), Some(StateValue::Bool(true)));
        assert_eq!(device.state_value("switch_2"), Some(StateValue::Bool(true)));
        assert_eq!(device.state_value("switch_3"), Some(StateValue::Bool(false)));
    }

    #[test]
    fn test_single_channel_switch_uses_bit_one() {
        let mut device = switch(0);
        device.apply_event(MsgType::Switch, 0x02);
        assert_eq!(device.state_value("switch"), Some(StateValue::Bool(true)));
        device.apply_event(MsgType::Switch, 0x01);
        assert_eq!(device.state_value("switch"), Some(StateValue::Bool(false)));
    }

    #[test]
    fn test_eight_channel_switch_high_bit() {
        let mut device = switch(8);
        device.apply_event(MsgType::Switch, 0x00);
        assert_eq!(device.state_value("switch_8"), Some(StateValue::Bool(false)));
        device.apply_event(MsgType::Switch, 0x80);
        assert_eq!(device.state_value("switch_7"), Some(StateValue::Bool(true)));
    }

    #[test]
    fn test_percentages_are_clamped() {
        let mut device = switch(1);
        device.apply_event(MsgType::Brightness, 150);
        device.apply_event(MsgType::ColorTemp, 40);
        device.apply_event(MsgType::CurtainPosition, 255);
        assert_eq!(device.state_value("brightness"), Some(StateValue::Percent(100)));
        assert_eq!(device.state_value("color_temp"), Some(StateValue::Percent(40)));
        assert_eq!(device.state_value("position"), Some(StateValue::Percent(100)));
    }

    #[test]
    fn test_curtain_motion() {
        let mut device = switch(1);
        assert_eq!(device.apply_event(MsgType::CurtainControl, 2), vec!["cover_state"]);
        assert_eq!(
            device.state_value(STATE_COVER),
            Some(StateValue::Cover(CoverMotion::Closing))
        );
        assert!(device.apply_event(MsgType::CurtainControl, 9).is_empty());
        assert_eq!(
            device.state_value(STATE_COVER),
            Some(StateValue::Cover(CoverMotion::Closing))
        );
    }

    #[test]
    fn test_untracked_message_type() {
        let mut device = switch(1);
        assert!(device.apply_event(MsgType::ConfigLock, 1).is_empty());
        assert!(device.state.is_empty());
    }

    #[test]
    fn test_serde_shape() {
        let mut device = switch(2);
        device.apply_event(MsgType::Switch, 0x02);
        device.apply_event(MsgType::CurtainControl, 1);
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["mac"], "14:27:C9:20:DA:CC");
        assert_eq!(json["unique_id"], "1427c920dacc");
        assert_eq!(json["state"]["switch_1"], true);
        assert_eq!(json["state"]["cover_state"], "opening");

        let back: DeviceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, device);
    }
}
