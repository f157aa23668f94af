//! Common types carried in frame payloads.

use std::fmt;
use std::str::FromStr;

use crate::constants::*;
use crate::error::ProtocolError;

/// A 6-byte node MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; MAC_SIZE]);

impl MacAddress {
    /// Create a MAC address from bytes.
    pub fn new(bytes: [u8; MAC_SIZE]) -> Self {
        MacAddress(bytes)
    }

    /// Create from the first six bytes of a slice.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; MAC_SIZE] = slice.get(..MAC_SIZE)?.try_into().ok()?;
        Some(MacAddress(bytes))
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; MAC_SIZE] {
        &self.0
    }

    /// Stable identity key: lowercase hex without separators.
    pub fn unique_id(&self) -> String {
        hex::encode(self.0)
    }

    /// Last four hex digits, used to tell devices of the same type apart.
    pub fn short_suffix(&self) -> String {
        hex::encode_upper(&self.0[MAC_SIZE - 2..])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for MacAddress {
    type Err = ProtocolError;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff` or `aabbccddeeff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let bytes = hex::decode(&compact).map_err(|_| ProtocolError::InvalidMac(s.to_string()))?;
        MacAddress::from_slice(&bytes)
            .filter(|_| bytes.len() == MAC_SIZE)
            .ok_or_else(|| ProtocolError::InvalidMac(s.to_string()))
    }
}

fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// One entry of a device-list response.
///
/// ```text
/// | max | index | mac[6] | naddr_le16 | vendor_le16 | type | subtype | status | resv |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceListRecord {
    /// Number of records in the batch.
    pub batch_size: u8,
    /// Position of this record in the batch.
    pub index: u8,
    /// Node MAC address.
    pub mac: MacAddress,
    /// Mesh network address (0 = unassigned).
    pub network_address: u16,
    /// Vendor id.
    pub vendor_id: u16,
    /// Device type code.
    pub device_type: u8,
    /// Device sub-type (channel count for switches).
    pub device_sub_type: u8,
    /// Status bit 0.
    pub online: bool,
    /// Status bit 1.
    pub only_tmall: bool,
}

impl DeviceListRecord {
    /// Decode one 16-byte record.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < DEVICE_RECORD_SIZE {
            return Err(ProtocolError::FrameTooShort {
                expected: DEVICE_RECORD_SIZE,
                actual: data.len(),
            });
        }
        let status = data[14];
        Ok(DeviceListRecord {
            batch_size: data[0],
            index: data[1],
            mac: MacAddress::from_slice(&data[2..8]).unwrap_or_default(),
            network_address: le_u16(data, 8),
            vendor_id: le_u16(data, 10),
            device_type: data[12],
            device_sub_type: data[13],
            online: status & DEVICE_STATUS_ONLINE != 0,
            only_tmall: status & DEVICE_STATUS_ONLY_TMALL != 0,
        })
    }

    /// Decode a device-list payload: zero or more whole records.
    pub fn decode_all(payload: &[u8]) -> Result<Vec<Self>, ProtocolError> {
        if payload.len() % DEVICE_RECORD_SIZE != 0 {
            return Err(ProtocolError::invalid_data(format!(
                "device list payload of {} bytes is not a multiple of {}",
                payload.len(),
                DEVICE_RECORD_SIZE
            )));
        }
        payload
            .chunks_exact(DEVICE_RECORD_SIZE)
            .map(DeviceListRecord::decode)
            .collect()
    }

    /// Encode this record, as the gateway would send it.
    pub fn encode(&self) -> [u8; DEVICE_RECORD_SIZE] {
        let mut out = [0u8; DEVICE_RECORD_SIZE];
        out[0] = self.batch_size;
        out[1] = self.index;
        out[2..8].copy_from_slice(self.mac.as_bytes());
        out[8..10].copy_from_slice(&self.network_address.to_le_bytes());
        out[10..12].copy_from_slice(&self.vendor_id.to_le_bytes());
        out[12] = self.device_type;
        out[13] = self.device_sub_type;
        let mut status = 0;
        if self.online {
            status |= DEVICE_STATUS_ONLINE;
        }
        if self.only_tmall {
            status |= DEVICE_STATUS_ONLY_TMALL;
        }
        out[14] = status;
        out
    }
}

/// A node heard during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Signal strength in dBm.
    pub rssi: i8,
    /// Node MAC address.
    pub mac: MacAddress,
    /// Vendor id.
    pub vendor_id: u16,
    /// Device type code.
    pub device_type: u8,
    /// Device sub-type.
    pub device_sub_type: u8,
}

impl DiscoveryReport {
    /// Decode a scan discovery payload.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < DISCOVERY_PAYLOAD_LEN {
            return Err(ProtocolError::FrameTooShort {
                expected: DISCOVERY_PAYLOAD_LEN,
                actual: data.len(),
            });
        }
        Ok(DiscoveryReport {
            rssi: data[0] as i8,
            mac: MacAddress::from_slice(&data[1..7]).unwrap_or_default(),
            vendor_id: le_u16(data, 7),
            device_type: data[9],
            device_sub_type: data[10],
        })
    }

    /// Encode this report, as the gateway would send it.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DISCOVERY_PAYLOAD_LEN);
        out.push(self.rssi as u8);
        out.extend_from_slice(self.mac.as_bytes());
        out.extend_from_slice(&self.vendor_id.to_le_bytes());
        out.push(self.device_type);
        out.push(self.device_sub_type);
        out.resize(DISCOVERY_PAYLOAD_LEN, 0);
        out
    }
}

/// A node joined the network and got an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingReport {
    /// Node MAC address.
    pub mac: MacAddress,
    /// Assigned network address.
    pub network_address: u16,
}

impl PairingReport {
    /// Decode a pairing-success payload.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < PAIRING_PAYLOAD_LEN {
            return Err(ProtocolError::FrameTooShort {
                expected: PAIRING_PAYLOAD_LEN,
                actual: data.len(),
            });
        }
        Ok(PairingReport {
            mac: MacAddress::from_slice(&data[..6]).unwrap_or_default(),
            network_address: le_u16(data, 6),
        })
    }
}

/// State report pushed by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    /// Reporting node's network address.
    pub network_address: u16,
    /// What changed.
    pub msg_type: MsgType,
    /// Raw value bytes; the first is the primary value.
    pub value: Vec<u8>,
}

impl NodeEvent {
    /// Decode a node notification payload.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < NODE_EVENT_MIN_LEN {
            return Err(ProtocolError::FrameTooShort {
                expected: NODE_EVENT_MIN_LEN,
                actual: data.len(),
            });
        }
        Ok(NodeEvent {
            network_address: le_u16(data, 0),
            msg_type: MsgType::from(data[2]),
            value: data[3..].to_vec(),
        })
    }

    /// Primary value byte.
    pub fn primary_value(&self) -> u8 {
        self.value.first().copied().unwrap_or_default()
    }
}

/// Node message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    StatusQuery,
    Switch,
    Brightness,
    ColorTemp,
    CurtainControl,
    CurtainPosition,
    ControlSource,
    SoftwareVersion,
    ConfigLock,
    KeyConfig1To4,
    KeyConfig5To6,
    Other(u8),
}

impl From<u8> for MsgType {
    fn from(code: u8) -> Self {
        match code {
            MSG_TYPE_STATUS_QUERY => MsgType::StatusQuery,
            MSG_TYPE_SWITCH => MsgType::Switch,
            MSG_TYPE_BRIGHTNESS => MsgType::Brightness,
            MSG_TYPE_COLOR_TEMP => MsgType::ColorTemp,
            MSG_TYPE_CURTAIN_CONTROL => MsgType::CurtainControl,
            MSG_TYPE_CURTAIN_POSITION => MsgType::CurtainPosition,
            MSG_TYPE_CONTROL_SOURCE => MsgType::ControlSource,
            MSG_TYPE_SOFTWARE_VERSION => MsgType::SoftwareVersion,
            MSG_TYPE_CONFIG_LOCK => MsgType::ConfigLock,
            MSG_TYPE_KEY_CONFIG_1_4 => MsgType::KeyConfig1To4,
            MSG_TYPE_KEY_CONFIG_5_6 => MsgType::KeyConfig5To6,
            other => MsgType::Other(other),
        }
    }
}

impl From<MsgType> for u8 {
    fn from(msg_type: MsgType) -> Self {
        match msg_type {
            MsgType::StatusQuery => MSG_TYPE_STATUS_QUERY,
            MsgType::Switch => MSG_TYPE_SWITCH,
            MsgType::Brightness => MSG_TYPE_BRIGHTNESS,
            MsgType::ColorTemp => MSG_TYPE_COLOR_TEMP,
            MsgType::CurtainControl => MSG_TYPE_CURTAIN_CONTROL,
            MsgType::CurtainPosition => MSG_TYPE_CURTAIN_POSITION,
            MsgType::ControlSource => MSG_TYPE_CONTROL_SOURCE,
            MsgType::SoftwareVersion => MSG_TYPE_SOFTWARE_VERSION,
            MsgType::ConfigLock => MSG_TYPE_CONFIG_LOCK,
            MsgType::KeyConfig1To4 => MSG_TYPE_KEY_CONFIG_1_4,
            MsgType::KeyConfig5To6 => MSG_TYPE_KEY_CONFIG_5_6,
            MsgType::Other(code) => code,
        }
    }
}

/// Gateway firmware version, reported as four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareVersion(pub [u8; 4]);

impl SoftwareVersion {
    /// Decode from a version response payload.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: [u8; 4] = data
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(ProtocolError::FrameTooShort {
                expected: 4,
                actual: data.len(),
            })?;
        Ok(SoftwareVersion(bytes))
    }
}

impl fmt::Display for SoftwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

/// Direction of curtain travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurtainAction {
    Open,
    Close,
    Stop,
}

impl From<CurtainAction> for u8 {
    fn from(action: CurtainAction) -> Self {
        match action {
            CurtainAction::Open => CURTAIN_OPENING,
            CurtainAction::Close => CURTAIN_CLOSING,
            CurtainAction::Stop => CURTAIN_STOPPED,
        }
    }
}

/// Switch command parameter for one channel (0-based), or `None` if the
/// channel index is out of range.
pub fn switch_channel_param(channel: usize, on: bool) -> Option<u8> {
    SWITCH_CHANNEL_PARAMS
        .get(channel)
        .map(|&(off_code, on_code)| if on { on_code } else { off_code })
}

/// Switch command parameter for all channels at once.
pub fn switch_all_param(on: bool) -> u8 {
    if on {
        SWITCH_ALL_ON
    } else {
        SWITCH_ALL_OFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: [u8; 16] = [
        0x0B, 0x00, 0x1A, 0xD0, 0x7D, 0x3D, 0x44, 0x9C, 0x1B, 0x01, 0x7B, 0x00, 0x14, 0x00, 0x00,
        0x00,
    ];

    #[test]
    fn test_mac_formatting() {
        let mac = MacAddress::new([0x1A, 0xD0, 0x7D, 0x3D, 0x44, 0x9C]);
        assert_eq!(mac.to_string(), "1A:D0:7D:3D:44:9C");
        assert_eq!(mac.unique_id(), "1ad07d3d449c");
        assert_eq!(mac.short_suffix(), "449C");
    }

    #[test]
    fn test_mac_parse() {
        let mac: MacAddress = "1a:d0:7d:3d:44:9c".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x1A, 0xD0, 0x7D, 0x3D, 0x44, 0x9C]);
        assert_eq!("1AD07D3D449C".parse::<MacAddress>().unwrap(), mac);
        assert!("1A:D0:7D".parse::<MacAddress>().is_err());
        assert!("zz:d0:7d:3d:44:9c".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_decode_device_list_record() {
        let record = DeviceListRecord::decode(&RECORD).unwrap();
        assert_eq!(record.batch_size, 11);
        assert_eq!(record.index, 0);
        assert_eq!(record.mac.to_string(), "1A:D0:7D:3D:44:9C");
        assert_eq!(record.network_address, 0x011B);
        assert_eq!(record.vendor_id, SYMI_VENDOR_ID);
        assert_eq!(record.device_type, DEVICE_TYPE_TRANSPARENT_MODULE);
        assert_eq!(record.device_sub_type, 0);
        assert!(!record.online);
        assert!(!record.only_tmall);
        assert_eq!(record.encode(), RECORD);
    }

    #[test]
    fn test_decode_all_rejects_partial_record() {
        assert!(DeviceListRecord::decode_all(&[]).unwrap().is_empty());
        assert!(matches!(
            DeviceListRecord::decode_all(&RECORD[..10]),
            Err(ProtocolError::InvalidData(_))
        ));

        let mut two = RECORD.to_vec();
        two.extend_from_slice(&RECORD);
        assert_eq!(DeviceListRecord::decode_all(&two).unwrap().len(), 2);
    }

    #[test]
    fn test_decode_discovery() {
        let payload = [
            0xC4, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x7B, 0x00, 0x01, 0x03, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        let report = DiscoveryReport::decode(&payload).unwrap();
        assert_eq!(report.rssi, -60);
        assert_eq!(report.mac.to_string(), "11:22:33:44:55:66");
        assert_eq!(report.vendor_id, SYMI_VENDOR_ID);
        assert_eq!(report.device_type, DEVICE_TYPE_ZERO_FIRE_SWITCH);
        assert_eq!(report.device_sub_type, 3);
        assert_eq!(report.encode(), payload.to_vec());
    }

    #[test]
    fn test_short_discovery_is_rejected() {
        let payload = [0xC4, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x7B, 0x00, 0x01, 0x03];
        assert!(matches!(
            DiscoveryReport::decode(&payload),
            Err(ProtocolError::FrameTooShort {
                expected: 16,
                actual: 11
            })
        ));
    }

    #[test]
    fn test_decode_node_event() {
        let event = NodeEvent::decode(&[0x1B, 0x01, MSG_TYPE_SWITCH, 0x06]).unwrap();
        assert_eq!(event.network_address, 0x011B);
        assert_eq!(event.msg_type, MsgType::Switch);
        assert_eq!(event.primary_value(), 0x06);

        assert_eq!(
            NodeEvent::decode(&[0x1B, 0x01, 0x02]).unwrap_err(),
            ProtocolError::FrameTooShort {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_software_version() {
        let version = SoftwareVersion::decode(&[1, 2, 0, 17]).unwrap();
        assert_eq!(version.to_string(), "1.2.0.17");
        assert!(SoftwareVersion::decode(&[1, 2]).is_err());
    }

    #[test]
    fn test_switch_params() {
        assert_eq!(switch_channel_param(0, true), Some(0x02));
        assert_eq!(switch_channel_param(0, false), Some(0x01));
        assert_eq!(switch_channel_param(2, true), Some(0x07));
        assert_eq!(switch_channel_param(5, false), Some(0x0D));
        assert_eq!(switch_channel_param(6, true), None);
        assert_eq!(switch_all_param(true), 0x0A);
        assert_eq!(switch_all_param(false), 0x05);
    }
}
