//! Typed view of frames received from the gateway.

use std::fmt;

use bytes::Bytes;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::types::*;

/// Status byte of a response or event frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    ScanDiscovery,
    PairingSuccess,
    PairingFailed,
    NodeAck,
    NodeStatus,
    Other(u8),
}

impl Status {
    /// Returns true for [`Status::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            STATUS_SUCCESS => Status::Success,
            STATUS_ERROR => Status::Error,
            STATUS_SCAN_DISCOVERY => Status::ScanDiscovery,
            STATUS_PAIRING_SUCCESS => Status::PairingSuccess,
            STATUS_PAIRING_FAILED => Status::PairingFailed,
            STATUS_NODE_ACK => Status::NodeAck,
            STATUS_NODE_STATUS => Status::NodeStatus,
            other => Status::Other(other),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => STATUS_SUCCESS,
            Status::Error => STATUS_ERROR,
            Status::ScanDiscovery => STATUS_SCAN_DISCOVERY,
            Status::PairingSuccess => STATUS_PAIRING_SUCCESS,
            Status::PairingFailed => STATUS_PAIRING_FAILED,
            Status::NodeAck => STATUS_NODE_ACK,
            Status::NodeStatus => STATUS_NODE_STATUS,
            Status::Other(code) => code,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::Error => write!(f, "error"),
            Status::ScanDiscovery => write!(f, "scan discovery"),
            Status::PairingSuccess => write!(f, "pairing success"),
            Status::PairingFailed => write!(f, "pairing failed"),
            Status::NodeAck => write!(f, "node ack"),
            Status::NodeStatus => write!(f, "node status"),
            Status::Other(code) => write!(f, "unknown status (0x{:02X})", code),
        }
    }
}

/// A frame received from the gateway, decoded by opcode and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Gateway entered scan mode.
    ScanStarted,

    /// A node was heard during a scan.
    DeviceDiscovered(DiscoveryReport),

    /// Gateway left scan mode.
    ScanStopped,

    /// A batch of device-list records. An empty batch marks the end of the list.
    DeviceList(Vec<DeviceListRecord>),

    /// A node joined and was assigned an address.
    DevicePaired(PairingReport),

    /// A node failed to join.
    PairingFailed {
        /// Raw event payload.
        payload: Bytes,
    },

    /// A node reported a state change.
    NodeStatus(NodeEvent),

    /// A node acknowledged a command.
    NodeAck {
        /// Raw event payload.
        payload: Bytes,
    },

    /// Gateway firmware version.
    SoftwareVersion(SoftwareVersion),

    /// Gateway MAC address.
    GatewayMac(MacAddress),

    /// Number of paired devices the gateway knows.
    DeviceCount(u8),

    /// Acknowledgement of a command that carries no further data, or a failed
    /// response of any kind.
    CommandResult {
        /// Response opcode.
        opcode: u8,
        /// Reported status.
        status: Status,
        /// Raw payload, if any.
        payload: Bytes,
    },

    /// Anything the decoder does not recognise.
    Unknown(Frame),
}

impl Message {
    /// Decode a validated frame.
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let Some(status_code) = frame.status else {
            return Ok(Message::Unknown(frame.clone()));
        };
        let status = Status::from(status_code);
        let payload = &frame.payload;

        let message = match (frame.opcode, status) {
            (OP_START_SCAN_RSP, Status::Success) => Message::ScanStarted,
            (OP_START_SCAN_RSP, Status::ScanDiscovery) => {
                Message::DeviceDiscovered(DiscoveryReport::decode(payload)?)
            }
            (OP_STOP_SCAN_RSP, Status::Success) => Message::ScanStopped,

            (OP_DEVICE_LIST_RSP, Status::Success) => {
                Message::DeviceList(DeviceListRecord::decode_all(payload)?)
            }
            (OP_DEVICE_LIST_RSP, Status::PairingSuccess) => {
                Message::DevicePaired(PairingReport::decode(payload)?)
            }
            (OP_DEVICE_LIST_RSP, Status::PairingFailed) => Message::PairingFailed {
                payload: payload.clone(),
            },

            (OP_NODE_NOTIFY, Status::NodeStatus) => Message::NodeStatus(NodeEvent::decode(payload)?),
            (OP_NODE_NOTIFY, Status::NodeAck) => Message::NodeAck {
                payload: payload.clone(),
            },
            (OP_NODE_NOTIFY, _) => Message::Unknown(frame.clone()),

            (OP_READ_VERSION_RSP, Status::Success) => {
                Message::SoftwareVersion(SoftwareVersion::decode(payload)?)
            }
            (OP_READ_MAC_RSP, Status::Success) => {
                let mac = MacAddress::from_slice(payload).ok_or(ProtocolError::FrameTooShort {
                    expected: MAC_SIZE,
                    actual: payload.len(),
                })?;
                Message::GatewayMac(mac)
            }
            (OP_DEVICE_COUNT_RSP, Status::Success) => {
                let count = *payload.first().ok_or(ProtocolError::FrameTooShort {
                    expected: 1,
                    actual: 0,
                })?;
                Message::DeviceCount(count)
            }

            (
                OP_READ_BLE_NAME_RSP | OP_READ_VERSION_RSP | OP_READ_MAC_RSP | OP_READ_NETKEY_RSP
                | OP_FACTORY_RESET_RSP | OP_REBOOT_RSP | OP_START_SCAN_RSP | OP_STOP_SCAN_RSP
                | OP_DEVICE_LIST_RSP | OP_DELETE_DEVICE_RSP | OP_CLEAR_DEVICES_RSP
                | OP_DEVICE_COUNT_RSP | OP_SCENE_CONFIG_RSP | OP_SCENE_DELETE_RSP
                | OP_DEVICE_CONTROL_RSP | OP_SCENE_CONTROL_RSP | OP_STATUS_QUERY_RSP,
                status,
            ) => Message::CommandResult {
                opcode: frame.opcode,
                status,
                payload: payload.clone(),
            },

            _ => Message::Unknown(frame.clone()),
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_codes() {
        for code in 0u8..=7 {
            assert_eq!(u8::from(Status::from(code)), code);
        }
        assert_eq!(Status::from(0x07), Status::Other(0x07));
        assert!(Status::Success.is_success());
        assert!(!Status::Error.is_success());
    }

    #[test]
    fn test_decode_scan_responses() {
        let started = Frame::response(OP_START_SCAN_RSP, STATUS_SUCCESS, Bytes::new());
        assert_eq!(Message::decode(&started).unwrap(), Message::ScanStarted);

        let stopped = Frame::response(OP_STOP_SCAN_RSP, STATUS_SUCCESS, Bytes::new());
        assert_eq!(Message::decode(&stopped).unwrap(), Message::ScanStopped);

        let failed = Frame::response(OP_START_SCAN_RSP, STATUS_ERROR, Bytes::new());
        assert!(matches!(
            Message::decode(&failed).unwrap(),
            Message::CommandResult {
                opcode: OP_START_SCAN_RSP,
                status: Status::Error,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_end_of_list() {
        let frame = Frame::response(OP_DEVICE_LIST_RSP, STATUS_SUCCESS, Bytes::new());
        assert_eq!(Message::decode(&frame).unwrap(), Message::DeviceList(vec![]));
    }

    #[test]
    fn test_decode_pairing_success() {
        let payload = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x57, 0x01];
        let frame = Frame::response(OP_DEVICE_LIST_RSP, STATUS_PAIRING_SUCCESS, payload);
        match Message::decode(&frame).unwrap() {
            Message::DevicePaired(report) => {
                assert_eq!(report.mac.to_string(), "11:22:33:44:55:66");
                assert_eq!(report.network_address, 0x0157);
            }
            other => panic!("expected DevicePaired, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_node_status() {
        let frame = Frame::response(
            OP_NODE_NOTIFY,
            STATUS_NODE_STATUS,
            vec![0x1B, 0x01, MSG_TYPE_CURTAIN_POSITION, 40],
        );
        match Message::decode(&frame).unwrap() {
            Message::NodeStatus(event) => {
                assert_eq!(event.network_address, 0x011B);
                assert_eq!(event.msg_type, MsgType::CurtainPosition);
                assert_eq!(event.primary_value(), 40);
            }
            other => panic!("expected NodeStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_short_node_status_is_error() {
        let frame = Frame::response(OP_NODE_NOTIFY, STATUS_NODE_STATUS, vec![0x1B, 0x01]);
        assert!(Message::decode(&frame).is_err());
    }

    #[test]
    fn test_decode_gateway_info() {
        let version = Frame::response(OP_READ_VERSION_RSP, STATUS_SUCCESS, vec![1, 0, 3, 9]);
        assert_eq!(
            Message::decode(&version).unwrap(),
            Message::SoftwareVersion(SoftwareVersion([1, 0, 3, 9]))
        );

        let count = Frame::response(OP_DEVICE_COUNT_RSP, STATUS_SUCCESS, vec![11]);
        assert_eq!(Message::decode(&count).unwrap(), Message::DeviceCount(11));

        let mac = Frame::response(OP_READ_MAC_RSP, STATUS_SUCCESS, vec![0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]);
        assert_eq!(
            Message::decode(&mac).unwrap(),
            Message::GatewayMac(MacAddress::new([0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]))
        );
    }

    #[test]
    fn test_decode_control_ack() {
        let frame = Frame::response(OP_DEVICE_CONTROL_RSP, STATUS_SUCCESS, Bytes::new());
        assert_eq!(
            Message::decode(&frame).unwrap(),
            Message::CommandResult {
                opcode: OP_DEVICE_CONTROL_RSP,
                status: Status::Success,
                payload: Bytes::new(),
            }
        );
    }

    #[test]
    fn test_decode_unknown() {
        let frame = Frame::response(0xEE, STATUS_SUCCESS, vec![1, 2]);
        assert_eq!(Message::decode(&frame).unwrap(), Message::Unknown(frame.clone()));

        let echo = Frame::command(OP_REBOOT, Bytes::new());
        assert_eq!(Message::decode(&echo).unwrap(), Message::Unknown(echo.clone()));
    }
}
