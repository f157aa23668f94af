//! Commands that can be sent to the gateway.

use crate::constants::*;
use crate::error::ProtocolError;
use crate::frame::FrameCodec;
use crate::types::*;

/// Commands that can be sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read the gateway firmware version.
    ReadSoftwareVersion,

    /// Read the gateway's own MAC address.
    ReadMacAddress,

    /// Read the number of paired devices.
    ReadDeviceCount,

    /// Wipe every paired node from the gateway.
    FactoryReset,

    /// Reboot the gateway.
    Reboot,

    /// Start scanning for unpaired nodes.
    StartScan,

    /// Stop scanning.
    StopScan,

    /// Request the full device list.
    ReadDeviceList,

    /// Add a node to the whitelist.
    AddDevice {
        /// Node MAC address.
        mac: MacAddress,
        /// Address to assign; 0 lets the gateway pick.
        network_address: u16,
    },

    /// Remove a node from the whitelist.
    DeleteDevice {
        /// Node network address.
        network_address: u16,
    },

    /// Remove every node from the whitelist.
    ClearDevices,

    /// Control a single node.
    Control {
        /// Target network address.
        network_address: u16,
        /// What to change.
        msg_type: MsgType,
        /// Parameter bytes for the message type.
        params: Vec<u8>,
    },

    /// Ask a node to report its state.
    QueryStatus {
        /// Target network address.
        network_address: u16,
        /// Which state to report.
        msg_type: MsgType,
    },

    /// Trigger a scene.
    SceneControl {
        /// Scene id.
        scene_id: u8,
    },
}

impl Command {
    /// Request opcode for this command.
    pub fn opcode(&self) -> u8 {
        match self {
            Command::ReadSoftwareVersion => OP_READ_VERSION,
            Command::ReadMacAddress => OP_READ_MAC,
            Command::ReadDeviceCount => OP_DEVICE_COUNT,
            Command::FactoryReset => OP_FACTORY_RESET,
            Command::Reboot => OP_REBOOT,
            Command::StartScan => OP_START_SCAN,
            Command::StopScan => OP_STOP_SCAN,
            Command::ReadDeviceList | Command::AddDevice { .. } => OP_DEVICE_LIST,
            Command::DeleteDevice { .. } => OP_DELETE_DEVICE,
            Command::ClearDevices => OP_CLEAR_DEVICES,
            Command::Control { .. } => OP_DEVICE_CONTROL,
            Command::QueryStatus { .. } => OP_STATUS_QUERY,
            Command::SceneControl { .. } => OP_SCENE_CONTROL,
        }
    }

    /// Payload bytes for this command.
    pub fn payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Command::ReadSoftwareVersion
            | Command::ReadMacAddress
            | Command::ReadDeviceCount
            | Command::FactoryReset
            | Command::Reboot
            | Command::StartScan
            | Command::StopScan
            | Command::ReadDeviceList
            | Command::ClearDevices => {}

            Command::AddDevice {
                mac,
                network_address,
            } => {
                buf.extend_from_slice(mac.as_bytes());
                buf.extend_from_slice(&network_address.to_le_bytes());
            }

            Command::DeleteDevice { network_address } => {
                buf.extend_from_slice(&network_address.to_le_bytes());
            }

            Command::Control {
                network_address,
                msg_type,
                params,
            } => {
                buf.extend_from_slice(&network_address.to_le_bytes());
                buf.push((*msg_type).into());
                buf.extend_from_slice(params);
            }

            Command::QueryStatus {
                network_address,
                msg_type,
            } => {
                buf.extend_from_slice(&network_address.to_le_bytes());
                buf.push((*msg_type).into());
            }

            Command::SceneControl { scene_id } => buf.push(*scene_id),
        }

        buf
    }

    /// Encode as a complete wire frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        FrameCodec::encode(self.opcode(), &self.payload())
    }

    /// Short name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddDevice { .. } => "add_device",
            other => opcode_name(other.opcode()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::checksum;

    #[test]
    fn test_read_device_list_frame() {
        assert_eq!(
            Command::ReadDeviceList.encode().unwrap(),
            vec![0x53, 0x12, 0x00, 0x41]
        );
    }

    #[test]
    fn test_add_device_frame() {
        let mac = MacAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let cmd = Command::AddDevice {
            mac,
            network_address: 0,
        };
        let encoded = cmd.encode().unwrap();
        assert_eq!(&encoded[..3], &[0x53, OP_DEVICE_LIST, 8]);
        assert_eq!(&encoded[3..9], mac.as_bytes());
        assert_eq!(&encoded[9..11], &[0x00, 0x00]);
        assert_eq!(encoded[11], checksum(&encoded[..11]));
        assert_eq!(cmd.name(), "add_device");
    }

    #[test]
    fn test_control_payload_layout() {
        let cmd = Command::Control {
            network_address: 0x011B,
            msg_type: MsgType::Switch,
            params: vec![SWITCH_ALL_ON],
        };
        assert_eq!(cmd.opcode(), OP_DEVICE_CONTROL);
        assert_eq!(cmd.payload(), vec![0x1B, 0x01, MSG_TYPE_SWITCH, SWITCH_ALL_ON]);
    }

    #[test]
    fn test_query_and_scene_payloads() {
        let query = Command::QueryStatus {
            network_address: 0x0142,
            msg_type: MsgType::StatusQuery,
        };
        assert_eq!(query.payload(), vec![0x42, 0x01, 0x00]);
        assert_eq!(query.opcode(), OP_STATUS_QUERY);

        let scene = Command::SceneControl { scene_id: 7 };
        assert_eq!(scene.payload(), vec![7]);
        assert_eq!(scene.opcode(), OP_SCENE_CONTROL);
    }

    #[test]
    fn test_delete_device_payload() {
        let cmd = Command::DeleteDevice {
            network_address: 0x0156,
        };
        assert_eq!(cmd.payload(), vec![0x56, 0x01]);
        assert_eq!(cmd.name(), "delete_device");
    }
}
