//! Protocol constants
//!
//! Opcodes, status codes, message types and device type codes used on the
//! Symi gateway serial/TCP link.

// ============================================================================
// Framing
// ============================================================================

/// First byte of every frame, in both directions.
pub const FRAME_HEADER: u8 = 0x53;
/// Largest payload a single length byte can describe.
pub const MAX_PAYLOAD_LEN: usize = 255;
/// Header, opcode, length and checksum of a command-shaped frame.
pub const COMMAND_FRAME_OVERHEAD: usize = 4;
/// Header, opcode, status, length and checksum of a response-shaped frame.
pub const RESPONSE_FRAME_OVERHEAD: usize = 5;
/// Opcodes at or above this value carry a status byte.
pub const RESPONSE_OPCODE_MIN: u8 = 0x80;

// ============================================================================
// Request Opcodes (host → gateway)
// ============================================================================

/// Read the gateway's BLE advertising name.
pub const OP_READ_BLE_NAME: u8 = 0x01;
/// Read the gateway firmware version.
pub const OP_READ_VERSION: u8 = 0x02;
/// Read the gateway's own MAC address.
pub const OP_READ_MAC: u8 = 0x03;
/// Read the mesh network key.
pub const OP_READ_NETKEY: u8 = 0x04;
/// Factory reset the gateway (forgets every paired node).
pub const OP_FACTORY_RESET: u8 = 0x05;
/// Reboot the gateway.
pub const OP_REBOOT: u8 = 0x06;
/// Start scanning for unpaired nodes.
pub const OP_START_SCAN: u8 = 0x10;
/// Stop scanning.
pub const OP_STOP_SCAN: u8 = 0x11;
/// Read the device list (empty payload) or add a device (mac + address).
pub const OP_DEVICE_LIST: u8 = 0x12;
/// Remove a device from the whitelist.
pub const OP_DELETE_DEVICE: u8 = 0x13;
/// Remove every device from the whitelist.
pub const OP_CLEAR_DEVICES: u8 = 0x14;
/// Read the number of paired devices.
pub const OP_DEVICE_COUNT: u8 = 0x15;
/// Configure a scene.
pub const OP_SCENE_CONFIG: u8 = 0x20;
/// Delete a scene.
pub const OP_SCENE_DELETE: u8 = 0x21;
/// Control a single node.
pub const OP_DEVICE_CONTROL: u8 = 0x30;
/// Trigger a scene.
pub const OP_SCENE_CONTROL: u8 = 0x31;
/// Query the state of a node.
pub const OP_STATUS_QUERY: u8 = 0x32;

// ============================================================================
// Response / Event Opcodes (gateway → host)
// ============================================================================

/// Unsolicited node notification.
pub const OP_NODE_NOTIFY: u8 = 0x80;
/// Response to [`OP_READ_BLE_NAME`].
pub const OP_READ_BLE_NAME_RSP: u8 = 0x81;
/// Response to [`OP_READ_VERSION`].
pub const OP_READ_VERSION_RSP: u8 = 0x82;
/// Response to [`OP_READ_MAC`].
pub const OP_READ_MAC_RSP: u8 = 0x83;
/// Response to [`OP_READ_NETKEY`].
pub const OP_READ_NETKEY_RSP: u8 = 0x84;
/// Response to [`OP_FACTORY_RESET`].
pub const OP_FACTORY_RESET_RSP: u8 = 0x85;
/// Response to [`OP_REBOOT`].
pub const OP_REBOOT_RSP: u8 = 0x86;
/// Scan response; also carries discovery events.
pub const OP_START_SCAN_RSP: u8 = 0x90;
/// Response to [`OP_STOP_SCAN`].
pub const OP_STOP_SCAN_RSP: u8 = 0x91;
/// Device list response; also carries pairing events.
pub const OP_DEVICE_LIST_RSP: u8 = 0x92;
/// Response to [`OP_DELETE_DEVICE`].
pub const OP_DELETE_DEVICE_RSP: u8 = 0x93;
/// Response to [`OP_CLEAR_DEVICES`].
pub const OP_CLEAR_DEVICES_RSP: u8 = 0x94;
/// Response to [`OP_DEVICE_COUNT`].
pub const OP_DEVICE_COUNT_RSP: u8 = 0x95;
/// Response to [`OP_SCENE_CONFIG`].
pub const OP_SCENE_CONFIG_RSP: u8 = 0xA0;
/// Response to [`OP_SCENE_DELETE`].
pub const OP_SCENE_DELETE_RSP: u8 = 0xA1;
/// Response to [`OP_DEVICE_CONTROL`].
pub const OP_DEVICE_CONTROL_RSP: u8 = 0xB0;
/// Response to [`OP_SCENE_CONTROL`].
pub const OP_SCENE_CONTROL_RSP: u8 = 0xB1;
/// Response to [`OP_STATUS_QUERY`].
pub const OP_STATUS_QUERY_RSP: u8 = 0xB2;

// ============================================================================
// Status Codes
// ============================================================================

/// Operation succeeded.
pub const STATUS_SUCCESS: u8 = 0x00;
/// Operation failed.
pub const STATUS_ERROR: u8 = 0x01;
/// A scan found an unpaired node.
pub const STATUS_SCAN_DISCOVERY: u8 = 0x02;
/// A node joined the network.
pub const STATUS_PAIRING_SUCCESS: u8 = 0x03;
/// A node failed to join.
pub const STATUS_PAIRING_FAILED: u8 = 0x04;
/// A node acknowledged a command.
pub const STATUS_NODE_ACK: u8 = 0x05;
/// A node reported a state change.
pub const STATUS_NODE_STATUS: u8 = 0x06;

// ============================================================================
// Node Message Types
// ============================================================================

pub const MSG_TYPE_STATUS_QUERY: u8 = 0x00;
pub const MSG_TYPE_SWITCH: u8 = 0x02;
pub const MSG_TYPE_BRIGHTNESS: u8 = 0x03;
pub const MSG_TYPE_COLOR_TEMP: u8 = 0x04;
pub const MSG_TYPE_CURTAIN_CONTROL: u8 = 0x05;
pub const MSG_TYPE_CURTAIN_POSITION: u8 = 0x06;
pub const MSG_TYPE_CONTROL_SOURCE: u8 = 0x0D;
pub const MSG_TYPE_SOFTWARE_VERSION: u8 = 0x0F;
pub const MSG_TYPE_CONFIG_LOCK: u8 = 0x11;
pub const MSG_TYPE_KEY_CONFIG_1_4: u8 = 0x12;
pub const MSG_TYPE_KEY_CONFIG_5_6: u8 = 0x19;

// ============================================================================
// Switch Parameters (payload of MSG_TYPE_SWITCH commands)
// ============================================================================

pub const SWITCH_ALL_OFF: u8 = 0x05;
pub const SWITCH_ALL_ON: u8 = 0x0A;

/// Per-channel (off, on) parameters, indexed by channel (0-based).
pub const SWITCH_CHANNEL_PARAMS: [(u8, u8); 6] = [
    (0x01, 0x02),
    (0x03, 0x04),
    (0x06, 0x07),
    (0x08, 0x09),
    (0x0B, 0x0C),
    (0x0D, 0x0E),
];

// ============================================================================
// Curtain Motion Codes
// ============================================================================

pub const CURTAIN_OPENING: u8 = 0x01;
pub const CURTAIN_CLOSING: u8 = 0x02;
pub const CURTAIN_STOPPED: u8 = 0x03;

// ============================================================================
// Device Types
// ============================================================================

pub const DEVICE_TYPE_ZERO_FIRE_SWITCH: u8 = 1;
pub const DEVICE_TYPE_SINGLE_FIRE_SWITCH: u8 = 2;
pub const DEVICE_TYPE_SOCKET: u8 = 3;
pub const DEVICE_TYPE_LIGHT: u8 = 4;
pub const DEVICE_TYPE_CURTAIN: u8 = 5;
pub const DEVICE_TYPE_SCENE_PANEL: u8 = 6;
pub const DEVICE_TYPE_DOOR_SENSOR: u8 = 7;
pub const DEVICE_TYPE_MOTION_SENSOR: u8 = 8;
pub const DEVICE_TYPE_CARD_POWER: u8 = 9;
pub const DEVICE_TYPE_THERMOSTAT: u8 = 10;
pub const DEVICE_TYPE_TEMP_HUMIDITY: u8 = 11;
pub const DEVICE_TYPE_SCENE_SWITCH: u8 = 12;
pub const DEVICE_TYPE_OFFLINE_VOICE: u8 = 13;
pub const DEVICE_TYPE_DOOR_LOCK: u8 = 14;
pub const DEVICE_TYPE_WATER_ALARM: u8 = 15;
pub const DEVICE_TYPE_SMOKE_ALARM: u8 = 16;
pub const DEVICE_TYPE_TV_BOX: u8 = 17;
pub const DEVICE_TYPE_SINGLE_FIRE_SCENE: u8 = 18;
pub const DEVICE_TYPE_TRANSPARENT_MODULE: u8 = 20;
pub const DEVICE_TYPE_FIVE_COLOR_LIGHT: u8 = 24;
/// Second code some firmware uses for the transparent module.
pub const DEVICE_TYPE_TRANSPARENT_MODULE_ALT: u8 = 74;

// ============================================================================
// Records & Payloads
// ============================================================================

/// Vendor id reported by genuine Symi nodes.
pub const SYMI_VENDOR_ID: u16 = 0x007B;
/// Size of one device-list record.
pub const DEVICE_RECORD_SIZE: usize = 16;
/// Size of a discovery payload. Only the first 11 bytes are decoded; the
/// gateway pads the rest.
pub const DISCOVERY_PAYLOAD_LEN: usize = 16;
/// Bytes of a pairing-success payload (mac + address).
pub const PAIRING_PAYLOAD_LEN: usize = 8;
/// Bytes needed to read a node event (address, msg type, first value).
pub const NODE_EVENT_MIN_LEN: usize = 4;
/// Size of a MAC address.
pub const MAC_SIZE: usize = 6;

/// Status bit: node is online.
pub const DEVICE_STATUS_ONLINE: u8 = 0x01;
/// Status bit: node is bound to the Tmall ecosystem only.
pub const DEVICE_STATUS_ONLY_TMALL: u8 = 0x02;

/// Human-readable name of a device type.
pub fn device_type_name(device_type: u8) -> &'static str {
    match device_type {
        DEVICE_TYPE_ZERO_FIRE_SWITCH => "Zero-fire switch",
        DEVICE_TYPE_SINGLE_FIRE_SWITCH => "Single-fire switch",
        DEVICE_TYPE_SOCKET => "Socket",
        DEVICE_TYPE_LIGHT => "Light",
        DEVICE_TYPE_CURTAIN => "Curtain",
        DEVICE_TYPE_SCENE_PANEL => "Scene panel",
        DEVICE_TYPE_DOOR_SENSOR => "Door sensor",
        DEVICE_TYPE_MOTION_SENSOR => "Motion sensor",
        DEVICE_TYPE_CARD_POWER => "Card power switch",
        DEVICE_TYPE_THERMOSTAT => "Thermostat",
        DEVICE_TYPE_TEMP_HUMIDITY => "Temperature/humidity sensor",
        DEVICE_TYPE_SCENE_SWITCH => "Scene switch",
        DEVICE_TYPE_OFFLINE_VOICE => "Offline voice module",
        DEVICE_TYPE_DOOR_LOCK => "Door lock",
        DEVICE_TYPE_WATER_ALARM => "Water leak alarm",
        DEVICE_TYPE_SMOKE_ALARM => "Smoke alarm",
        DEVICE_TYPE_TV_BOX => "TV box",
        DEVICE_TYPE_SINGLE_FIRE_SCENE => "Single-fire scene switch",
        DEVICE_TYPE_TRANSPARENT_MODULE | DEVICE_TYPE_TRANSPARENT_MODULE_ALT => {
            "Transparent module"
        }
        DEVICE_TYPE_FIVE_COLOR_LIGHT => "Five-color light",
        _ => "Unknown device",
    }
}

/// Human-readable name of a request or response opcode.
pub fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        OP_READ_BLE_NAME | OP_READ_BLE_NAME_RSP => "read_ble_name",
        OP_READ_VERSION | OP_READ_VERSION_RSP => "read_version",
        OP_READ_MAC | OP_READ_MAC_RSP => "read_mac",
        OP_READ_NETKEY | OP_READ_NETKEY_RSP => "read_netkey",
        OP_FACTORY_RESET | OP_FACTORY_RESET_RSP => "factory_reset",
        OP_REBOOT | OP_REBOOT_RSP => "reboot",
        OP_START_SCAN | OP_START_SCAN_RSP => "start_scan",
        OP_STOP_SCAN | OP_STOP_SCAN_RSP => "stop_scan",
        OP_DEVICE_LIST | OP_DEVICE_LIST_RSP => "device_list",
        OP_DELETE_DEVICE | OP_DELETE_DEVICE_RSP => "delete_device",
        OP_CLEAR_DEVICES | OP_CLEAR_DEVICES_RSP => "clear_devices",
        OP_DEVICE_COUNT | OP_DEVICE_COUNT_RSP => "device_count",
        OP_SCENE_CONFIG | OP_SCENE_CONFIG_RSP => "scene_config",
        OP_SCENE_DELETE | OP_SCENE_DELETE_RSP => "scene_delete",
        OP_DEVICE_CONTROL | OP_DEVICE_CONTROL_RSP => "device_control",
        OP_SCENE_CONTROL | OP_SCENE_CONTROL_RSP => "scene_control",
        OP_STATUS_QUERY | OP_STATUS_QUERY_RSP => "status_query",
        OP_NODE_NOTIFY => "node_notify",
        _ => "unknown",
    }
}
