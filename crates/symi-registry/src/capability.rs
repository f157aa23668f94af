//! Capability derivation.
//!
//! A device's capabilities and channel count are a pure function of its
//! `(device_type, device_sub_type)` pair. They are computed once, when a MAC
//! is first seen, and never recomputed.

use std::collections::BTreeSet;

use symi_protocol::*;

// ============================================================================
// Capability Tags
// ============================================================================

pub const CAP_SWITCH: &str = "switch";
pub const CAP_POWER_MONITORING: &str = "power_monitoring";
pub const CAP_LIGHT: &str = "light";
pub const CAP_BRIGHTNESS: &str = "brightness";
pub const CAP_COLOR_TEMP: &str = "color_temp";
pub const CAP_RGB: &str = "rgb";
pub const CAP_COVER: &str = "cover";
pub const CAP_POSITION: &str = "position";
pub const CAP_SCENE_CONTROL: &str = "scene_control";
pub const CAP_DOOR: &str = "door";
pub const CAP_MOTION: &str = "motion";
pub const CAP_CARD_DETECTION: &str = "card_detection";
pub const CAP_CLIMATE: &str = "climate";
pub const CAP_TEMPERATURE: &str = "temperature";
pub const CAP_HUMIDITY: &str = "humidity";
pub const CAP_TRANSPARENT: &str = "transparent";

/// Switches report at most eight channels.
pub const MAX_SWITCH_CHANNELS: u8 = 8;

/// Capabilities and channel count derived for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityProfile {
    /// Capability tags.
    pub capabilities: BTreeSet<String>,
    /// Number of independently switchable channels (at least 1).
    pub channel_count: u8,
}

/// Returns true for the wall-switch types whose sub-type is a channel count.
pub fn is_multi_channel_switch(device_type: u8) -> bool {
    matches!(
        device_type,
        DEVICE_TYPE_ZERO_FIRE_SWITCH | DEVICE_TYPE_SINGLE_FIRE_SWITCH
    )
}

/// Channel count for a device. Sub-type 0 on a switch means one channel.
pub fn channel_count(device_type: u8, device_sub_type: u8) -> u8 {
    if is_multi_channel_switch(device_type) {
        device_sub_type.clamp(1, MAX_SWITCH_CHANNELS)
    } else {
        1
    }
}

/// Derive the capability profile for a `(type, sub_type)` pair.
pub fn derive_profile(device_type: u8, device_sub_type: u8) -> CapabilityProfile {
    let channels = channel_count(device_type, device_sub_type);

    let base: &[&str] = match device_type {
        DEVICE_TYPE_ZERO_FIRE_SWITCH | DEVICE_TYPE_SINGLE_FIRE_SWITCH => &[CAP_SWITCH],
        DEVICE_TYPE_SOCKET => &[CAP_SWITCH, CAP_POWER_MONITORING],
        DEVICE_TYPE_LIGHT => &[CAP_LIGHT, CAP_BRIGHTNESS, CAP_COLOR_TEMP],
        DEVICE_TYPE_CURTAIN => &[CAP_COVER, CAP_POSITION],
        DEVICE_TYPE_SCENE_PANEL => &[CAP_SCENE_CONTROL],
        DEVICE_TYPE_DOOR_SENSOR => &[CAP_DOOR],
        DEVICE_TYPE_MOTION_SENSOR => &[CAP_MOTION],
        DEVICE_TYPE_CARD_POWER => &[CAP_SWITCH, CAP_CARD_DETECTION],
        DEVICE_TYPE_THERMOSTAT => &[CAP_CLIMATE, CAP_TEMPERATURE, CAP_HUMIDITY],
        DEVICE_TYPE_TEMP_HUMIDITY => &[CAP_TEMPERATURE, CAP_HUMIDITY],
        DEVICE_TYPE_FIVE_COLOR_LIGHT => &[CAP_LIGHT, CAP_BRIGHTNESS, CAP_COLOR_TEMP, CAP_RGB],
        DEVICE_TYPE_TRANSPARENT_MODULE | DEVICE_TYPE_TRANSPARENT_MODULE_ALT => &[CAP_TRANSPARENT],
        _ => &[],
    };

    let mut capabilities: BTreeSet<String> = base.iter().map(|c| c.to_string()).collect();
    if is_multi_channel_switch(device_type) && channels > 1 {
        capabilities.extend((1..=channels).map(switch_channel_key));
    }

    CapabilityProfile {
        capabilities,
        channel_count: channels,
    }
}

/// State/capability key for one switch channel (1-based).
pub fn switch_channel_key(channel: u8) -> String {
    format!("{}_{}", CAP_SWITCH, channel)
}

/// Default display name: type name plus the MAC suffix, with a channel
/// prefix for multi-gang switches.
pub fn default_name(device_type: u8, device_sub_type: u8, mac: &MacAddress) -> String {
    let type_name = device_type_name(device_type);
    let channels = channel_count(device_type, device_sub_type);
    if is_multi_channel_switch(device_type) && channels > 1 {
        format!("{}-gang {} {}", channels, type_name, mac.short_suffix())
    } else {
        format!("{} {}", type_name, mac.short_suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(profile: &CapabilityProfile) -> Vec<&str> {
        profile.capabilities.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_single_channel_switch() {
        let profile = derive_profile(DEVICE_TYPE_ZERO_FIRE_SWITCH, 0);
        assert_eq!(profile.channel_count, 1);
        assert_eq!(caps(&profile), vec!["switch"]);

        let profile = derive_profile(DEVICE_TYPE_SINGLE_FIRE_SWITCH, 1);
        assert_eq!(profile.channel_count, 1);
        assert_eq!(caps(&profile), vec!["switch"]);
    }

    #[test]
    fn test_multi_channel_switch() {
        let profile = derive_profile(DEVICE_TYPE_ZERO_FIRE_SWITCH, 3);
        assert_eq!(profile.channel_count, 3);
        assert_eq!(
            caps(&profile),
            vec!["switch", "switch_1", "switch_2", "switch_3"]
        );
    }

    #[test]
    fn test_channel_count_is_capped() {
        assert_eq!(channel_count(DEVICE_TYPE_ZERO_FIRE_SWITCH, 200), MAX_SWITCH_CHANNELS);
        // Sub-type only means channels on switches
        assert_eq!(channel_count(DEVICE_TYPE_LIGHT, 4), 1);
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(
            caps(&derive_profile(DEVICE_TYPE_SOCKET, 0)),
            vec!["power_monitoring", "switch"]
        );
        assert_eq!(
            caps(&derive_profile(DEVICE_TYPE_LIGHT, 0)),
            vec!["brightness", "color_temp", "light"]
        );
        assert_eq!(
            caps(&derive_profile(DEVICE_TYPE_CURTAIN, 0)),
            vec!["cover", "position"]
        );
        assert_eq!(
            caps(&derive_profile(DEVICE_TYPE_THERMOSTAT, 0)),
            vec!["climate", "humidity", "temperature"]
        );
        assert_eq!(
            caps(&derive_profile(DEVICE_TYPE_FIVE_COLOR_LIGHT, 0)),
            vec!["brightness", "color_temp", "light", "rgb"]
        );
        assert_eq!(
            caps(&derive_profile(DEVICE_TYPE_TRANSPARENT_MODULE, 0)),
            vec!["transparent"]
        );
        assert_eq!(
            caps(&derive_profile(DEVICE_TYPE_TRANSPARENT_MODULE_ALT, 0)),
            vec!["transparent"]
        );
    }

    #[test]
    fn test_unknown_type_has_no_capabilities() {
        assert!(derive_profile(DEVICE_TYPE_SMOKE_ALARM, 0).capabilities.is_empty());
        assert!(derive_profile(0xEE, 3).capabilities.is_empty());
    }

    #[test]
    fn test_default_name() {
        let mac = MacAddress::new([0x14, 0x27, 0xC9, 0x20, 0xDA, 0xCC]);
        assert_eq!(
            default_name(DEVICE_TYPE_ZERO_FIRE_SWITCH, 3, &mac),
            "3-gang Zero-fire switch DACC"
        );
        assert_eq!(default_name(DEVICE_TYPE_LIGHT, 0, &mac), "Light DACC");
    }
}
