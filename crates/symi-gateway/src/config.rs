//! Gateway connection configuration.
//!
//! Loaded from YAML; every field has a default so a file only needs the
//! values it changes:
//!
//! ```yaml
//! host: 192.168.1.50
//! scan_timeout_secs: 30
//! snapshot_path: /var/lib/symi/devices.json
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use symi_protocol::SYMI_VENDOR_ID;

use crate::error::ConfigError;

/// Default TCP port of the gateway's serial bridge.
pub const DEFAULT_PORT: u16 = 4196;

/// Configuration for one gateway connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway host name or IP.
    pub host: String,
    /// Gateway TCP port.
    pub port: u16,
    /// Upper bound on a single connect attempt.
    pub connect_timeout_ms: u64,
    /// Size of each socket read.
    pub read_buffer_size: usize,
    /// Scan mode ends on its own after this long.
    pub scan_timeout_secs: u64,
    /// Quiet period after device activity before the device list is re-read.
    pub status_sync_delay_ms: u64,
    /// Only scan sightings with this vendor id are tracked.
    pub accepted_vendor_id: u16,
    /// Add newly discovered nodes to the gateway whitelist automatically.
    pub auto_whitelist: bool,
    /// Where the CLI persists the registry between runs.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 3_000,
            read_buffer_size: 1024,
            scan_timeout_secs: 5,
            status_sync_delay_ms: 1_000,
            accepted_vendor_id: SYMI_VENDOR_ID,
            auto_whitelist: true,
            snapshot_path: None,
        }
    }
}

impl GatewayConfig {
    /// Parse and validate YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values the session cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid("read_buffer_size must be positive".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// `host:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn status_sync_delay(&self) -> Duration {
        Duration::from_millis(self.status_sync_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 4196);
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.scan_timeout(), Duration::from_secs(5));
        assert_eq!(config.status_sync_delay(), Duration::from_secs(1));
        assert_eq!(config.accepted_vendor_id, 0x007B);
        assert!(config.auto_whitelist);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = GatewayConfig::from_yaml_str("host: 10.0.0.7\nscan_timeout_secs: 30\n").unwrap();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.scan_timeout_secs, 30);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.endpoint(), "10.0.0.7:4196");
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            GatewayConfig::from_yaml_str("hostname: nope\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            GatewayConfig::from_yaml_str("port: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GatewayConfig::from_yaml_str("host: \"  \"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = GatewayConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
